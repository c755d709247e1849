//! End-to-end question answering over one repository.
//!
//! A run validates its inputs, fetches the repository, partitions the files
//! into text and code, chunks both partitions, builds the vector index,
//! retrieves context for the query, composes the prompt and asks the model.
//! Every stage is reported through a [`ProgressReporter`]; the first stage
//! that fails halts the run with a [`PipelineError`] naming it, and nothing
//! after it executes.
//!
//! The index for `owner/repo` lives at `<index.dir>/owner__repo.sqlite` and is
//! rebuilt wholesale on each run. Callers that ask several questions about
//! the same repository can build once with [`Pipeline::index_repository`]
//! and then call [`Pipeline::answer`] per question.

use std::path::PathBuf;
use std::sync::Arc;

use crate::answer::AnsweringService;
use crate::chunk::Chunker;
use crate::classify;
use crate::config::{Config, Credentials};
use crate::connector_github::{parse_repo_identifier, GithubFetcher, RepoId, RepositorySource};
use crate::embedding::{create_embedder, Embedder};
use crate::error::Error;
use crate::index::VectorIndex;
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{Chunk, Query};
use crate::progress::{format_number, NoProgress, PipelineEvent, ProgressReporter, Stage};
use crate::prompt;
use crate::session::Session;

pub const MISSING_INPUT_MESSAGE: &str = "Please provide both a repository URL and a query.";

/// The stage a run halted at, with the message to show the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage}: {message}")]
pub struct PipelineError {
    pub stage: Stage,
    /// Machine-readable code; one of [`Error::code`] or `"missing_input"`.
    pub code: &'static str,
    pub message: String,
}

impl PipelineError {
    fn from_error(stage: Stage, err: &Error) -> Self {
        Self {
            stage,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// What ingestion produced for one repository.
#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub repo: String,
    pub branch: String,
    pub files: usize,
    pub skipped: usize,
    pub text_files: usize,
    pub code_files: usize,
    pub text_chunks: usize,
    pub code_chunks: usize,
    pub index_path: Option<PathBuf>,
    /// One line per finished stage, in order.
    pub messages: Vec<String>,
}

pub enum Prepared {
    Ready(VectorIndex, IndexSummary),
    /// The repository had no eligible files; there is nothing to index.
    Empty(IndexSummary),
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Retrieved chunks the answer was grounded on, best first.
    pub sources: Vec<Chunk>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Answered(Answer),
    EmptyRepository { repo: String, branch: String },
}

pub struct Pipeline {
    config: Config,
    source: Arc<dyn RepositorySource>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    answering: AnsweringService,
    reporter: Arc<dyn ProgressReporter>,
}

/// Collects finished-stage messages while forwarding events to the reporter.
struct Run<'a> {
    reporter: &'a dyn ProgressReporter,
    messages: Vec<String>,
}

impl<'a> Run<'a> {
    fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            messages: Vec::new(),
        }
    }

    fn start(&self, stage: Stage) {
        self.reporter.report(&PipelineEvent::Started { stage });
    }

    fn finish(&mut self, stage: Stage, message: String) {
        self.reporter.report(&PipelineEvent::Finished {
            stage,
            message: message.clone(),
        });
        self.messages.push(message);
    }

    fn fail(&self, err: PipelineError) -> PipelineError {
        self.reporter.report(&PipelineEvent::Failed {
            stage: err.stage,
            message: err.message.clone(),
        });
        err
    }
}

impl Pipeline {
    pub fn new(
        config: Config,
        source: Arc<dyn RepositorySource>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let chunker = Chunker::new(
            config.chunking.clone(),
            embedder.clone(),
            config.embedding.batch_size,
        );
        Self {
            config,
            source,
            embedder,
            chunker,
            answering: AnsweringService::new(model),
            reporter: Arc::new(NoProgress),
        }
    }

    /// Wires the GitHub fetcher, embedder and chat model named by `config`.
    pub fn from_config(config: &Config, credentials: &Credentials) -> crate::error::Result<Self> {
        let source = GithubFetcher::new(&config.github, &credentials.github_token)?;
        let embedder = create_embedder(&config.embedding, credentials.embedding_key.as_deref())?;
        let model = create_chat_model(&config.llm, credentials.llm_key.as_deref())?;
        Ok(Self::new(config.clone(), Arc::new(source), embedder, model))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_path(&self, repo: &RepoId) -> PathBuf {
        self.config
            .index
            .dir
            .join(format!("{}.sqlite", repo.index_slug()))
    }

    /// Fetch, classify, chunk and index. Reports [`Stage::Validate`] through
    /// [`Stage::Index`].
    pub async fn index_repository(
        &self,
        repo_input: &str,
        branch: Option<&str>,
    ) -> Result<Prepared, PipelineError> {
        let mut run = Run::new(self.reporter.as_ref());
        run.start(Stage::Validate);
        let repo = parse_repo_identifier(repo_input)
            .map_err(|e| run.fail(PipelineError::from_error(Stage::Validate, &e)))?;
        run.finish(Stage::Validate, format!("Repository {}", repo));

        self.prepare(&mut run, &repo, branch).await
    }

    async fn prepare(
        &self,
        run: &mut Run<'_>,
        repo: &RepoId,
        branch: Option<&str>,
    ) -> Result<Prepared, PipelineError> {
        run.start(Stage::Fetch);
        let fetched = self
            .source
            .fetch(repo, branch)
            .await
            .map_err(|e| run.fail(PipelineError::from_error(Stage::Fetch, &e)))?;
        let mut summary = IndexSummary {
            repo: repo.to_string(),
            branch: fetched.branch.clone(),
            files: fetched.documents.len(),
            skipped: fetched.skipped.len(),
            ..Default::default()
        };
        run.finish(
            Stage::Fetch,
            format!(
                "Loaded {} files from {}@{} ({} skipped)",
                format_number(summary.files as u64),
                repo,
                summary.branch,
                format_number(summary.skipped as u64)
            ),
        );

        if fetched.documents.is_empty() {
            tracing::warn!(repo = %repo, branch = %summary.branch, "repository has no eligible files");
            summary.messages = std::mem::take(&mut run.messages);
            return Ok(Prepared::Empty(summary));
        }

        run.start(Stage::Classify);
        let parts = classify::partition(&fetched.documents);
        summary.text_files = parts.text.len();
        summary.code_files = parts.code.len();
        run.finish(
            Stage::Classify,
            format!(
                "Classified {} text files and {} code files",
                summary.text_files, summary.code_files
            ),
        );

        run.start(Stage::ChunkText);
        let text = self.chunker.split_text_documents(&parts.text).await;
        if !text.succeeded {
            return Err(run.fail(PipelineError {
                stage: Stage::ChunkText,
                code: text.error_code.unwrap_or("chunking_error"),
                message: text.message,
            }));
        }
        summary.text_chunks = text.chunks.len();
        run.finish(Stage::ChunkText, text.message);

        run.start(Stage::ChunkCode);
        let code = self.chunker.split_code_documents(&parts.code).await;
        if !code.succeeded {
            return Err(run.fail(PipelineError {
                stage: Stage::ChunkCode,
                code: code.error_code.unwrap_or("chunking_error"),
                message: code.message,
            }));
        }
        summary.code_chunks = code.chunks.len();
        run.finish(Stage::ChunkCode, code.message);

        run.start(Stage::Index);
        let path = self.index_path(repo);
        let mut chunks = text.chunks;
        chunks.extend(code.chunks);
        let outcome = VectorIndex::build(
            self.embedder.as_ref(),
            chunks,
            &path,
            self.config.embedding.batch_size,
        )
        .await;
        let index = match outcome.index {
            Some(index) => index,
            None => {
                return Err(run.fail(PipelineError {
                    stage: Stage::Index,
                    code: "index_error",
                    message: outcome.message,
                }))
            }
        };
        run.finish(Stage::Index, outcome.message);

        summary.index_path = Some(path);
        summary.messages = std::mem::take(&mut run.messages);
        Ok(Prepared::Ready(index, summary))
    }

    /// Retrieve, compose and generate against an already built index.
    /// Appends to `session` only when the model answers.
    pub async fn answer(
        &self,
        index: &VectorIndex,
        session: &mut Session,
        query: &Query,
    ) -> Result<Answer, PipelineError> {
        let mut run = Run::new(self.reporter.as_ref());
        self.answer_with(&mut run, index, session, query).await
    }

    async fn answer_with(
        &self,
        run: &mut Run<'_>,
        index: &VectorIndex,
        session: &mut Session,
        query: &Query,
    ) -> Result<Answer, PipelineError> {
        if query.is_blank() {
            return Err(run.fail(missing_input()));
        }

        run.start(Stage::Retrieve);
        let sources = index
            .retrieve(self.embedder.as_ref(), &query.text, self.config.retrieval.top_k)
            .await
            .map_err(|e| run.fail(PipelineError::from_error(Stage::Retrieve, &e)))?;
        run.finish(
            Stage::Retrieve,
            format!("Retrieved {} chunks for the query", sources.len()),
        );

        run.start(Stage::Answer);
        let messages = prompt::compose(
            &prompt::format_context(&sources),
            session.history(),
            &query.text,
        );
        let text = self
            .answering
            .answer(session, query, &messages)
            .await
            .map_err(|e| run.fail(PipelineError::from_error(Stage::Answer, &e)))?;
        run.finish(
            Stage::Answer,
            format!("Answered with {}", self.answering.model_name()),
        );

        Ok(Answer {
            text,
            sources,
            messages: std::mem::take(&mut run.messages),
        })
    }

    /// The full run for one submission. Inputs are validated before any
    /// network call.
    pub async fn ask(
        &self,
        session: &mut Session,
        repo_input: &str,
        branch: Option<&str>,
        query: &Query,
    ) -> Result<RunOutcome, PipelineError> {
        let mut run = Run::new(self.reporter.as_ref());
        run.start(Stage::Validate);
        if repo_input.trim().is_empty() || query.is_blank() {
            return Err(run.fail(missing_input()));
        }
        let repo = parse_repo_identifier(repo_input)
            .map_err(|e| run.fail(PipelineError::from_error(Stage::Validate, &e)))?;
        run.finish(Stage::Validate, format!("Repository {}", repo));

        let index = match self.prepare(&mut run, &repo, branch).await? {
            Prepared::Ready(index, summary) => {
                run.messages = summary.messages;
                index
            }
            Prepared::Empty(summary) => {
                return Ok(RunOutcome::EmptyRepository {
                    repo: summary.repo,
                    branch: summary.branch,
                })
            }
        };

        let answer = self.answer_with(&mut run, &index, session, query).await?;
        Ok(RunOutcome::Answered(answer))
    }
}

fn missing_input() -> PipelineError {
    PipelineError {
        stage: Stage::Validate,
        code: "missing_input",
        message: MISSING_INPUT_MESSAGE.to_string(),
    }
}
