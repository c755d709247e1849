//! # repo-qa CLI (`repoqa`)
//!
//! Ask natural-language questions about a GitHub repository. The repository
//! is fetched, split into text and code chunks, embedded into a local vector
//! index, and the most relevant chunks are handed to a language model along
//! with the conversation so far.
//!
//! ## Usage
//!
//! ```bash
//! repoqa --config ./config/repoqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repoqa serve` | Start the web frontend and JSON API |
//! | `repoqa ask <repo> "<query>"` | Answer one question (or a conversation with `--interactive`) |
//! | `repoqa index <repo>` | Fetch, chunk and index a repository without asking anything |
//! | `repoqa check` | Validate configuration and credentials |
//!
//! ## Environment
//!
//! `GITHUB_PERSONAL_ACCESS_TOKEN` is always required. The embedding and
//! language-model providers need their own keys (`HUGGINGFACEHUB_API_TOKEN`
//! and `GROQ_API_KEY` by default). Log verbosity follows `RUST_LOG`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use repo_qa::config::{self, Config, Credentials};
use repo_qa::connector_github::parse_repo_identifier;
use repo_qa::models::Query;
use repo_qa::pipeline::{Answer, Pipeline, PipelineError, Prepared, RunOutcome};
use repo_qa::progress::ProgressMode;
use repo_qa::server::{self, EMPTY_REPOSITORY_MESSAGE};
use repo_qa::session::Session;

const DEFAULT_CONFIG: &str = "./config/repoqa.toml";

/// repo-qa: question answering over GitHub repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the default file is absent, built-in defaults are used.
#[derive(Parser)]
#[command(name = "repoqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Stage progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web frontend.
    Serve {
        /// Address to bind; overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ask a question about a repository.
    ///
    /// The repository is re-fetched and re-indexed on every invocation.
    /// With `--interactive`, it is indexed once and questions are read from
    /// stdin until EOF or `exit`, sharing one conversation.
    Ask {
        /// `owner/repo` or `https://github.com/owner/repo`.
        repo: String,

        /// The question. Optional with `--interactive`.
        query: Option<String>,

        /// Branch or ref to read; defaults to the repository's default branch.
        #[arg(long)]
        branch: Option<String>,

        #[arg(long, short)]
        interactive: bool,
    },

    /// Fetch, chunk and index a repository.
    Index {
        repo: String,

        #[arg(long)]
        branch: Option<String>,
    },

    /// Validate configuration and required credentials.
    Check,
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    if path != Path::new(DEFAULT_CONFIG) {
        bail!("config file not found: {}", path.display());
    }
    let cfg = Config::default();
    config::validate(&cfg)?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Malformed identifiers fail before credentials or network are touched.
    match &cli.command {
        Commands::Ask { repo, .. } | Commands::Index { repo, .. } => {
            parse_repo_identifier(repo)?;
        }
        _ => {}
    }

    let cfg = load(&cli.config)?;
    let credentials = Credentials::from_env(&cfg)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Check => {
            Pipeline::from_config(&cfg, &credentials)?;
            println!("Configuration OK.");
            println!("  embedding: {}", cfg.embedding.provider);
            println!("  llm:       {}", cfg.llm.provider);
            println!("  index dir: {}", cfg.index.dir.display());
        }
        Commands::Serve { bind } => {
            let pipeline = Pipeline::from_config(&cfg, &credentials)?
                .with_reporter(std::sync::Arc::new(repo_qa::progress::LogProgress));
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            server::run_server(pipeline, &bind).await?;
        }
        Commands::Index { repo, branch } => {
            let pipeline = Pipeline::from_config(&cfg, &credentials)?.with_reporter(progress.reporter());
            match pipeline
                .index_repository(&repo, branch.as_deref())
                .await
                .map_err(halted)?
            {
                Prepared::Ready(index, summary) => {
                    println!(
                        "Indexed {}@{}: {} files ({} text, {} code, {} skipped) into {} chunks at {}",
                        summary.repo,
                        summary.branch,
                        summary.files,
                        summary.text_files,
                        summary.code_files,
                        summary.skipped,
                        index.len(),
                        index.path().display()
                    );
                }
                Prepared::Empty(_) => bail!(EMPTY_REPOSITORY_MESSAGE),
            }
        }
        Commands::Ask {
            repo,
            query,
            branch,
            interactive,
        } => {
            let pipeline = Pipeline::from_config(&cfg, &credentials)?.with_reporter(progress.reporter());
            if interactive {
                run_interactive(&pipeline, &repo, branch.as_deref(), query).await?;
            } else {
                let query = query.context("a query is required unless --interactive is given")?;
                let mut session = Session::new();
                match pipeline
                    .ask(&mut session, &repo, branch.as_deref(), &Query::new(query))
                    .await
                    .map_err(halted)?
                {
                    RunOutcome::Answered(answer) => print_answer(&answer),
                    RunOutcome::EmptyRepository { .. } => bail!(EMPTY_REPOSITORY_MESSAGE),
                }
            }
        }
    }

    Ok(())
}

fn halted(err: PipelineError) -> anyhow::Error {
    anyhow::anyhow!("Error processing request: {}", err.message)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for c in &answer.sources {
            match &c.metadata.source_url {
                Some(url) => println!("  {} (chunk {}) {}", c.metadata.path, c.chunk_index, url),
                None => println!("  {} (chunk {})", c.metadata.path, c.chunk_index),
            }
        }
    }
}

async fn run_interactive(
    pipeline: &Pipeline,
    repo: &str,
    branch: Option<&str>,
    first: Option<String>,
) -> anyhow::Result<()> {
    let index = match pipeline
        .index_repository(repo, branch)
        .await
        .map_err(halted)?
    {
        Prepared::Ready(index, summary) => {
            eprintln!(
                "Indexed {}@{} ({} chunks). Ask away; `exit` to quit.",
                summary.repo,
                summary.branch,
                index.len()
            );
            index
        }
        Prepared::Empty(_) => bail!(EMPTY_REPOSITORY_MESSAGE),
    };

    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = first;

    loop {
        let text = match pending.take() {
            Some(q) => q,
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
                match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        match pipeline.answer(&index, &mut session, &Query::new(text)).await {
            Ok(answer) => {
                print_answer(&answer);
                println!();
            }
            Err(e) => eprintln!("Error processing request: {}", e.message),
        }
    }
    Ok(())
}
