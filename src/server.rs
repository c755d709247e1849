//! Web frontend and JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Question form |
//! | `POST` | `/ask` | Form submission; renders the answer or the error |
//! | `POST` | `/api/ask` | JSON variant of `/ask` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! JSON errors use the envelope
//!
//! ```json
//! { "error": { "code": "invalid_repository_format", "message": "..." } }
//! ```
//!
//! Sessions are kept in memory, keyed by an opaque id that the page carries
//! in a hidden field and API clients pass back as `session_id`. Pipeline runs
//! are serialised: one run at a time across all sessions.

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::models::{ChatTurn, Chunk, Query};
use crate::pipeline::{Answer, Pipeline, PipelineError, RunOutcome};
use crate::progress::Stage;
use crate::session::Session;

pub const EMPTY_REPOSITORY_MESSAGE: &str = "No files loaded from the repository. Check the repository URL, ensure it contains files, or verify your GitHub token has 'public_repo' scope.";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one submission against the session named by `session_id`.
    ///
    /// An absent or unknown id gets a fresh session, which is only stored
    /// once a run produces an answer.
    async fn submit(
        &self,
        session_id: Option<&str>,
        repo: &str,
        branch: Option<&str>,
        query: &Query,
    ) -> (Session, Result<RunOutcome, PipelineError>) {
        let _guard = self.run_lock.lock().await;

        let known = {
            let sessions = self.sessions.lock().await;
            session_id
                .filter(|id| !id.is_empty())
                .and_then(|id| sessions.get(id).cloned())
        };
        let is_known = known.is_some();
        let mut session = known.unwrap_or_default();
        let result = self.pipeline.ask(&mut session, repo, branch, query).await;

        if is_known || matches!(result, Ok(RunOutcome::Answered(_))) {
            self.sessions
                .lock()
                .await
                .insert(session.id().to_string(), session.clone());
        }
        (session, result)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/ask", post(handle_ask_form))
        .route("/api/ask", post(handle_ask_json))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds `bind` and serves until the process is terminated.
pub async fn run_server(pipeline: Pipeline, bind: &str) -> anyhow::Result<()> {
    let app = router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("repo-qa listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match err.code {
            "missing_input" | "invalid_repository_format" => StatusCode::BAD_REQUEST,
            "repository_not_found" => StatusCode::NOT_FOUND,
            "insufficient_permissions" => StatusCode::FORBIDDEN,
            "fetch_error" | "embedding_error" | "model_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code.to_string(),
            message: err.message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
pub struct AskRequest {
    pub repo: String,
    pub query: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
struct SourceRef {
    path: String,
    chunk_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    session_id: String,
    answer: String,
    sources: Vec<SourceRef>,
    history: Vec<ChatTurn>,
}

fn source_refs(chunks: &[Chunk]) -> Vec<SourceRef> {
    chunks
        .iter()
        .map(|c| SourceRef {
            path: c.metadata.path.clone(),
            chunk_index: c.chunk_index,
            source_url: c.metadata.source_url.clone(),
        })
        .collect()
}

async fn handle_ask_json(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let query = Query::new(req.query);
    let (session, result) = state
        .submit(
            req.session_id.as_deref(),
            &req.repo,
            req.branch.as_deref().filter(|b| !b.trim().is_empty()),
            &query,
        )
        .await;

    match result? {
        RunOutcome::Answered(answer) => Ok(Json(AskResponse {
            session_id: session.id().to_string(),
            sources: source_refs(&answer.sources),
            answer: answer.text,
            history: session.history().to_vec(),
        })),
        RunOutcome::EmptyRepository { .. } => Err(AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "empty_repository".to_string(),
            message: EMPTY_REPOSITORY_MESSAGE.to_string(),
        }),
    }
}

// ============ GET / and POST /ask ============

#[derive(Deserialize, Default)]
pub struct AskForm {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub session_id: String,
}

struct NoticeView {
    kind: &'static str,
    message: String,
}

impl NoticeView {
    fn warning(message: String) -> Self {
        Self { kind: "warning", message }
    }

    fn error(message: String) -> Self {
        Self { kind: "error", message }
    }
}

struct SourceView {
    label: String,
    url: Option<String>,
}

struct AnswerView {
    text: String,
    sources: Vec<SourceView>,
}

impl From<Answer> for AnswerView {
    fn from(answer: Answer) -> Self {
        let sources = answer
            .sources
            .iter()
            .map(|c| SourceView {
                label: format!("{} (chunk {})", c.metadata.path, c.chunk_index),
                url: c.metadata.source_url.clone(),
            })
            .collect();
        Self {
            text: answer.text,
            sources,
        }
    }
}

struct TurnView {
    role: &'static str,
    content: String,
}

#[derive(Template, Default)]
#[template(path = "page.html")]
struct PageTemplate {
    session_id: String,
    repo: String,
    branch: String,
    query: String,
    notice: Option<NoticeView>,
    stages: Vec<String>,
    answer: Option<AnswerView>,
    turns: Vec<TurnView>,
}

fn render_template<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Template error: {}", e),
            )
                .into_response()
        }
    }
}

async fn handle_index() -> Response {
    render_template(&PageTemplate::default())
}

async fn handle_ask_form(State(state): State<AppState>, Form(form): Form<AskForm>) -> Response {
    let query = Query::new(form.query.clone());
    let branch = Some(form.branch.trim()).filter(|b| !b.is_empty());
    let (session, result) = state
        .submit(Some(form.session_id.as_str()), &form.repo, branch, &query)
        .await;

    let mut page = PageTemplate {
        session_id: session.id().to_string(),
        repo: form.repo,
        branch: form.branch,
        turns: session
            .history()
            .iter()
            .map(|turn| TurnView {
                role: turn.role.label(),
                content: turn.content.clone(),
            })
            .collect(),
        ..Default::default()
    };
    match result {
        Ok(RunOutcome::Answered(answer)) => {
            page.stages = answer.messages.clone();
            page.answer = Some(answer.into());
        }
        Ok(RunOutcome::EmptyRepository { .. }) => {
            page.notice = Some(NoticeView::error(EMPTY_REPOSITORY_MESSAGE.to_string()));
        }
        Err(e) if e.code == "missing_input" => page.notice = Some(NoticeView::warning(e.message)),
        Err(e) if e.stage == Stage::Validate => page.notice = Some(NoticeView::error(e.message)),
        Err(e) => {
            tracing::error!(stage = %e.stage, "{}", e.message);
            page.notice = Some(NoticeView::error(format!(
                "Error processing request: {}",
                e.message
            )));
        }
    }
    render_template(&page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connector_github::{FetchOutcome, RepoId, RepositorySource};
    use crate::embedding::Embedder;
    use crate::error::Result;
    use crate::llm::{ChatMessage, ChatModel};
    use crate::models::{Document, DocumentMetadata};
    use async_trait::async_trait;

    struct OneFile;

    #[async_trait]
    impl RepositorySource for OneFile {
        async fn fetch(&self, repo: &RepoId, _branch: Option<&str>) -> Result<FetchOutcome> {
            Ok(FetchOutcome {
                documents: vec![Document {
                    content: "def main():\n    print('hello')\n".to_string(),
                    metadata: DocumentMetadata {
                        path: "main.py".to_string(),
                        repo: repo.to_string(),
                        branch: "main".to_string(),
                        sha: None,
                        source_url: Some(format!("https://github.com/{}/blob/main/main.py", repo)),
                    },
                }],
                skipped: vec![],
                branch: "main".to_string(),
            })
        }
    }

    struct Flat;

    #[async_trait]
    impl Embedder for Flat {
        fn model_name(&self) -> &str {
            "flat"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("<b>{}</b> messages", messages.len()))
        }
    }

    fn state(dir: &std::path::Path) -> AppState {
        let mut config = Config::default();
        config.index.dir = dir.to_path_buf();
        AppState::new(Pipeline::new(config, Arc::new(OneFile), Arc::new(Flat), Arc::new(Echo)))
    }

    async fn spawn(dir: &std::path::Path) -> String {
        let app = router(state(dir));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn blank_page_has_form_and_no_notice() {
        let html = PageTemplate::default().render().unwrap();
        assert!(html.contains("name=\"repo\""));
        assert!(html.contains("name=\"query\""));
        assert!(!html.contains("class=\"notice"));
        assert!(!html.contains("<h2>Answer</h2>"));
    }

    #[test]
    fn page_escapes_form_values_and_notice() {
        let page = PageTemplate {
            repo: "\"><script>x</script>".to_string(),
            notice: Some(NoticeView::error("<i>bad</i>".to_string())),
            ..Default::default()
        };
        let html = page.render().unwrap();
        assert!(!html.contains("<script>x</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<div class=\"notice error\">&lt;i&gt;bad&lt;/i&gt;</div>"));
    }

    #[test]
    fn sources_without_url_render_as_plain_labels() {
        let page = PageTemplate {
            answer: Some(AnswerView {
                text: "ok".to_string(),
                sources: vec![
                    SourceView {
                        label: "a.rs (chunk 0)".to_string(),
                        url: Some("https://github.com/o/r/blob/main/a.rs".to_string()),
                    },
                    SourceView {
                        label: "b.rs (chunk 1)".to_string(),
                        url: None,
                    },
                ],
            }),
            ..Default::default()
        };
        let html = page.render().unwrap();
        assert!(html.contains("<a href=\"https://github.com/o/r/blob/main/a.rs\">a.rs (chunk 0)</a>"));
        assert!(html.contains("<li>b.rs (chunk 1)</li>"));
    }

    #[tokio::test]
    async fn health_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn api_rejects_malformed_repository() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ask", base))
            .json(&serde_json::json!({ "repo": "not a repo", "query": "hi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "invalid_repository_format");
    }

    #[tokio::test]
    async fn api_session_accumulates_history() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let client = reqwest::Client::new();

        let first: serde_json::Value = client
            .post(format!("{}/api/ask", base))
            .json(&serde_json::json!({ "repo": "octo/demo", "query": "What is this?" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = first["session_id"].as_str().unwrap().to_string();
        assert_eq!(first["history"].as_array().unwrap().len(), 2);
        assert_eq!(first["sources"][0]["path"], "main.py");

        let second: serde_json::Value = client
            .post(format!("{}/api/ask", base))
            .json(&serde_json::json!({
                "repo": "octo/demo",
                "query": "And then?",
                "session_id": session_id
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["session_id"], session_id.as_str());
        assert_eq!(second["history"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn form_warns_on_missing_query() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let html = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .form(&[("repo", "octo/demo"), ("query", "  ")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains("notice warning"));
        assert!(html.contains("Please provide both a repository URL and a query."));
    }

    #[tokio::test]
    async fn form_renders_escaped_answer() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let html = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .form(&[("repo", "https://github.com/octo/demo/"), ("query", "Explain")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(!html.contains("<b>3</b>"));
        assert!(html.contains("class=\"output-text\">&lt;b&gt;3&lt;/b&gt; messages"));
        assert!(html.contains("https://github.com/octo/demo/blob/main/main.py"));
        assert!(html.contains("<span class=\"role\">Human:</span> Explain"));
    }

    #[tokio::test]
    async fn rejected_requests_do_not_store_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let (_, result) = state
            .submit(None, "not a repo", None, &Query::new("hi"))
            .await;
        assert!(result.is_err());
        let (_, result) = state
            .submit(Some("made-up"), "octo/demo", None, &Query::new("  "))
            .await;
        assert!(result.is_err());
        assert!(state.sessions.lock().await.is_empty());

        let (session, result) = state
            .submit(None, "octo/demo", None, &Query::new("Explain"))
            .await;
        assert!(matches!(result, Ok(RunOutcome::Answered(_))));
        assert!(state.sessions.lock().await.contains_key(session.id()));

        let (again, result) = state
            .submit(Some(session.id()), "not a repo", None, &Query::new("hi"))
            .await;
        assert!(result.is_err());
        assert_eq!(again.id(), session.id());
        assert_eq!(state.sessions.lock().await.len(), 1);
    }
}
