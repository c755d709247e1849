//! GitHub repository fetcher.
//!
//! Reads every eligible file of a repository at one ref through the GitHub
//! REST API and turns it into a [`Document`]:
//!
//! 1. `GET /repos/{owner}/{repo}` checks access and resolves the default branch.
//! 2. `GET /repos/{owner}/{repo}/git/trees/{ref}?recursive=1` lists every blob.
//! 3. Binary formats, excluded globs and oversized files are skipped.
//! 4. `GET /repos/{owner}/{repo}/git/blobs/{sha}` downloads each remaining file.
//!
//! A file that fails to download or decode is logged and skipped. Only
//! repository-level failures surface as errors.

use async_trait::async_trait;
use base64::Engine;
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, DocumentMetadata};

const GITHUB_WEB_PREFIX: &str = "https://github.com/";

/// Extensions never fetched: images, archives, media, fonts, compiled
/// artifacts and office formats other than docx.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tif", "tiff", "psd", "zip", "tar",
    "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "whl", "egg", "mp3", "mp4", "wav", "ogg",
    "flac", "avi", "mov", "mkv", "webm", "ttf", "otf", "woff", "woff2", "eot", "exe", "dll", "so",
    "dylib", "a", "o", "obj", "class", "pyc", "pyo", "wasm", "bin", "dat", "db", "sqlite",
    "parquet", "npy", "npz", "pkl", "pt", "onnx", "xls", "xlsx", "ppt", "pptx",
];

/// A validated `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// File-name-safe form used to namespace persisted indexes.
    pub fn index_slug(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parses `owner/repo` or `https://github.com/owner/repo[/]`.
///
/// Purely syntactic: never touches the network.
pub fn parse_repo_identifier(input: &str) -> Result<RepoId> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidRepositoryFormat(trimmed.to_string());

    let path = match trimmed.strip_prefix(GITHUB_WEB_PREFIX) {
        Some(rest) => {
            let rest = rest.trim_end_matches('/');
            if rest.matches('/').count() != 1 {
                return Err(invalid());
            }
            rest
        }
        None => {
            if trimmed.starts_with("http") || trimmed.matches('/').count() != 1 {
                return Err(invalid());
            }
            trimmed
        }
    };

    let (owner, name) = path.split_once('/').ok_or_else(invalid)?;
    if !is_valid_segment(owner) || !is_valid_segment(name) {
        return Err(invalid());
    }
    Ok(RepoId {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// A file left out of the fetch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
    /// The ref actually read: the requested branch or the default one.
    pub branch: String,
}

/// Anything that can produce the documents of a repository.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn fetch(&self, repo: &RepoId, branch: Option<&str>) -> Result<FetchOutcome>;
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    #[serde(default)]
    encoding: String,
}

pub struct GithubFetcher {
    client: reqwest::Client,
    api_url: String,
    web_url: String,
    exclude: GlobSet,
    max_file_bytes: u64,
}

impl GithubFetcher {
    pub fn new(config: &GithubConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repo-qa/", env!("CARGO_PKG_VERSION"))),
        );
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Configuration(format!("invalid GitHub token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let exclude = build_globset(&config.exclude_globs)?;
        let api_url = config.api_url.trim_end_matches('/').to_string();

        Ok(Self {
            web_url: web_base_url(&api_url),
            client,
            api_url,
            exclude,
            max_file_bytes: config.max_file_bytes,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!(url, "GitHub request");
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("request to {} failed: {}", url, e)))
    }

    async fn resolve_branch(&self, repo: &RepoId, branch: Option<&str>) -> Result<String> {
        let url = format!("{}/repos/{}", self.api_url, repo);
        let response = self.get(&url).await?;
        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(Error::RepositoryNotFound(repo.to_string())),
            StatusCode::UNAUTHORIZED => {
                return Err(Error::InsufficientPermissions(repo.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Fetch(format!("GitHub API error {}: {}", status, body)));
            }
        }

        let info: RepoInfo = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("invalid repository response: {}", e)))?;
        Ok(branch
            .map(str::to_string)
            .unwrap_or(info.default_branch))
    }

    /// Lists blobs at `branch`. `None` when the repository has no commits.
    async fn list_tree(&self, repo: &RepoId, branch: &str) -> Result<Option<TreeResponse>> {
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_url, repo, branch
        );
        let response = self.get(&url).await?;
        match response.status() {
            s if s.is_success() => {}
            // GitHub answers 409 "Git Repository is empty".
            StatusCode::CONFLICT => return Ok(None),
            StatusCode::NOT_FOUND => {
                return Err(Error::Fetch(format!(
                    "ref '{}' not found in {}",
                    branch, repo
                )))
            }
            StatusCode::UNAUTHORIZED => {
                return Err(Error::InsufficientPermissions(repo.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Fetch(format!("GitHub API error {}: {}", status, body)));
            }
        }
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("invalid tree response: {}", e)))?;
        Ok(Some(tree))
    }

    async fn fetch_blob(&self, repo: &RepoId, entry: &TreeEntry) -> anyhow::Result<String> {
        let url = format!("{}/repos/{}/git/blobs/{}", self.api_url, repo, entry.sha);
        let response = self.get(&url).await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GitHub API error {}", status);
        }
        let blob: BlobResponse = response.json().await?;
        let bytes = decode_blob(&blob)?;

        match extract::mime_for_path(&entry.path) {
            Some(mime) => Ok(extract::extract_text(&bytes, mime)?),
            None => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    fn skip_reason(&self, entry: &TreeEntry) -> Option<String> {
        if let Some(ext) = std::path::Path::new(&entry.path).extension() {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                return Some(format!("binary format (.{})", ext));
            }
        }
        if self.exclude.is_match(&entry.path) {
            return Some("excluded by glob".to_string());
        }
        match entry.size {
            Some(size) if size > self.max_file_bytes => Some(format!(
                "{} bytes exceeds max_file_bytes ({})",
                size, self.max_file_bytes
            )),
            _ => None,
        }
    }

    fn web_file_url(&self, repo: &RepoId, branch: &str, path: &str) -> String {
        format!("{}/{}/blob/{}/{}", self.web_url, repo, branch, path)
    }
}

#[async_trait]
impl RepositorySource for GithubFetcher {
    async fn fetch(&self, repo: &RepoId, branch: Option<&str>) -> Result<FetchOutcome> {
        let branch = self.resolve_branch(repo, branch).await?;
        let mut outcome = FetchOutcome {
            branch: branch.clone(),
            ..Default::default()
        };

        let tree = match self.list_tree(repo, &branch).await? {
            Some(tree) => tree,
            None => {
                tracing::info!(repo = %repo, "repository is empty");
                return Ok(outcome);
            }
        };
        if tree.truncated {
            tracing::warn!(
                repo = %repo,
                "GitHub truncated the file tree; some files will be missing"
            );
        }

        for entry in tree.tree.iter().filter(|e| e.kind == "blob") {
            if let Some(reason) = self.skip_reason(entry) {
                tracing::debug!(path = %entry.path, %reason, "skipping file");
                outcome.skipped.push(SkippedFile {
                    path: entry.path.clone(),
                    reason,
                });
                continue;
            }

            match self.fetch_blob(repo, entry).await {
                Ok(content) => outcome.documents.push(Document {
                    content,
                    metadata: DocumentMetadata {
                        path: entry.path.clone(),
                        repo: repo.to_string(),
                        branch: branch.clone(),
                        sha: Some(entry.sha.clone()),
                        source_url: Some(self.web_file_url(repo, &branch, &entry.path)),
                    },
                }),
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "failed to fetch file, skipping");
                    outcome.skipped.push(SkippedFile {
                        path: entry.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            repo = %repo,
            branch = %outcome.branch,
            documents = outcome.documents.len(),
            skipped = outcome.skipped.len(),
            "fetched repository"
        );
        Ok(outcome)
    }
}

fn decode_blob(blob: &BlobResponse) -> anyhow::Result<Vec<u8>> {
    match blob.encoding.as_str() {
        "base64" => {
            // GitHub wraps base64 content at 60 columns.
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
        }
        "utf-8" | "" => Ok(blob.content.as_bytes().to_vec()),
        other => anyhow::bail!("unsupported blob encoding: {}", other),
    }
}

/// `https://api.github.com` → `https://github.com`; Enterprise
/// `https://host/api/v3` → `https://host`.
fn web_base_url(api_url: &str) -> String {
    if api_url.contains("://api.github.com") {
        return "https://github.com".to_string();
    }
    api_url.trim_end_matches("/api/v3").to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Configuration(format!("invalid exclude glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("invalid exclude globs: {}", e)))
}
