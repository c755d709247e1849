//! Core data models used throughout repo-qa.
//!
//! These types represent the documents, chunks, index entries and chat
//! turns that flow through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Provenance of a fetched file. Copied verbatim onto every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Path relative to the repository root.
    pub path: String,
    /// `owner/repo`.
    pub repo: String,
    /// Branch or ref the file was read at.
    pub branch: String,
    /// Git blob SHA, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Web-browsable URL of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl DocumentMetadata {
    /// Lower-cased file extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// A fetched repository file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A retrievable piece of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Position within the parent document, contiguous from 0.
    pub chunk_index: i64,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

/// An embedded chunk held by the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// Speaker of a [`ChatTurn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// One entry of the session chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single user question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> DocumentMetadata {
        DocumentMetadata {
            path: path.to_string(),
            repo: "a/b".to_string(),
            branch: "main".to_string(),
            sha: None,
            source_url: None,
        }
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(meta("docs/README.MD").extension().as_deref(), Some("md"));
        assert_eq!(meta("src/main.py").extension().as_deref(), Some("py"));
    }

    #[test]
    fn dotfiles_have_no_extension() {
        assert_eq!(meta(".gitignore").extension(), None);
        assert_eq!(meta("Makefile").extension(), None);
    }

    #[test]
    fn role_labels() {
        assert_eq!(ChatTurn::human("q").role.label(), "Human");
        assert_eq!(ChatTurn::assistant("a").role.label(), "Assistant");
    }
}
