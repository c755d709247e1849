//! Document chunking.
//!
//! Two paths, one per [`FileCategory`](crate::classify::FileCategory):
//!
//! | Path | Splitter |
//! |------|----------|
//! | text | [`SemanticSplitter`] or [`RecursiveSplitter`], chosen by `chunking.text_splitter` |
//! | code | [`RecursiveSplitter`] with the separators of the file's [`Language`] |
//!
//! Both paths report through [`ChunkOutcome`] and never return an error:
//! a failure empties the chunk list and is described in the message.
//! Every chunk carries its parent document's metadata unchanged, a
//! contiguous `chunk_index` from 0 and a SHA-256 hash of its content.

pub mod language;
pub mod recursive;
pub mod semantic;

pub use language::Language;
pub use recursive::RecursiveSplitter;
pub use semantic::SemanticSplitter;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::{ChunkingConfig, TextSplitterKind};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{Chunk, Document};

/// Turns one document body into chunk texts.
#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(&self, text: &str) -> Result<Vec<String>>;
}

/// Result of one chunking path.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    /// `"Split N text files into M chunks"` or `"Error splitting …: cause"`.
    pub message: String,
    pub succeeded: bool,
    /// [`Error::code`](crate::error::Error::code) of the failure, if any.
    pub error_code: Option<&'static str>,
}

pub struct Chunker {
    config: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl Chunker {
    /// `embedder` is only used by the semantic text splitter.
    pub fn new(config: ChunkingConfig, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            config,
            embedder,
            batch_size,
        }
    }

    fn text_splitter(&self) -> Box<dyn Splitter> {
        match self.config.text_splitter {
            TextSplitterKind::Semantic => Box::new(SemanticSplitter::new(
                self.embedder.clone(),
                self.config.breakpoint_threshold_type,
                self.config.threshold_amount(),
                self.config.buffer_size,
                self.batch_size,
            )),
            TextSplitterKind::Recursive => Box::new(RecursiveSplitter::new(
                self.config.text_chunk_size,
                self.config.text_chunk_overlap,
                self.config.separators.clone(),
            )),
        }
    }

    fn code_language(&self, doc: &Document) -> Language {
        self.config
            .code_language
            .as_deref()
            .and_then(Language::from_name)
            .unwrap_or_else(|| Language::detect(&doc.metadata.path))
    }

    pub async fn split_text_documents(&self, docs: &[Document]) -> ChunkOutcome {
        let splitter = self.text_splitter();
        let mut chunks = Vec::new();
        for doc in docs {
            match splitter.split(&doc.content).await {
                Ok(pieces) => chunks.extend(make_chunks(doc, pieces)),
                Err(e) => return failed("text", e),
            }
        }
        succeeded("text", docs.len(), chunks)
    }

    pub async fn split_code_documents(&self, docs: &[Document]) -> ChunkOutcome {
        let mut chunks = Vec::new();
        for doc in docs {
            let splitter = RecursiveSplitter::for_language(
                self.code_language(doc),
                self.config.code_chunk_size,
                self.config.code_chunk_overlap,
            );
            chunks.extend(make_chunks(doc, splitter.split_text(&doc.content)));
        }
        succeeded("code", docs.len(), chunks)
    }
}

fn succeeded(kind: &str, files: usize, chunks: Vec<Chunk>) -> ChunkOutcome {
    let message = format!("Split {} {} files into {} chunks", files, kind, chunks.len());
    tracing::info!("{}", message);
    ChunkOutcome {
        chunks,
        message,
        succeeded: true,
        error_code: None,
    }
}

fn failed(kind: &str, err: crate::error::Error) -> ChunkOutcome {
    let message = format!("Error splitting {} files: {}", kind, err);
    tracing::warn!(code = err.code(), "{}", message);
    ChunkOutcome {
        chunks: Vec::new(),
        message,
        succeeded: false,
        error_code: Some(err.code()),
    }
}

fn make_chunks(doc: &Document, pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, content)| make_chunk(doc, i as i64, content))
        .collect()
}

fn make_chunk(doc: &Document, index: i64, content: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Chunk {
        content,
        metadata: doc.metadata.clone(),
        chunk_index: index,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::DocumentMetadata;

    struct Unreachable;

    #[async_trait]
    impl Embedder for Unreachable {
        fn model_name(&self) -> &str {
            "unreachable"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("service unreachable".into()))
        }
    }

    struct Misconfigured;

    #[async_trait]
    impl Embedder for Misconfigured {
        fn model_name(&self) -> &str {
            "misconfigured"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Configuration("model files missing".into()))
        }
    }

    fn doc(path: &str, content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocumentMetadata {
                path: path.to_string(),
                repo: "octo/demo".to_string(),
                branch: "main".to_string(),
                sha: Some("abc".to_string()),
                source_url: None,
            },
        }
    }

    fn chunker(kind: TextSplitterKind) -> Chunker {
        let config = ChunkingConfig {
            text_splitter: kind,
            text_chunk_size: 40,
            text_chunk_overlap: 10,
            code_chunk_size: 60,
            code_chunk_overlap: 0,
            ..Default::default()
        };
        Chunker::new(config, Arc::new(Unreachable), 8)
    }

    #[tokio::test]
    async fn text_chunks_keep_metadata_and_indices() {
        let d = doc(
            "README.md",
            "First paragraph about the project.\n\nSecond paragraph with usage notes.\n\nThird.",
        );
        let outcome = chunker(TextSplitterKind::Recursive)
            .split_text_documents(std::slice::from_ref(&d))
            .await;
        assert!(outcome.succeeded);
        assert!(outcome.chunks.len() >= 2);
        for (i, c) in outcome.chunks.iter().enumerate() {
            assert_eq!(c.metadata, d.metadata);
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.hash.len(), 64);
        }
        assert_eq!(
            outcome.message,
            format!("Split 1 text files into {} chunks", outcome.chunks.len())
        );
    }

    #[tokio::test]
    async fn code_chunks_use_language_separators() {
        let d = doc(
            "lib.rs",
            "use std::io;\n\nfn alpha() -> u32 {\n    1\n}\n\nfn beta() -> u32 {\n    2\n}\n",
        );
        let outcome = chunker(TextSplitterKind::Recursive)
            .split_code_documents(&[d])
            .await;
        assert!(outcome.succeeded);
        assert!(outcome.chunks.iter().all(|c| c.metadata.path == "lib.rs"));
        assert!(outcome.message.starts_with("Split 1 code files into"));
    }

    #[tokio::test]
    async fn semantic_failure_is_reported_not_raised() {
        let d = doc("guide.md", "One sentence. Another sentence. A third one.");
        let outcome = chunker(TextSplitterKind::Semantic)
            .split_text_documents(&[d])
            .await;
        assert!(!outcome.succeeded);
        assert!(outcome.chunks.is_empty());
        assert!(outcome.message.starts_with("Error splitting text files:"));
        assert!(outcome.message.contains("service unreachable"));
        assert_eq!(outcome.error_code, Some("embedding_error"));
    }

    #[tokio::test]
    async fn failure_carries_the_underlying_error_code() {
        let config = ChunkingConfig {
            text_splitter: TextSplitterKind::Semantic,
            ..Default::default()
        };
        let chunker = Chunker::new(config, Arc::new(Misconfigured), 8);
        let outcome = chunker
            .split_text_documents(&[doc("guide.md", "One sentence. Another one. And a third.")])
            .await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_code, Some("configuration_error"));
    }

    #[tokio::test]
    async fn no_documents_is_a_successful_empty_split() {
        let outcome = chunker(TextSplitterKind::Semantic)
            .split_text_documents(&[])
            .await;
        assert!(outcome.succeeded);
        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.message, "Split 0 text files into 0 chunks");
        assert_eq!(outcome.error_code, None);
    }

    #[test]
    fn hash_is_deterministic() {
        let d = doc("a.md", "");
        let a = make_chunk(&d, 0, "same".to_string());
        let b = make_chunk(&d, 3, "same".to_string());
        assert_eq!(a.hash, b.hash);
    }
}
