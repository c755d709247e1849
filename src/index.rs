//! Persisted vector index over embedded chunks.
//!
//! An index is one SQLite file holding a `manifest` table and an `entries`
//! table (chunk text, provenance metadata and the embedding as a
//! little-endian `f32` BLOB). Builds write to `<path>.tmp` and rename over
//! the destination, so an index on disk is always complete and a rebuild
//! replaces the previous one wholesale.
//!
//! Search is exhaustive cosine similarity over entries held in memory.
//! Entries are only ever added at build time; there is no update or delete.

use chrono::Utc;
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_batched, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{Chunk, DocumentMetadata, IndexEntry};

/// Facts recorded alongside the entries at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub model: String,
    pub dims: usize,
    pub repo: String,
    pub branch: String,
    pub built_at: String,
}

pub struct VectorIndex {
    path: PathBuf,
    manifest: Manifest,
    entries: Vec<IndexEntry>,
}

/// Result of [`VectorIndex::build`]: the index, or `None` plus the reason.
pub struct IndexOutcome {
    pub index: Option<VectorIndex>,
    pub message: String,
}

impl VectorIndex {
    /// Embeds every chunk and persists the index at `path`, replacing any
    /// index already there. Never returns an error; failures (including
    /// an empty `chunks`) yield `index: None` and a message.
    pub async fn build(
        embedder: &dyn Embedder,
        chunks: Vec<Chunk>,
        path: &Path,
        batch_size: usize,
    ) -> IndexOutcome {
        let count = chunks.len();
        match Self::try_build(embedder, chunks, path, batch_size).await {
            Ok(index) => {
                let message = format!(
                    "Stored {} chunks in vector index at {}",
                    count,
                    path.display()
                );
                tracing::info!("{}", message);
                IndexOutcome {
                    index: Some(index),
                    message,
                }
            }
            Err(e) => {
                let message = format!("Error storing chunks in vector store: {}", e);
                tracing::warn!("{}", message);
                IndexOutcome {
                    index: None,
                    message,
                }
            }
        }
    }

    async fn try_build(
        embedder: &dyn Embedder,
        chunks: Vec<Chunk>,
        path: &Path,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::Index("no chunks to index".to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embed_batched(embedder, &texts, batch_size).await?;

        let dims = embeddings.first().map(Vec::len).unwrap_or(0);
        if dims == 0 || embeddings.iter().any(|e| e.len() != dims) {
            return Err(Error::Embedding(
                "embedding service returned vectors of inconsistent dimension".to_string(),
            ));
        }

        let first = &chunks[0].metadata;
        let manifest = Manifest {
            model: embedder.model_name().to_string(),
            dims,
            repo: first.repo.clone(),
            branch: first.branch.clone(),
            built_at: Utc::now().to_rfc3339(),
        };
        let entries: Vec<IndexEntry> = embeddings
            .into_iter()
            .zip(chunks)
            .map(|(embedding, chunk)| IndexEntry { embedding, chunk })
            .collect();

        persist(path, &manifest, &entries)
            .await
            .map_err(|e| Error::Index(format!("{:#}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            entries,
        })
    }

    /// Loads an index previously written by [`VectorIndex::build`].
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Index(format!("no index at {}", path.display())));
        }
        load(path)
            .await
            .map_err(|e| Error::Index(format!("{}: {:#}", path.display(), e)))
    }

    /// The `k` chunks most similar to `query`, best first. Equal scores
    /// keep insertion order.
    pub async fn retrieve(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<Chunk>> {
        let q = embedder.embed_query(query).await?;
        if q.len() != self.manifest.dims {
            return Err(Error::Index(format!(
                "query embedding has {} dimensions, index has {}",
                q.len(),
                self.manifest.dims
            )));
        }

        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (cosine_similarity(&q, &e.embedding), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.entries[i].chunk.clone())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

async fn persist(path: &Path, manifest: &Manifest, entries: &[IndexEntry]) -> anyhow::Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }

    let pool = db::connect(&tmp, true).await?;
    migrate::run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;
    for (key, value) in [
        ("model", manifest.model.clone()),
        ("dims", manifest.dims.to_string()),
        ("repo", manifest.repo.clone()),
        ("branch", manifest.branch.clone()),
        ("built_at", manifest.built_at.clone()),
    ] {
        sqlx::query("INSERT INTO manifest (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    for entry in entries {
        let c = &entry.chunk;
        sqlx::query(
            "INSERT INTO entries (path, repo, branch, sha, source_url, chunk_index, content, hash, embedding)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&c.metadata.path)
        .bind(&c.metadata.repo)
        .bind(&c.metadata.branch)
        .bind(&c.metadata.sha)
        .bind(&c.metadata.source_url)
        .bind(c.chunk_index)
        .bind(&c.content)
        .bind(&c.hash)
        .bind(vec_to_blob(&entry.embedding))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    pool.close().await;

    if path.exists() {
        std::fs::remove_file(path)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

async fn load(path: &Path) -> anyhow::Result<VectorIndex> {
    let pool = db::connect(path, false).await?;

    let rows = sqlx::query("SELECT key, value FROM manifest")
        .fetch_all(&pool)
        .await?;
    let mut manifest = Manifest {
        model: String::new(),
        dims: 0,
        repo: String::new(),
        branch: String::new(),
        built_at: String::new(),
    };
    for row in rows {
        let key: String = row.get("key");
        let value: String = row.get("value");
        match key.as_str() {
            "model" => manifest.model = value,
            "dims" => manifest.dims = value.parse()?,
            "repo" => manifest.repo = value,
            "branch" => manifest.branch = value,
            "built_at" => manifest.built_at = value,
            _ => {}
        }
    }

    let rows = sqlx::query(
        "SELECT path, repo, branch, sha, source_url, chunk_index, content, hash, embedding
         FROM entries ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;
    pool.close().await;

    let entries = rows
        .into_iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            IndexEntry {
                embedding: blob_to_vec(&blob),
                chunk: Chunk {
                    content: row.get("content"),
                    metadata: DocumentMetadata {
                        path: row.get("path"),
                        repo: row.get("repo"),
                        branch: row.get("branch"),
                        sha: row.get("sha"),
                        source_url: row.get("source_url"),
                    },
                    chunk_index: row.get("chunk_index"),
                    hash: row.get("hash"),
                },
            }
        })
        .collect();

    Ok(VectorIndex {
        path: path.to_path_buf(),
        manifest,
        entries,
    })
}
