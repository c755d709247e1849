//! # repo-qa
//!
//! Question answering over GitHub repositories.
//!
//! A repository is fetched through the GitHub API, its files are split into
//! prose and source code, each partition is chunked with a strategy suited
//! to it (semantic for prose, language-aware recursive for code), the chunks
//! are embedded into a persisted vector index, and questions are answered by
//! a language model prompted with the best-matching chunks and the running
//! conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Classify │──▶│  Chunk   │──▶│  Index   │
//! │  fetch   │   │text/code │   │sem / rec │   │ (SQLite) │
//! └──────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                   │ top-k
//!                ┌──────────┐   ┌──────────┐   ┌────▼─────┐
//!                │ CLI/Web  │◀──│  Answer  │◀──│  Prompt  │
//!                └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`error`] | Error kinds |
//! | [`models`] | Core data types |
//! | [`connector_github`] | Repository fetcher |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`classify`] | Text/code partitioning |
//! | [`chunk`] | Semantic and recursive splitters |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted vector index |
//! | [`prompt`] | Prompt composition |
//! | [`llm`] | Chat-completion client |
//! | [`session`] | Conversation state |
//! | [`answer`] | Answer generation |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`progress`] | Stage reporting |
//! | [`server`] | Web frontend and JSON API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |

pub mod answer;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod connector_github;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod session;
