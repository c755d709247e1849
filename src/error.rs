//! Error kinds surfaced by the retrieval pipeline.
//!
//! Each variant maps to one failure class the frontend can tell apart.
//! Components that must not raise past their boundary (chunking, index
//! build) convert these into messages instead; see [`crate::chunk`] and
//! [`crate::index`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The repository identifier is neither `owner/repo` nor a GitHub URL.
    #[error("Invalid format '{0}'. Use 'owner/repo' or 'https://github.com/owner/repo'")]
    InvalidRepositoryFormat(String),

    /// The source API answered 404 for the repository.
    #[error("Repository '{0}' not found")]
    RepositoryNotFound(String),

    /// The source API answered 401 for the repository.
    #[error("Insufficient permissions to read '{0}'. Check that the GitHub token is valid and has 'public_repo' scope")]
    InsufficientPermissions(String),

    /// Any other source API failure.
    #[error("Error fetching repository: {0}")]
    Fetch(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    /// Build, persist or load failure of the vector index.
    #[error("Vector index error: {0}")]
    Index(String),

    /// Generation failure of the language model.
    #[error("Language model error: {0}")]
    Model(String),

    /// Missing credential or invalid setting, raised at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Machine-readable code used in JSON error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRepositoryFormat(_) => "invalid_repository_format",
            Error::RepositoryNotFound(_) => "repository_not_found",
            Error::InsufficientPermissions(_) => "insufficient_permissions",
            Error::Fetch(_) => "fetch_error",
            Error::Embedding(_) => "embedding_error",
            Error::Index(_) => "index_error",
            Error::Model(_) => "model_error",
            Error::Configuration(_) => "configuration_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_message_names_both_shapes() {
        let msg = Error::InvalidRepositoryFormat("a/b/c".into()).to_string();
        assert!(msg.contains("owner/repo"));
        assert!(msg.contains("https://github.com/owner/repo"));
        assert!(msg.contains("a/b/c"));
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            Error::InvalidRepositoryFormat(String::new()),
            Error::RepositoryNotFound(String::new()),
            Error::InsufficientPermissions(String::new()),
            Error::Fetch(String::new()),
            Error::Embedding(String::new()),
            Error::Index(String::new()),
            Error::Model(String::new()),
            Error::Configuration(String::new()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(Error::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
