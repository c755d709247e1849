//! Extension-based partition of fetched documents into prose and code.

use crate::models::Document;

pub const TEXT_EXTENSIONS: &[&str] = &["md", "txt", "rst", "doc", "docx", "pdf"];

pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "java", "cpp", "c", "cs", "go", "rb", "php", "ts", "html", "css", "sh", "sql",
    "rs", "kt", "scala", "swift", "lua", "hs", "tsx", "jsx", "proto", "sol",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Text,
    Code,
}

/// Category of a repository path, or `None` for unrecognized extensions.
pub fn categorize(path: &str) -> Option<FileCategory> {
    let ext = std::path::Path::new(path)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Text)
    } else if CODE_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Code)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub text: Vec<Document>,
    pub code: Vec<Document>,
}

/// Splits `docs` by category, preserving input order. Unrecognized files
/// land in neither list.
pub fn partition(docs: &[Document]) -> Partition {
    let mut out = Partition::default();
    for doc in docs {
        match categorize(&doc.metadata.path) {
            Some(FileCategory::Text) => out.text.push(doc.clone()),
            Some(FileCategory::Code) => out.code.push(doc.clone()),
            None => tracing::debug!(path = %doc.metadata.path, "unclassified file dropped"),
        }
    }
    out
}
