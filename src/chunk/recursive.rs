//! Recursive character splitter.
//!
//! Tries separators from coarse to fine. Text is cut at the first separator
//! that occurs in it; the pieces are merged back into windows of at most
//! `chunk_size` characters that overlap by up to `chunk_overlap`. Pieces
//! that are still too large are split again with the remaining, finer
//! separators. Each separator stays attached to the start of the piece that
//! follows it, so no text is lost between chunks.

use async_trait::async_trait;

use super::Splitter;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators,
        }
    }

    pub fn for_language(
        language: super::Language,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let separators = language.separators().iter().map(|s| s.to_string()).collect();
        Self::new(chunk_size, chunk_overlap, separators)
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let none: &[String] = &[];
        let (separator, finer) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(s.as_str()))
            .map(|(i, s)| (s.as_str(), &separators[i + 1..]))
            .unwrap_or(("", none));

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Packs consecutive pieces into windows, carrying a tail of up to
    /// `chunk_overlap` characters into the next window.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    tracing::debug!(
                        size = total,
                        limit = self.chunk_size,
                        "created a chunk larger than chunk_size"
                    );
                }
                push_joined(&mut out, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(&mut out, &window);
        out
    }
}

#[async_trait]
impl Splitter for RecursiveSplitter {
    async fn split(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.split_text(text))
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(out: &mut Vec<String>, window: &std::collections::VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Splits at every occurrence of `separator`, keeping the separator at the
/// start of the following piece. An empty separator splits into characters.
/// Empty pieces are dropped.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Language;

    fn text_splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(
            size,
            overlap,
            ["\n\n", "\n", ".", " ", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(
            split_keep_separator("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keep_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
        assert_eq!(split_keep_separator("héllo", ""), vec!["h", "é", "l", "l", "o"]);
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = text_splitter(200, 50).split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(text_splitter(200, 50).split_text("").is_empty());
        assert!(text_splitter(200, 50).split_text(" \n\n ").is_empty());
    }

    #[test]
    fn words_merge_with_overlap() {
        let chunks = text_splitter(10, 4).split_text("aaa bbb ccc ddd eee");
        assert_eq!(chunks, vec!["aaa bbb", "bbb ccc", "ccc ddd", "ddd eee"]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = text_splitter(200, 50).split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 200, "{} chars", c.chars().count());
        }
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let para_a = "alpha ".repeat(20);
        let para_b = "beta ".repeat(20);
        let text = format!("{}\n\n{}", para_a.trim(), para_b.trim());
        let chunks = text_splitter(150, 0).split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("alpha"));
        assert!(chunks[1].starts_with("beta"));
    }

    #[test]
    fn python_code_splits_on_definitions() {
        let code = "import os\n\n\ndef first():\n    return 1\n\n\ndef second():\n    return 2\n";
        let splitter = RecursiveSplitter::for_language(Language::Python, 30, 0);
        let chunks = splitter.split_text(code);
        assert_eq!(
            chunks,
            vec![
                "import os",
                "def first():\n    return 1",
                "def second():\n    return 2"
            ]
        );
    }

    #[test]
    fn oversized_token_is_split_by_characters() {
        let chunks = text_splitter(4, 0).split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }
}
