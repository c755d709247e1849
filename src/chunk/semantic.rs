//! Embedding-similarity splitter for prose.
//!
//! The text is cut into sentences; each sentence is embedded together with
//! `buffer_size` neighbours on either side, and the cosine distance between
//! consecutive windows is measured. A chunk boundary goes wherever that
//! distance exceeds the breakpoint threshold computed over all distances.

use async_trait::async_trait;
use std::sync::Arc;

use super::Splitter;
use crate::config::BreakpointThreshold;
use crate::embedding::{cosine_similarity, embed_batched, Embedder};
use crate::error::Result;

pub struct SemanticSplitter {
    embedder: Arc<dyn Embedder>,
    threshold: BreakpointThreshold,
    amount: f64,
    buffer_size: usize,
    batch_size: usize,
}

impl SemanticSplitter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        threshold: BreakpointThreshold,
        amount: f64,
        buffer_size: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            threshold,
            amount,
            buffer_size,
            batch_size,
        }
    }
}

#[async_trait]
impl Splitter for SemanticSplitter {
    async fn split(&self, text: &str) -> Result<Vec<String>> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let windows = combine_sentences(&sentences, self.buffer_size);
        let embeddings = embed_batched(self.embedder.as_ref(), &windows, self.batch_size).await?;
        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]) as f64)
            .collect();

        let cutoff = breakpoint_cutoff(&distances, self.threshold, self.amount);
        Ok(group_sentences(&sentences, &distances, cutoff))
    }
}

/// Splits after `.`, `?` or `!` when followed by whitespace. The whitespace
/// run is dropped; blank sentences are discarded.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let ends_sentence = matches!(c, '.' | '?' | '!')
            && chars.peek().map(|n| n.is_whitespace()).unwrap_or(false);
        if ends_sentence {
            while chars.peek().map(|n| n.is_whitespace()).unwrap_or(false) {
                chars.next();
            }
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let s = current.trim();
    if !s.is_empty() {
        sentences.push(s.to_string());
    }
    current.clear();
}

/// Each sentence joined with up to `buffer` sentences before and after it.
fn combine_sentences(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let start = i.saturating_sub(buffer);
            let end = (i + buffer + 1).min(sentences.len());
            sentences[start..end].join(" ")
        })
        .collect()
}

fn breakpoint_cutoff(distances: &[f64], kind: BreakpointThreshold, amount: f64) -> f64 {
    match kind {
        BreakpointThreshold::StandardDeviation => mean(distances) + amount * std_dev(distances),
        BreakpointThreshold::Percentile => percentile(distances, amount),
        BreakpointThreshold::Interquartile => {
            let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
            mean(distances) + amount * iqr
        }
    }
}

fn group_sentences(sentences: &[String], distances: &[f64], cutoff: f64) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, &d) in distances.iter().enumerate() {
        if d > cutoff {
            chunks.push(sentences[start..=i].join(" "));
            start = i + 1;
        }
    }
    if start < sentences.len() {
        chunks.push(sentences[start..].join(" "));
    }
    chunks
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation.
fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
