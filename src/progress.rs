//! Pipeline stage reporting.
//!
//! Each run of the question-answering pipeline announces the stage it is in
//! and the outcome of that stage, so users can see what is being fetched,
//! split and indexed. Human and JSON output go to **stderr** so stdout stays
//! reserved for the answer.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Stage of a pipeline run, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Fetch,
    Classify,
    ChunkText,
    ChunkCode,
    Index,
    Retrieve,
    Answer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Classify => "classify",
            Stage::ChunkText => "chunk_text",
            Stage::ChunkCode => "chunk_code",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::Answer => "answer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    Started { stage: Stage },
    Finished { stage: Stage, message: String },
    /// The run halts after this event.
    Failed { stage: Stage, message: String },
}

impl PipelineEvent {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineEvent::Started { stage }
            | PipelineEvent::Finished { stage, .. }
            | PipelineEvent::Failed { stage, .. } => *stage,
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &PipelineEvent);
}

/// Human-friendly lines on stderr: `"[fetch] Loaded 1,234 files from a/b@main"`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &PipelineEvent) {
        let line = match event {
            PipelineEvent::Started { stage } => format!("[{}] ...\n", stage),
            PipelineEvent::Finished { stage, message } => format!("[{}] {}\n", stage, message),
            PipelineEvent::Failed { stage, message } => {
                format!("[{}] FAILED: {}\n", stage, message)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &PipelineEvent) {
        let obj = match event {
            PipelineEvent::Started { stage } => serde_json::json!({
                "event": "stage_started",
                "stage": stage,
            }),
            PipelineEvent::Finished { stage, message } => serde_json::json!({
                "event": "stage_finished",
                "stage": stage,
                "message": message,
            }),
            PipelineEvent::Failed { stage, message } => serde_json::json!({
                "event": "stage_failed",
                "stage": stage,
                "message": message,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Routes events into `tracing`; used by the web server.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started { stage } => tracing::debug!(%stage, "stage started"),
            PipelineEvent::Finished { stage, message } => tracing::info!(%stage, "{}", message),
            PipelineEvent::Failed { stage, message } => tracing::warn!(%stage, "{}", message),
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &PipelineEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn stage_names_match_serde() {
        for stage in [Stage::Validate, Stage::ChunkText, Stage::Answer] {
            let v = serde_json::to_value(stage).unwrap();
            assert_eq!(v, serde_json::Value::String(stage.as_str().to_string()));
        }
    }

    #[test]
    fn event_exposes_stage() {
        let e = PipelineEvent::Failed {
            stage: Stage::Index,
            message: "x".into(),
        };
        assert_eq!(e.stage(), Stage::Index);
    }
}
