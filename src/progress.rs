//! Ingest progress reporting.
//!
//! Stage transitions during `dossier ingest` are emitted on **stderr**
//! so stdout remains parseable for scripts.

use std::io::Write;

/// Pipeline stage of an ingest run, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngestStage {
    Load,
    Chunk,
    Embed,
    Store,
    Done,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Load => "load",
            IngestStage::Chunk => "chunk",
            IngestStage::Embed => "embed",
            IngestStage::Store => "store",
            IngestStage::Done => "done",
        }
    }
}

/// A single progress event. Stage events fire before the stage runs;
/// the embed stage additionally reports per-batch progress.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    Stage { stage: IngestStage, detail: String },
    EmbedBatch { n: usize, total: usize },
}

/// Reports ingest progress. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly lines: "ingest  embed  batch 3 / 12".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Stage { stage, detail } => {
                if detail.is_empty() {
                    format!("ingest  {}\n", stage.as_str())
                } else {
                    format!("ingest  {}  {}\n", stage.as_str(), detail)
                }
            }
            IngestEvent::EmbedBatch { n, total } => {
                format!("ingest  embed  batch {} / {}\n", n, total)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Stage { stage, detail } => serde_json::json!({
                "event": "progress",
                "stage": stage.as_str(),
                "detail": detail,
            }),
            IngestEvent::EmbedBatch { n, total } => serde_json::json!({
                "event": "progress",
                "stage": "embed",
                "batch": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human when stderr is a terminal, off otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(IngestStage::Load.as_str(), "load");
        assert_eq!(IngestStage::Embed.as_str(), "embed");
        assert_eq!(IngestStage::Done.as_str(), "done");
    }

    #[test]
    fn json_event_shape() {
        let obj = serde_json::json!({
            "event": "progress",
            "stage": "embed",
            "batch": 2usize,
            "total": 5usize,
        });
        let line = serde_json::to_string(&obj).unwrap();
        assert!(line.contains("\"stage\":\"embed\""));
        assert!(line.contains("\"batch\":2"));
    }
}
