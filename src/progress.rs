//! Audit and indexing progress reporting.
//!
//! Reports observable progress during `uxaudit audit` and
//! `uxaudit knowledge index` so users see which stage an audit is in and how
//! many batches are left. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use uxaudit_core::models::ProcessingStage;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The audit moved to a new stage.
    Stage {
        audit_id: String,
        stage: ProcessingStage,
    },
    /// Frames are on disk.
    FramesExtracted { audit_id: String, frames: usize },
    /// Batch `n` of `total` finished with this quality score.
    BatchDone {
        audit_id: String,
        n: usize,
        total: usize,
        quality: f64,
    },
    /// A knowledge file was chunked and embedded.
    Indexed { source: String, chunks: usize },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the orchestrator and indexer.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "audit 3f2a…  batch 4 / 9  quality 82.5".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Stage { audit_id, stage } => {
                format!("audit {}  {}\n", short_id(audit_id), stage.message())
            }
            ProgressEvent::FramesExtracted { audit_id, frames } => {
                format!(
                    "audit {}  extracted {} frames\n",
                    short_id(audit_id),
                    format_number(*frames as u64)
                )
            }
            ProgressEvent::BatchDone {
                audit_id,
                n,
                total,
                quality,
            } => format!(
                "audit {}  batch {} / {}  quality {:.1}\n",
                short_id(audit_id),
                n,
                total,
                quality
            ),
            ProgressEvent::Indexed { source, chunks } => {
                format!("index {}  {} chunks\n", source, format_number(*chunks as u64))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Stage { audit_id, stage } => serde_json::json!({
                "event": "stage",
                "audit_id": audit_id,
                "stage": stage.as_str()
            }),
            ProgressEvent::FramesExtracted { audit_id, frames } => serde_json::json!({
                "event": "frames",
                "audit_id": audit_id,
                "frames": frames
            }),
            ProgressEvent::BatchDone {
                audit_id,
                n,
                total,
                quality,
            } => serde_json::json!({
                "event": "batch",
                "audit_id": audit_id,
                "n": n,
                "total": total,
                "quality": quality
            }),
            ProgressEvent::Indexed { source, chunks } => serde_json::json!({
                "event": "indexed",
                "source": source,
                "chunks": chunks
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
    fn report(&self, _event: ProgressEvent) {}
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
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
