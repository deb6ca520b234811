//! Indexing progress reporting.
//!
//! Reports observable progress during `pidx index` and `pidx update` so users
//! see how many files are done and which failed. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event for an indexing run.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Listing the project's files. Total unknown.
    Discovering { project_id: String },
    /// A file finished (indexed, skipped, or failed): `n` of `total` done.
    FileDone {
        project_id: String,
        path: String,
        outcome: FileOutcome,
        n: u64,
        total: u64,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileOutcome {
    Indexed,
    Partial,
    Skipped,
    Failed,
    Cancelled,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOutcome::Indexed => "indexed",
            FileOutcome::Partial => "partial",
            FileOutcome::Skipped => "skipped",
            FileOutcome::Failed => "failed",
            FileOutcome::Cancelled => "cancelled",
        }
    }
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index 3f2a…  12 / 340 files  indexed src/main.py".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Discovering { project_id } => {
                format!("index {}  discovering...\n", project_id)
            }
            IndexProgressEvent::FileDone {
                project_id,
                path,
                outcome,
                n,
                total,
            } => format!(
                "index {}  {} / {} files  {} {}\n",
                project_id,
                format_number(*n),
                format_number(*total),
                outcome.as_str(),
                path
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Discovering { project_id } => serde_json::json!({
                "event": "progress",
                "project_id": project_id,
                "phase": "discovering"
            }),
            IndexProgressEvent::FileDone {
                project_id,
                path,
                outcome,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "project_id": project_id,
                "phase": "indexing",
                "path": path,
                "outcome": outcome.as_str(),
                "n": n,
                "total": total
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

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
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

    pub fn reporter(&self) -> Arc<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
