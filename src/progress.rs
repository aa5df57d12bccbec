//! Backfill progress reporting.
//!
//! Reports what the backfill is doing (discovering folders, which folder is
//! being scanned, how many documents went through) so an operator can follow
//! a long initial sync. Progress is emitted on **stderr** so stdout stays
//! parseable for scripts; engine diagnostics go through `tracing`.

use std::io::Write;

/// A single progress event for backfill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// Searching for folders carrying the sync aspect. Total unknown.
    Discovering,
    /// Starting folder `n` of `total` folders that need a pass.
    Folder { folder: String, n: u64, total: u64 },
    /// `n` documents of the folder processed so far.
    Documents {
        folder: String,
        n: u64,
        total: Option<u64>,
    },
}

/// Reports backfill progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "backfill 3f2a…  documents  1,234 / 5,000".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Discovering => "backfill  discovering folders...\n".to_string(),
            SyncProgressEvent::Folder { folder, n, total } => {
                format!("backfill {}  folder {} / {}\n", folder, n, total)
            }
            SyncProgressEvent::Documents { folder, n, total } => match total {
                Some(total) => format!(
                    "backfill {}  documents  {} / {}\n",
                    folder,
                    format_number(*n),
                    format_number(*total)
                ),
                None => format!("backfill {}  documents  {}\n", folder, format_number(*n)),
            },
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Discovering => serde_json::json!({
                "event": "progress",
                "phase": "discovering"
            }),
            SyncProgressEvent::Folder { folder, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "folder",
                "folder": folder,
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Documents { folder, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "documents",
                "folder": folder,
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

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
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
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
