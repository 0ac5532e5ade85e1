//! User-facing log sink.
//!
//! Conflict warnings and per-import diagnostics are written here in addition
//! to the structured `tracing` log. The resolver never reads anything back.

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Severity of a terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Sink for user-facing resolver messages.
pub trait Terminal: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Forwards terminal messages to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTerminal;

impl Terminal for TracingTerminal {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!(target: "soldeps::terminal", "{message}"),
            Severity::Warning => tracing::warn!(target: "soldeps::terminal", "{message}"),
            Severity::Error => tracing::error!(target: "soldeps::terminal", "{message}"),
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingTerminal {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl RecordingTerminal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages logged so far.
    #[must_use]
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages logged at `severity`.
    #[must_use]
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Terminal for RecordingTerminal {
    fn log(&self, severity: Severity, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((severity, message.to_string()));
        }
    }
}
