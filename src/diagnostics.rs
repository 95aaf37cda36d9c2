//! Diagnostic sinks.
//!
//! Flow `log` steps, interpreter warnings and compiler notes are delivered to a
//! [`DiagnosticSink`] handle that the caller passes in, rather than to a global logger.
//! The default [`TracingSink`] forwards everything to `tracing`, so hosts keep
//! control of formatting and filtering through their subscriber.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Severity of a diagnostic or of a flow `log` step.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    #[serde(alias = "log")]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives diagnostics produced while running or compiling a flow.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, level: LogLevel, message: &str);
}

/// Forwards diagnostics to the `tracing` macros under the `jsonflow::flow` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "jsonflow::flow", "{}", message),
            LogLevel::Info => tracing::info!(target: "jsonflow::flow", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "jsonflow::flow", "{}", message),
            LogLevel::Error => tracing::error!(target: "jsonflow::flow", "{}", message),
        }
    }
}

/// Keeps every diagnostic in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages emitted at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}
