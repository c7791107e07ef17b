//! Line sinks for child process output
//!
//! Both drain tasks of a running child deliver each line to an
//! [`OutputSink`] as soon as it is read, so a script's output shows up live
//! while the process is still running.

use std::io::Write;
use tracing::{error, info};

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Callback for processing output lines as they arrive
///
/// This trait is object-safe and shared between the two drain tasks as
/// `Arc<dyn OutputSink>`.
pub trait OutputSink: Send + Sync {
    /// Called once per line, without the trailing newline
    fn on_line(&self, stream: StreamKind, line: &str);
}

/// Sink that discards everything
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn on_line(&self, _stream: StreamKind, _line: &str) {}
}

/// Logs stdout lines at info and stderr lines at error, and echoes each
/// line to the matching stream of this process
#[derive(Debug, Clone)]
pub struct LogSink {
    label: String,
}

impl LogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl OutputSink for LogSink {
    fn on_line(&self, stream: StreamKind, line: &str) {
        match stream {
            StreamKind::Stdout => {
                info!(task = %self.label, "{}", line);
                let _ = writeln!(std::io::stdout().lock(), "{}", line);
            }
            StreamKind::Stderr => {
                error!(task = %self.label, "{}", line);
                let _ = writeln!(std::io::stderr().lock(), "{}", line);
            }
        }
    }
}
