//! Backup entities
//!
//! Sources, database targets and scripts each know how to build their own
//! external invocation and where their output lands. They are created once
//! by the resolver and only read afterwards.

pub mod database;
pub mod location;
pub mod script;
pub mod source;

use crate::process::{ProcessError, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

pub use database::{Credential, DatabaseTarget, DumpCommand, Engine};
pub use location::{local_hostname, Location};
pub use script::Script;
pub use source::{Source, SyncCommand};

/// Timestamp used in dump and snapshot file names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Command construction errors
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("No target directory configured for '{0}'")]
    MissingTarget(String),

    #[error("Path '{0}' climbs out of its target directory with '..'")]
    ParentTraversal(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid options '{0}': unbalanced quoting")]
    InvalidOptions(String),

    #[error("Secret store lookup for '{reference}' failed: {reason}")]
    SecretLookup { reference: String, reason: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// A non-fatal problem recorded while running a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Label of the task that failed
    pub task: String,
    pub reason: String,
}

impl Failure {
    pub fn new(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.task, self.reason)
    }
}

/// Anything the pipeline executor can run for a step
#[async_trait]
pub trait BackupTask: Send + Sync {
    /// Short name used in logs and reports
    fn label(&self) -> String;

    /// Run the task. Failures are collected, never raised.
    async fn execute(&self, runner: &dyn ProcessRunner) -> Vec<Failure>;
}

/// Current local time formatted for file names
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Create a directory (and parents) unless it already exists
pub fn ensure_dir(path: &Path) -> Result<(), EntityError> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|source| EntityError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Split an options string with shell rules
pub fn split_options(options: &str) -> Result<Vec<String>, EntityError> {
    shlex::split(options).ok_or_else(|| EntityError::InvalidOptions(options.to_string()))
}

/// Log the result of a child process and turn a failed one into a [`Failure`]
pub(crate) fn check_outcome(
    task: &str,
    result: Result<ProcessOutput, ProcessError>,
) -> Option<Failure> {
    match result {
        Ok(output) if output.success() => {
            info!("{} finished successfully", task);
            None
        }
        Ok(output) => {
            let stderr = output.stderr_text();
            error!("{} failed with {}: {}", task, output.status_text(), stderr.trim());
            Some(Failure::new(task, format!("{}: {}", output.status_text(), stderr.trim())))
        }
        Err(e) => {
            error!("{} could not run: {}", task, e);
            Some(Failure::new(task, e.to_string()))
        }
    }
}
