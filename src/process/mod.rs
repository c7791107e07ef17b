//! External process execution
//!
//! Every tool the pipeline drives (rsync, dump tools, tar, scripts, the
//! secret store) is spawned through a [`ProcessRunner`]. Entities only build
//! [`Invocation`]s; the runner owns spawning and stream handling.

pub mod runner;
pub mod sink;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use runner::TokioProcessRunner;
pub use sink::{LogSink, NoopSink, OutputSink, StreamKind};

/// Error types for process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// A fully built external command: program, arguments, environment
/// overrides and working directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Build an invocation from a full argument vector (`argv[0]` is the program)
    pub fn from_argv(argv: Vec<String>) -> Result<Self, ProcessError> {
        let mut parts = argv.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProcessError::InvalidCommand("Command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            ..Self::default()
        })
    }

    /// Split a command line with POSIX shell rules
    pub fn parse(command_line: &str) -> Result<Self, ProcessError> {
        let argv = shlex::split(command_line).ok_or_else(|| {
            ProcessError::InvalidCommand(format!("Unbalanced quoting in '{}'", command_line))
        })?;
        Self::from_argv(argv)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The complete argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Render as a single shell-quoted line for logs
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|a| shlex::try_quote(a).map(|q| q.into_owned()).unwrap_or_else(|_| a.clone()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` when the child was killed by a signal
    pub code: Option<i32>,
    /// Captured stdout lines (empty when stdout was redirected to a file)
    pub stdout: Vec<String>,
    /// Captured stderr lines
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human readable exit status
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }
}

/// Capability to run external commands.
///
/// Implementations must drain stdout and stderr concurrently: a child
/// blocked on a full stderr pipe never reaches EOF on stdout.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, delivering every output line to `sink` and
    /// capturing both streams in the returned output
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Arc<dyn OutputSink>,
    ) -> Result<ProcessOutput, ProcessError>;

    /// Run to completion, gzip-compressing stdout into `destination` while
    /// stderr is captured
    async fn run_to_file(
        &self,
        invocation: &Invocation,
        destination: &Path,
    ) -> Result<ProcessOutput, ProcessError>;
}
