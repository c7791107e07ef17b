//! Auxiliary scripts: pipeline `script-<id>` steps and source pre/post hooks

use crate::entity::{check_outcome, BackupTask, Failure};
use crate::process::{Invocation, LogSink, ProcessError, ProcessRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// A command line run through the process runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Pipeline id; `None` for hooks owned by a source
    pub id: Option<u32>,
    pub command: String,
    pub cwd: Option<PathBuf>,
}

impl Script {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            cwd: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Shell-split the command line and apply the working directory
    pub fn invocation(&self) -> Result<Invocation, ProcessError> {
        let invocation = Invocation::parse(&self.command)?;
        Ok(match &self.cwd {
            Some(dir) => invocation.current_dir(dir),
            None => invocation,
        })
    }

    /// Run the script, streaming its output to the log and the terminal.
    ///
    /// A non-zero exit is logged and returned as a failure, never as an error.
    pub async fn run(&self, runner: &dyn ProcessRunner) -> Option<Failure> {
        let label = self.label();
        let invocation = match self.invocation() {
            Ok(invocation) => invocation,
            Err(e) => {
                error!("{}: {}", label, e);
                return Some(Failure::new(label, e.to_string()));
            }
        };

        info!("Running {}: {}", label, invocation.display());
        let result = runner.run(&invocation, Arc::new(LogSink::new(label.clone()))).await;
        check_outcome(&label, result)
    }
}

#[async_trait]
impl BackupTask for Script {
    fn label(&self) -> String {
        match self.id {
            Some(id) => format!("script-{}", id),
            None => format!("hook '{}'", self.command),
        }
    }

    async fn execute(&self, runner: &dyn ProcessRunner) -> Vec<Failure> {
        self.run(runner).await.into_iter().collect()
    }
}
