//! Test utility functions for backhaul
#![allow(dead_code)]

use async_trait::async_trait;
use backhaul::execution::{DisableToggles, PipelineExecutor, PipelineReport};
use backhaul::process::{Invocation, OutputSink, ProcessError, ProcessOutput, ProcessRunner, StreamKind};
use backhaul::{ConfigResolver, ResolvedConfiguration};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Set for invocations whose stdout went to a file
    pub destination: Option<PathBuf>,
}

impl Call {
    /// Program name, looking past a `sudo` prefix
    pub fn tool(&self) -> &str {
        match self.argv.first().map(String::as_str) {
            Some("sudo") => self.argv.get(1).map(String::as_str).unwrap_or("sudo"),
            Some(program) => program,
            None => "",
        }
    }
}

/// Mock runner that records every invocation instead of spawning it
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Call>>,
    exit_codes: HashMap<String, i32>,
    stderr: HashMap<String, Vec<String>>,
    secrets: HashMap<String, String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation of `tool` exit with `code`
    pub fn with_exit_code(mut self, tool: &str, code: i32) -> Self {
        self.exit_codes.insert(tool.to_string(), code);
        self
    }

    pub fn with_stderr(mut self, tool: &str, line: &str) -> Self {
        self.stderr
            .entry(tool.to_string())
            .or_default()
            .push(line.to_string());
        self
    }

    /// Answer `pass show <reference>` with `secret`
    pub fn with_secret(mut self, reference: &str, secret: &str) -> Self {
        self.secrets.insert(reference.to_string(), secret.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs invoked, in order
    pub fn tools(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.tool().to_string()).collect()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.tool() == tool).collect()
    }

    fn record(&self, invocation: &Invocation, destination: Option<&Path>) -> Call {
        let call = Call {
            argv: invocation.argv(),
            env: invocation.env.clone(),
            cwd: invocation.cwd.clone(),
            destination: destination.map(Path::to_path_buf),
        };
        self.calls.lock().unwrap().push(call.clone());
        call
    }

    fn respond(&self, call: &Call) -> ProcessOutput {
        let tool = call.tool();
        if tool == "pass" {
            let reference = call.argv.last().cloned().unwrap_or_default();
            return match self.secrets.get(&reference) {
                Some(secret) => ProcessOutput {
                    code: Some(0),
                    stdout: vec![secret.clone(), "login: ignored".to_string()],
                    stderr: vec![],
                },
                None => ProcessOutput {
                    code: Some(1),
                    stdout: vec![],
                    stderr: vec![format!("Error: {} is not in the password store.", reference)],
                },
            };
        }
        ProcessOutput {
            code: Some(self.exit_codes.get(tool).copied().unwrap_or(0)),
            stdout: vec![],
            stderr: self.stderr.get(tool).cloned().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Arc<dyn OutputSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        let call = self.record(invocation, None);
        let output = self.respond(&call);
        for line in &output.stdout {
            sink.on_line(StreamKind::Stdout, line);
        }
        for line in &output.stderr {
            sink.on_line(StreamKind::Stderr, line);
        }
        Ok(output)
    }

    async fn run_to_file(
        &self,
        invocation: &Invocation,
        destination: &Path,
    ) -> Result<ProcessOutput, ProcessError> {
        let call = self.record(invocation, Some(destination));
        std::fs::write(destination, b"-- mock dump\n").map_err(|source| ProcessError::Io {
            program: invocation.program.clone(),
            source,
        })?;
        Ok(self.respond(&call))
    }
}

/// Write a configuration document under `dir`
pub fn write_config(dir: &Path, name: &str, yaml: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, yaml).unwrap();
    path
}

pub fn resolve(path: &Path) -> ResolvedConfiguration {
    ConfigResolver::new()
        .load(path)
        .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", path.display(), e))
}

/// Run a resolved configuration against a mock runner
pub async fn run_with(
    config: &ResolvedConfiguration,
    runner: Arc<RecordingRunner>,
    toggles: DisableToggles,
) -> PipelineReport {
    PipelineExecutor::new(config, runner)
        .with_toggles(toggles)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul::process::NoopSink;

    #[tokio::test]
    async fn test_recording_runner_answers_secret_lookups() {
        let runner = RecordingRunner::new().with_secret("db/shop", "s3cret");
        let lookup = Invocation::new("pass").args(["show", "db/shop"]);
        let output = runner.run(&lookup, Arc::new(NoopSink)).await.unwrap();
        assert_eq!(output.stdout[0], "s3cret");

        let missing = Invocation::new("pass").args(["show", "db/other"]);
        let output = runner.run(&missing, Arc::new(NoopSink)).await.unwrap();
        assert_eq!(output.code, Some(1));
        assert_eq!(runner.tools(), vec!["pass", "pass"]);
    }

    #[test]
    fn test_call_tool_skips_sudo() {
        let call = Call {
            argv: vec!["sudo".to_string(), "rsync".to_string()],
            env: BTreeMap::new(),
            cwd: None,
            destination: None,
        };
        assert_eq!(call.tool(), "rsync");
    }
}
