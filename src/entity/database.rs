//! Database dump targets (PostgreSQL and MySQL)

use crate::entity::location::{host_section, local_hostname};
use crate::entity::{check_outcome, ensure_dir, split_options, timestamp, BackupTask, EntityError, Failure};
use crate::process::{Invocation, NoopSink, ProcessRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Secret store command; looked up as `pass show <reference>`
pub const SECRET_STORE_TOOL: &str = "pass";

/// Remote shell used for dumps on another host
pub const REMOTE_SHELL: &str = "ssh";

/// Per-host directory holding database dumps
pub const DUMPS_DIR: &str = "db-dumps";

/// Database engine of a dump target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    PostgreSql,
    MySql,
}

impl Engine {
    pub fn dump_tool(&self) -> &'static str {
        match self {
            Engine::PostgreSql => "pg_dump",
            Engine::MySql => "mysqldump",
        }
    }

    fn user_flag(&self) -> &'static str {
        match self {
            Engine::PostgreSql => "--username",
            Engine::MySql => "--user",
        }
    }

    /// Environment variable the dump tool reads its password from
    pub fn password_env(&self) -> &'static str {
        match self {
            Engine::PostgreSql => "PGPASSWORD",
            Engine::MySql => "MYSQL_PWD",
        }
    }

    /// Directory name under `db-dumps`
    pub fn dir_name(&self) -> &'static str {
        match self {
            Engine::PostgreSql => "PostgreSQL",
            Engine::MySql => "MySQL",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// How a dump target authenticates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// Password written in the configuration
    Literal(String),
    /// Reference into the secret store, resolved at backup time
    SecretStore(String),
    #[default]
    None,
}

/// One database to dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub engine: Engine,
    pub name: String,
    pub user: String,
    pub credential: Credential,
    /// Extra dump tool options, shell-split
    pub options: String,
    /// Dump over ssh on this host instead of locally
    pub ssh_host: Option<String>,
    pub target_root: PathBuf,
}

/// The built dump invocation and the file its output goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub invocation: Invocation,
    pub destination: PathBuf,
}

impl DatabaseTarget {
    pub fn new(
        engine: Engine,
        name: impl Into<String>,
        user: impl Into<String>,
        target_root: Option<PathBuf>,
    ) -> Result<Self, EntityError> {
        let name = name.into();
        let target_root = target_root
            .ok_or_else(|| EntityError::MissingTarget(format!("{} database '{}'", engine, name)))?;
        Ok(Self {
            engine,
            name,
            user: user.into(),
            credential: Credential::None,
            options: String::new(),
            ssh_host: None,
            target_root,
        })
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_ssh_host(mut self, host: impl Into<String>) -> Self {
        self.ssh_host = Some(host.into());
        self
    }

    /// Host directory name: the ssh host, or this machine's hostname
    pub fn host(&self) -> String {
        self.ssh_host
            .clone()
            .unwrap_or_else(|| local_hostname().to_string())
    }

    /// `target_root/host/db-dumps/<Engine>/<name>`
    pub fn dump_dir(&self) -> PathBuf {
        host_section(&self.target_root, &self.host(), DUMPS_DIR)
            .join(self.engine.dir_name())
            .join(&self.name)
    }

    /// Resolve the password. Only literal passwords avoid a process spawn;
    /// secret store references are looked up here and nowhere earlier.
    pub async fn resolve_credential(
        &self,
        runner: &dyn ProcessRunner,
    ) -> Result<Option<String>, EntityError> {
        let reference = match &self.credential {
            Credential::Literal(password) => return Ok(Some(password.clone())),
            Credential::None => return Ok(None),
            Credential::SecretStore(reference) => reference,
        };

        debug!("Looking up secret '{}' for {}", reference, self.label());
        let lookup = Invocation::new(SECRET_STORE_TOOL).args(["show", reference.as_str()]);
        // NoopSink: the secret must never reach the log
        let output = runner.run(&lookup, Arc::new(NoopSink)).await?;
        if !output.success() {
            return Err(EntityError::SecretLookup {
                reference: reference.clone(),
                reason: format!("{}: {}", output.status_text(), output.stderr_text().trim()),
            });
        }
        output
            .stdout
            .into_iter()
            .next()
            .filter(|line| !line.is_empty())
            .map(Some)
            .ok_or_else(|| EntityError::SecretLookup {
                reference: reference.clone(),
                reason: "empty secret".to_string(),
            })
    }

    /// Build the dump invocation for an already resolved password and
    /// create the dump directory.
    ///
    /// Locally the password travels in the environment only. Over ssh the
    /// environment does not cross the remote shell, so it becomes a
    /// `NAME=value` argument in front of the dump tool.
    pub fn build_command(
        &self,
        password: Option<&str>,
        timestamp: &str,
    ) -> Result<DumpCommand, EntityError> {
        let dump_dir = self.dump_dir();
        ensure_dir(&dump_dir)?;
        let destination = dump_dir.join(format!("{}_{}.sql.gz", self.name, timestamp));

        let mut argv = Vec::new();
        if let Some(host) = &self.ssh_host {
            argv.push(REMOTE_SHELL.to_string());
            argv.push(host.clone());
            if let Some(password) = password {
                let value = shlex::try_quote(password)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| password.to_string());
                argv.push(format!("{}={}", self.engine.password_env(), value));
            }
        }
        argv.push(self.engine.dump_tool().to_string());
        argv.push(format!("{}={}", self.engine.user_flag(), self.user));
        argv.extend(split_options(&self.options)?);
        argv.push(self.name.clone());

        let mut invocation = Invocation::from_argv(argv)?;
        if let (None, Some(password)) = (&self.ssh_host, password) {
            invocation = invocation.env(self.engine.password_env(), password);
        }

        Ok(DumpCommand {
            invocation,
            destination,
        })
    }

    /// Resolve the credential, then stream the compressed dump to disk
    pub async fn backup(&self, runner: &dyn ProcessRunner) -> Vec<Failure> {
        let label = self.label();

        let password = match self.resolve_credential(runner).await {
            Ok(password) => password,
            Err(e) => {
                error!("{}: {}; skipping dump", label, e);
                return vec![Failure::new(label, e.to_string())];
            }
        };

        let command = match self.build_command(password.as_deref(), &timestamp()) {
            Ok(command) => command,
            Err(e) => {
                error!("{}: {}", label, e);
                return vec![Failure::new(label, e.to_string())];
            }
        };

        info!("Dumping {} -> {}", label, command.destination.display());
        let result = runner.run_to_file(&command.invocation, &command.destination).await;
        check_outcome(&label, result)
            .map(|mut failure| {
                if command.destination.exists() {
                    warn!("{}: incomplete dump left at {}", label, command.destination.display());
                    failure.reason = format!(
                        "{} (incomplete dump left at {})",
                        failure.reason,
                        command.destination.display()
                    );
                }
                failure
            })
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl BackupTask for DatabaseTarget {
    fn label(&self) -> String {
        format!("{} database '{}'", self.engine, self.name)
    }

    async fn execute(&self, runner: &dyn ProcessRunner) -> Vec<Failure> {
        self.backup(runner).await
    }
}
