//! File tree sources synchronized with rsync

use crate::entity::location::{host_section, Location};
use crate::entity::{check_outcome, ensure_dir, split_options, BackupTask, EntityError, Failure, Script};
use crate::process::{Invocation, LogSink, ProcessRunner};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Transfer tool
pub const TRANSFER_TOOL: &str = "rsync";

/// Privilege elevation prefix
pub const ELEVATE_TOOL: &str = "sudo";

/// Replaced by the quoted previous-version directory in rsync options
pub const BACKUP_DIR_PLACEHOLDER: &str = "{backup_dir}";

/// rsync options used when no document in the chain sets any
pub const DEFAULT_RSYNC_OPTIONS: &str = "-az --delete --backup --backup-dir={backup_dir}";

/// Per-host directory holding synced trees
pub const FILES_DIR: &str = "files";

/// Per-host directory holding rsync's previous versions
pub const BACKUP_DIR: &str = "backup";

/// A file tree to synchronize into `target_root/host/files`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Path as written in the configuration
    pub path: String,
    pub location: Location,
    pub target_root: PathBuf,
    pub excludes: BTreeSet<String>,
    pub privileged: bool,
    /// rsync options template, may contain [`BACKUP_DIR_PLACEHOLDER`]
    pub rsync_options: String,
    pub pre_script: Option<Script>,
    pub post_script: Option<Script>,
}

/// The built transfer invocation and the directories it writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCommand {
    pub invocation: Invocation,
    pub target_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl Source {
    /// Create a source. Fails when no target root could be resolved or
    /// when the path contains `..`.
    pub fn new(path: impl Into<String>, target_root: Option<PathBuf>) -> Result<Self, EntityError> {
        let path = path.into();
        let target_root = target_root.ok_or_else(|| EntityError::MissingTarget(path.clone()))?;
        let location = Location::parse(&path);
        if location.climbs_out() {
            return Err(EntityError::ParentTraversal(path));
        }
        Ok(Self {
            location,
            path,
            target_root,
            excludes: BTreeSet::new(),
            privileged: false,
            rsync_options: DEFAULT_RSYNC_OPTIONS.to_string(),
            pre_script: None,
            post_script: None,
        })
    }

    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(excludes.into_iter().map(Into::into));
        self
    }

    pub fn with_rsync_options(mut self, options: impl Into<String>) -> Self {
        self.rsync_options = options.into();
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_pre_script(mut self, script: Script) -> Self {
        self.pre_script = Some(script);
        self
    }

    pub fn with_post_script(mut self, script: Script) -> Self {
        self.post_script = Some(script);
        self
    }

    /// Host directory name: the remote host, or this machine's hostname
    pub fn host(&self) -> String {
        self.location.host()
    }

    /// `target_root/host/files/<relative path>`
    pub fn target_dir(&self) -> PathBuf {
        host_section(&self.target_root, &self.host(), FILES_DIR).join(self.location.relative_path())
    }

    /// `target_root/host/backup/<relative path>`
    pub fn backup_dir(&self) -> PathBuf {
        host_section(&self.target_root, &self.host(), BACKUP_DIR).join(self.location.relative_path())
    }

    /// Build the rsync invocation, creating the target and backup
    /// directories if they do not exist yet
    pub fn build_command(&self) -> Result<SyncCommand, EntityError> {
        let target_dir = self.target_dir();
        let backup_dir = self.backup_dir();
        ensure_dir(&target_dir)?;
        ensure_dir(&backup_dir)?;

        let mut argv = Vec::new();
        if self.privileged {
            argv.push(ELEVATE_TOOL.to_string());
        }
        argv.push(TRANSFER_TOOL.to_string());
        argv.extend(self.expand_options(&backup_dir)?);
        argv.extend(self.excludes.iter().map(|glob| format!("--exclude={}", glob)));
        argv.push(self.source_argument());
        argv.push(format!("{}/", path_string(&target_dir)));

        Ok(SyncCommand {
            invocation: Invocation::from_argv(argv)?,
            target_dir,
            backup_dir,
        })
    }

    fn expand_options(&self, backup_dir: &Path) -> Result<Vec<String>, EntityError> {
        if !self.rsync_options.contains(BACKUP_DIR_PLACEHOLDER) {
            return split_options(&self.rsync_options);
        }
        let backup_dir = path_string(backup_dir);
        let quoted = shlex::try_quote(&backup_dir)
            .map_err(|_| EntityError::InvalidOptions(self.rsync_options.clone()))?;
        split_options(&self.rsync_options.replace(BACKUP_DIR_PLACEHOLDER, &quoted))
    }

    /// Directories get a trailing separator so rsync copies their contents
    fn source_argument(&self) -> String {
        match &self.location {
            Location::Local { path } if Path::new(path).is_dir() && !path.ends_with('/') => {
                format!("{}/", path)
            }
            _ => self.path.clone(),
        }
    }

    /// pre-script, transfer, post-script. Each failure is recorded and the
    /// remaining sub-steps still run.
    pub async fn backup(&self, runner: &dyn ProcessRunner) -> Vec<Failure> {
        let label = self.label();
        let mut failures = Vec::new();

        if let Some(script) = &self.pre_script {
            failures.extend(script.run(runner).await);
        }

        match self.build_command() {
            Ok(command) => {
                info!("Syncing {} -> {}", self.path, command.target_dir.display());
                let result = runner
                    .run(&command.invocation, Arc::new(LogSink::new(label.clone())))
                    .await;
                failures.extend(check_outcome(&label, result));
            }
            Err(e) => {
                error!("{}: {}", label, e);
                failures.push(Failure::new(label.clone(), e.to_string()));
            }
        }

        if let Some(script) = &self.post_script {
            failures.extend(script.run(runner).await);
        }

        failures
    }
}

#[async_trait]
impl BackupTask for Source {
    fn label(&self) -> String {
        format!("{} {}", TRANSFER_TOOL, self.path)
    }

    async fn execute(&self, runner: &dyn ProcessRunner) -> Vec<Failure> {
        self.backup(runner).await
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
