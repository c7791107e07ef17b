//! Compressed snapshots of the synced `files` trees

use crate::entity::source::{ELEVATE_TOOL, FILES_DIR};
use crate::entity::{check_outcome, ensure_dir, timestamp, EntityError, Failure, Source};
use crate::process::{Invocation, LogSink, ProcessRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Archive tool
pub const ARCHIVE_TOOL: &str = "tar";

/// Per-host directory holding snapshots
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// One archive: every source sharing a target root and host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotGroup {
    pub target_root: PathBuf,
    pub host: String,
    /// Set when any member source syncs with elevated privileges
    pub privileged: bool,
}

impl SnapshotGroup {
    pub fn host_dir(&self) -> PathBuf {
        self.target_root.join(&self.host)
    }

    pub fn label(&self) -> String {
        format!("snapshot of {}", self.host_dir().display())
    }

    /// Build the archive invocation and create the snapshot directory.
    /// Returns the invocation and the archive path.
    pub fn build_command(&self, timestamp: &str) -> Result<(Invocation, PathBuf), EntityError> {
        let host_dir = self.host_dir();
        let snapshot_dir = host_dir.join(SNAPSHOTS_DIR);
        ensure_dir(&snapshot_dir)?;
        let archive = snapshot_dir.join(format!("{}.tar.gz", timestamp));

        let mut argv = Vec::new();
        if self.privileged {
            argv.push(ELEVATE_TOOL.to_string());
        }
        argv.extend([
            ARCHIVE_TOOL.to_string(),
            "-czf".to_string(),
            archive.to_string_lossy().into_owned(),
            "-C".to_string(),
            host_dir.to_string_lossy().into_owned(),
            FILES_DIR.to_string(),
        ]);
        Ok((Invocation::from_argv(argv)?, archive))
    }
}

/// Group sources by (target root, host) in first-seen order
pub fn group_sources(sources: &[Source]) -> Vec<SnapshotGroup> {
    let mut groups: Vec<SnapshotGroup> = Vec::new();
    for source in sources {
        let host = source.host();
        match groups
            .iter_mut()
            .find(|g| g.target_root == source.target_root && g.host == host)
        {
            Some(group) => group.privileged |= source.privileged,
            None => groups.push(SnapshotGroup {
                target_root: source.target_root.clone(),
                host,
                privileged: source.privileged,
            }),
        }
    }
    groups
}

/// Archives each group's `files` tree through the process runner
pub struct SnapshotBuilder {
    runner: Arc<dyn ProcessRunner>,
}

impl SnapshotBuilder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Snapshot every group; failures are logged and returned, never raised
    pub async fn snapshot(&self, sources: &[Source]) -> Vec<Failure> {
        let ts = timestamp();
        let mut failures = Vec::new();
        for group in group_sources(sources) {
            if let Some(failure) = self.snapshot_group(&group, &ts).await {
                failures.push(failure);
            }
        }
        failures
    }

    async fn snapshot_group(&self, group: &SnapshotGroup, timestamp: &str) -> Option<Failure> {
        let label = group.label();
        let (invocation, archive) = match group.build_command(timestamp) {
            Ok(built) => built,
            Err(e) => {
                error!("{}: {}", label, e);
                return Some(Failure::new(label, e.to_string()));
            }
        };

        info!("Creating {}", archive.display());
        let result = self
            .runner
            .run(&invocation, Arc::new(LogSink::new(label.clone())))
            .await;
        check_outcome(&label, result)
    }
}
