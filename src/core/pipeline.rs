//! Pipeline domain model

use crate::entity::Engine;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a pipeline step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Sync every source
    Backup,
    /// Dump every PostgreSQL target
    PostgresDump,
    /// Dump every MySQL target
    MySqlDump,
    /// Run the script with this id
    Script(u32),
}

impl StepKind {
    /// Engine dumped by this step, if it is a dump step
    pub fn engine(&self) -> Option<Engine> {
        match self {
            StepKind::PostgresDump => Some(Engine::PostgreSql),
            StepKind::MySqlDump => Some(Engine::MySql),
            _ => None,
        }
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "backup" => Ok(StepKind::Backup),
            "postgresql-dbs" => Ok(StepKind::PostgresDump),
            "mysql-dbs" => Ok(StepKind::MySqlDump),
            other => other
                .strip_prefix("script-")
                .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|id| id.parse().ok())
                .map(StepKind::Script)
                .ok_or_else(|| {
                    format!(
                        "unknown step '{}' (expected backup, postgresql-dbs, mysql-dbs or script-<id>)",
                        other
                    )
                }),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Backup => f.write_str("backup"),
            StepKind::PostgresDump => f.write_str("postgresql-dbs"),
            StepKind::MySqlDump => f.write_str("mysql-dbs"),
            StepKind::Script(id) => write!(f, "script-{}", id),
        }
    }
}

/// Step number to step kind. Iteration is always ascending by step number,
/// whatever order the steps were declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    steps: BTreeMap<u32, StepKind>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline used when a configuration declares no steps
    pub fn implicit_backup() -> Self {
        let mut pipeline = Self::new();
        pipeline.insert(1, StepKind::Backup);
        pipeline
    }

    /// Insert a step; returns the kind previously stored under `no`
    pub fn insert(&mut self, no: u32, kind: StepKind) -> Option<StepKind> {
        self.steps.insert(no, kind)
    }

    pub fn get(&self, no: u32) -> Option<StepKind> {
        self.steps.get(&no).copied()
    }

    /// Steps in execution order
    pub fn iter(&self) -> impl Iterator<Item = (u32, StepKind)> + '_ {
        self.steps.iter().map(|(no, kind)| (*no, *kind))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl FromIterator<(u32, StepKind)> for Pipeline {
    fn from_iter<I: IntoIterator<Item = (u32, StepKind)>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
