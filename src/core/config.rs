//! Backup configuration documents loaded from YAML
//!
//! A document may declare options, sources, databases, scripts and pipeline
//! steps, and may include further documents from its `sources.file` and
//! `databases.file` lists. This module only parses and validates a single
//! document; merging happens in [`crate::core::resolver`].

use crate::core::error::ConfigError;
use crate::core::pipeline::{Pipeline, StepKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupDocument {
    /// Defaults for everything declared here and in includes
    #[serde(default)]
    pub options: Option<OptionsConfig>,

    #[serde(default)]
    pub sources: SourcesSection,

    #[serde(default)]
    pub databases: DatabasesSection,

    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,

    /// Only honored in the top-level document
    #[serde(default)]
    pub pipeline: Vec<StepConfig>,
}

/// Document-wide defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionsConfig {
    /// Target root directory
    #[serde(default)]
    pub target: Option<PathBuf>,

    #[serde(default)]
    pub rsync: Option<RsyncConfig>,
}

/// rsync options, either as a plain string or with a privilege flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RsyncConfig {
    Options(String),
    Detailed(RsyncDetails),
}

/// Mapping form of [`RsyncConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsyncDetails {
    #[serde(default)]
    pub options: Option<String>,

    /// Run rsync through sudo
    #[serde(default)]
    pub root: Option<bool>,
}

impl RsyncConfig {
    pub fn options(&self) -> Option<&str> {
        match self {
            RsyncConfig::Options(options) => Some(options),
            RsyncConfig::Detailed(details) => details.options.as_deref(),
        }
    }

    pub fn root(&self) -> Option<bool> {
        match self {
            RsyncConfig::Options(_) => None,
            RsyncConfig::Detailed(details) => details.root,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesSection {
    #[serde(default)]
    pub source: Vec<SourceConfig>,

    /// Included documents
    #[serde(default)]
    pub file: Vec<IncludeConfig>,
}

/// A file tree to sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Local path or `[user@]host:path`
    pub path: String,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub target: Option<PathBuf>,

    #[serde(default)]
    pub rsync: Option<RsyncConfig>,

    #[serde(default)]
    pub pre_script: Option<String>,

    #[serde(default)]
    pub post_script: Option<String>,
}

/// Reference to another document, relative to the including one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeConfig {
    Path(PathBuf),
    Detailed(IncludeDetails),
}

/// Mapping form of [`IncludeConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeDetails {
    pub path: PathBuf,

    /// Privilege default for everything in the included document
    #[serde(default)]
    pub root: Option<bool>,
}

impl IncludeConfig {
    pub fn path(&self) -> &Path {
        match self {
            IncludeConfig::Path(path) => path,
            IncludeConfig::Detailed(details) => &details.path,
        }
    }

    pub fn root(&self) -> Option<bool> {
        match self {
            IncludeConfig::Path(_) => None,
            IncludeConfig::Detailed(details) => details.root,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabasesSection {
    #[serde(default)]
    pub postgresql: Vec<DatabaseConfig>,

    #[serde(default)]
    pub mysql: Vec<DatabaseConfig>,

    /// Included documents
    #[serde(default)]
    pub file: Vec<IncludeConfig>,
}

/// A database to dump
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub name: String,

    pub user: String,

    /// Literal password
    #[serde(default)]
    pub password: Option<String>,

    /// Secret store reference, looked up at dump time
    #[serde(default)]
    pub pass: Option<String>,

    /// Extra dump tool options
    #[serde(default)]
    pub options: Option<String>,

    /// Dump over ssh on this host
    #[serde(default)]
    pub ssh: Option<String>,

    #[serde(default)]
    pub target: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub id: u32,

    /// Command line, split with shell rules
    pub command: String,

    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub no: u32,

    /// `backup`, `postgresql-dbs`, `mysql-dbs` or `script-<id>`
    pub step: String,
}

impl BackupDocument {
    /// Load, parse and validate a document
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse(&content, path)
    }

    /// Parse and validate YAML; `origin` is only used in error messages
    pub fn parse(yaml: &str, origin: &Path) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: BackupDocument =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        document.validate().map_err(|errors| ConfigError::Invalid {
            path: origin.to_path_buf(),
            errors,
        })?;
        Ok(document)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse(yaml, Path::new("<inline>"))
    }

    /// Check the document, collecting every problem instead of stopping at
    /// the first one
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut seen_steps = HashSet::new();
        for step in &self.pipeline {
            if !seen_steps.insert(step.no) {
                errors.push(format!("pipeline: duplicate step number {}", step.no));
            }
            if let Err(e) = step.step.parse::<StepKind>() {
                errors.push(format!("pipeline step {}: {}", step.no, e));
            }
        }

        let mut seen_scripts = HashSet::new();
        for script in &self.scripts {
            if !seen_scripts.insert(script.id) {
                errors.push(format!("scripts: duplicate id {}", script.id));
            }
            if script.command.trim().is_empty() {
                errors.push(format!("script {}: empty command", script.id));
            }
        }

        for (i, source) in self.sources.source.iter().enumerate() {
            if source.path.trim().is_empty() {
                errors.push(format!("sources.source[{}]: empty path", i));
            }
        }

        for (section, dbs) in [
            ("postgresql", &self.databases.postgresql),
            ("mysql", &self.databases.mysql),
        ] {
            for (i, db) in dbs.iter().enumerate() {
                let context = format!("databases.{}[{}]", section, i);
                if db.name.trim().is_empty() {
                    errors.push(format!("{}: empty name", context));
                }
                if db.user.trim().is_empty() {
                    errors.push(format!("{}: empty user", context));
                }
                if db.password.is_some() && db.pass.is_some() {
                    errors.push(format!("{}: 'password' and 'pass' are mutually exclusive", context));
                }
            }
        }

        for (section, includes) in [
            ("sources", &self.sources.file),
            ("databases", &self.databases.file),
        ] {
            for (i, include) in includes.iter().enumerate() {
                if include.path().as_os_str().is_empty() {
                    errors.push(format!("{}.file[{}]: empty path", section, i));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Declared steps as a pipeline. Steps that fail to parse are skipped;
    /// [`validate`](Self::validate) reports them.
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
            .iter()
            .filter_map(|step| step.step.parse().ok().map(|kind| (step.no, kind)))
            .collect()
    }

    /// Whether this document includes other documents
    pub fn includes(&self) -> impl Iterator<Item = &IncludeConfig> {
        self.sources.file.iter().chain(self.databases.file.iter())
    }
}
