//! Configuration error types

use crate::entity::EntityError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the tool before the pipeline runs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration '{}':\n  {}", path.display(), errors.join("\n  "))]
    Invalid { path: PathBuf, errors: Vec<String> },

    #[error("no pipeline steps and no target directory in '{0}'")]
    MissingTarget(PathBuf),

    #[error("include cycle: {}", format_chain(chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("script {id} is declared twice (again in '{}')", path.display())]
    DuplicateScript { id: u32, path: PathBuf },

    #[error("pipeline step {no} references undefined script {id}")]
    UnknownScript { no: u32, id: u32 },

    #[error(transparent)]
    Entity(#[from] EntityError),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
