//! Command-line interface

pub mod notify;
pub mod output;

use crate::execution::DisableToggles;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Directory under the user config dir holding the default configuration
pub const CONFIG_DIR_NAME: &str = "backhaul";

/// File name of the default configuration
pub const CONFIG_FILE_NAME: &str = "backup.yaml";

/// Declarative backups of file trees and databases
#[derive(Debug, Parser, Clone)]
#[command(name = "backhaul")]
#[command(version)]
#[command(about = "Declarative backups of file trees and databases", long_about = None)]
pub struct Cli {
    /// Path to the backup configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Target root directory, replacing the configured one
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Validate and resolve the configuration without running anything
    #[arg(long)]
    pub validate: bool,

    /// Print the validation summary as JSON
    #[arg(long, requires = "validate")]
    pub json: bool,

    /// Skip PostgreSQL dumps
    #[arg(long)]
    pub no_postgresql: bool,

    /// Skip MySQL dumps
    #[arg(long)]
    pub no_mysql: bool,

    /// Skip all database dumps
    #[arg(long)]
    pub no_databases: bool,

    /// Archive the synced trees after the pipeline
    #[arg(long, conflicts_with = "snapshot_only")]
    pub snapshot: bool,

    /// Archive the synced trees without running the pipeline
    #[arg(long)]
    pub snapshot_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Send a desktop notification when done
    #[arg(long)]
    pub notify: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// The configuration to load: `--config`, else the per-user default
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }

    pub fn toggles(&self) -> DisableToggles {
        DisableToggles {
            postgresql: self.no_postgresql,
            mysql: self.no_mysql,
            databases: self.no_databases,
        }
    }
}

/// `<config dir>/backhaul/backup.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
