//! backhaul - declarative backups of file trees and databases

pub mod cli;
pub mod core;
pub mod entity;
pub mod execution;
pub mod process;

// Re-export commonly used types
pub use core::{ConfigError, ConfigResolver, Defaults, Pipeline, ResolvedConfiguration, StepKind};
pub use entity::{BackupTask, Credential, DatabaseTarget, Engine, Failure, Script, Source};
pub use execution::{DisableToggles, ExecutionEvent, PipelineExecutor, PipelineReport, SnapshotBuilder};
pub use process::{Invocation, ProcessError, ProcessOutput, ProcessRunner, TokioProcessRunner};
