//! Core domain models
//!
//! This module defines the configuration documents, the pipeline model and
//! the resolver that turns a document tree into runnable entities.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;

pub use config::BackupDocument;
pub use error::ConfigError;
pub use pipeline::{Pipeline, StepKind};
pub use resolver::{ConfigResolver, Defaults, ResolvedConfiguration};
