//! Pipeline execution

pub mod executor;
pub mod snapshot;

pub use executor::{
    DisableToggles, EventHandler, ExecutionEvent, PipelineExecutor, PipelineReport, StepReport, StepStatus,
};
pub use snapshot::{group_sources, SnapshotBuilder, SnapshotGroup};
