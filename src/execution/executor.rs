//! Pipeline executor - runs the steps of a resolved configuration in order

use crate::core::{ResolvedConfiguration, StepKind};
use crate::entity::{BackupTask, Engine, Failure};
use crate::process::ProcessRunner;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Database engines switched off for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisableToggles {
    pub postgresql: bool,
    pub mysql: bool,
    /// Disables every engine
    pub databases: bool,
}

impl DisableToggles {
    pub fn disables(&self, engine: Engine) -> bool {
        self.databases
            || match engine {
                Engine::PostgreSql => self.postgresql,
                Engine::MySql => self.mysql,
            }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    CompletedWithFailures(usize),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub no: u32,
    pub kind: StepKind,
    pub status: StepStatus,
    pub failures: Vec<Failure>,
}

/// Everything that happened during one run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.steps.iter().flat_map(|step| step.failures.iter())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        steps: usize,
    },
    StepStarted {
        no: u32,
        kind: StepKind,
    },
    StepSkipped {
        no: u32,
        kind: StepKind,
        reason: String,
    },
    StepFinished {
        no: u32,
        kind: StepKind,
        failures: Vec<Failure>,
    },
    PipelineCompleted {
        run_id: Uuid,
        failures: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Runs a pipeline step by step. A failing task never stops the run; its
/// failures end up in the report.
pub struct PipelineExecutor<'a> {
    config: &'a ResolvedConfiguration,
    runner: Arc<dyn ProcessRunner>,
    toggles: DisableToggles,
    event_handlers: Vec<EventHandler>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(config: &'a ResolvedConfiguration, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            toggles: DisableToggles::default(),
            event_handlers: Vec::new(),
        }
    }

    pub fn with_toggles(mut self, toggles: DisableToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    pub async fn run(&self) -> PipelineReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pipeline = &self.config.pipeline;

        info!("Starting backup run {} with {} steps", run_id, pipeline.len());
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id,
            steps: pipeline.len(),
        });

        let mut steps = Vec::with_capacity(pipeline.len());
        for (no, kind) in pipeline.iter() {
            steps.push(self.run_step(no, kind).await);
        }

        let report = PipelineReport {
            run_id,
            steps,
            started_at,
            finished_at: Utc::now(),
        };

        let failures = report.failure_count();
        if failures == 0 {
            info!("Backup run {} completed", run_id);
        } else {
            warn!("Backup run {} completed with {} failures", run_id, failures);
        }
        self.emit_event(ExecutionEvent::PipelineCompleted { run_id, failures });
        report
    }

    /// Execute a single step
    async fn run_step(&self, no: u32, kind: StepKind) -> StepReport {
        if let Some(engine) = kind.engine() {
            if self.toggles.disables(engine) {
                info!("Step {} ({}) skipped: {} disabled", no, kind, engine);
                self.emit_event(ExecutionEvent::StepSkipped {
                    no,
                    kind,
                    reason: format!("{} dumps disabled", engine),
                });
                return StepReport {
                    no,
                    kind,
                    status: StepStatus::Skipped,
                    failures: Vec::new(),
                };
            }
        }

        info!("Step {}: {}", no, kind);
        self.emit_event(ExecutionEvent::StepStarted { no, kind });

        let mut failures = Vec::new();
        match self.tasks(kind) {
            Ok(tasks) => {
                if tasks.is_empty() {
                    debug!("Step {} ({}) has nothing to do", no, kind);
                }
                for task in tasks {
                    debug!("Step {}: {}", no, task.label());
                    failures.extend(task.execute(self.runner.as_ref()).await);
                }
            }
            Err(failure) => failures.push(failure),
        }

        self.emit_event(ExecutionEvent::StepFinished {
            no,
            kind,
            failures: failures.clone(),
        });

        let status = if failures.is_empty() {
            StepStatus::Completed
        } else {
            StepStatus::CompletedWithFailures(failures.len())
        };
        StepReport {
            no,
            kind,
            status,
            failures,
        }
    }

    /// Tasks a step runs, in configuration order
    fn tasks(&self, kind: StepKind) -> Result<Vec<&dyn BackupTask>, Failure> {
        Ok(match kind {
            StepKind::Backup => self
                .config
                .sources
                .iter()
                .map(|source| source as &dyn BackupTask)
                .collect(),
            StepKind::PostgresDump => self.dump_tasks(Engine::PostgreSql),
            StepKind::MySqlDump => self.dump_tasks(Engine::MySql),
            StepKind::Script(id) => match self.config.script(id) {
                Some(script) => vec![script as &dyn BackupTask],
                None => {
                    return Err(Failure::new(
                        kind.to_string(),
                        format!("script {} is not defined", id),
                    ))
                }
            },
        })
    }

    fn dump_tasks(&self, engine: Engine) -> Vec<&dyn BackupTask> {
        self.config
            .databases_for(engine)
            .map(|db| db as &dyn BackupTask)
            .collect()
    }
}
