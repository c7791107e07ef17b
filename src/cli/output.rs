//! CLI output formatting

use crate::core::ResolvedConfiguration;
use crate::execution::{ExecutionEvent, PipelineReport, StepStatus};
use console::Emoji;
use serde::Serialize;
use std::path::PathBuf;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted { run_id, steps } => format!(
            "{} Starting backup run ({}) with {} steps",
            ROCKET,
            style(&run_id.to_string()[..8]).dim(),
            style(steps).cyan()
        ),
        ExecutionEvent::StepStarted { no, kind } => {
            format!("{} {} {}", SPINNER, style(format!("[{}]", no)).dim(), style(kind).cyan())
        }
        ExecutionEvent::StepSkipped { no, kind, reason } => format!(
            "{} {} {} ({})",
            SKIP,
            style(format!("[{}]", no)).dim(),
            style(kind).dim(),
            reason
        ),
        ExecutionEvent::StepFinished { no, kind, failures } => {
            if failures.is_empty() {
                format!("{} {} {}", CHECK, style(format!("[{}]", no)).dim(), style(kind).green())
            } else {
                let mut out = format!(
                    "{} {} {} ({} failed)",
                    CROSS,
                    style(format!("[{}]", no)).dim(),
                    style(kind).red(),
                    failures.len()
                );
                for failure in failures {
                    out.push_str(&format!("\n    {}", style(failure).dim()));
                }
                out
            }
        }
        ExecutionEvent::PipelineCompleted { run_id, failures } => {
            let status = if *failures == 0 {
                format!("{} completed", style("successfully").green())
            } else {
                format!("completed with {}", style(format!("{} failures", failures)).red())
            };
            format!(
                "{} Backup run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status
            )
        }
    }
}

/// One-line summary of a finished run
pub fn format_report(report: &PipelineReport) -> String {
    let skipped = report
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .count();
    let icon = if report.failure_count() == 0 { CHECK } else { WARN };
    format!(
        "{} {} steps, {} skipped, {} failures in {}",
        icon,
        report.steps.len(),
        skipped,
        report.failure_count(),
        format_duration(report.duration())
    )
}

pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// What `--validate` reports about a resolved configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub target: Option<PathBuf>,
    pub pipeline: Vec<StepSummary>,
    pub sources: Vec<SourceSummary>,
    pub databases: Vec<DatabaseSummary>,
    pub scripts: Vec<ScriptSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub no: u32,
    pub step: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub path: String,
    pub host: String,
    pub target_dir: PathBuf,
    pub privileged: bool,
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSummary {
    pub engine: String,
    pub name: String,
    pub host: String,
    pub dump_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptSummary {
    pub id: u32,
    pub command: String,
}

impl ConfigSummary {
    pub fn new(config: &ResolvedConfiguration) -> Self {
        Self {
            target: config.target.clone(),
            pipeline: config
                .pipeline
                .iter()
                .map(|(no, kind)| StepSummary {
                    no,
                    step: kind.to_string(),
                })
                .collect(),
            sources: config
                .sources
                .iter()
                .map(|s| SourceSummary {
                    path: s.path.clone(),
                    host: s.host(),
                    target_dir: s.target_dir(),
                    privileged: s.privileged,
                    excludes: s.excludes.iter().cloned().collect(),
                })
                .collect(),
            databases: config
                .databases
                .iter()
                .map(|db| DatabaseSummary {
                    engine: db.engine.to_string(),
                    name: db.name.clone(),
                    host: db.host(),
                    dump_dir: db.dump_dir(),
                })
                .collect(),
            scripts: config
                .scripts
                .iter()
                .map(|(id, script)| ScriptSummary {
                    id: *id,
                    command: script.command.clone(),
                })
                .collect(),
        }
    }

    /// Human-readable form
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(target) = &self.target {
            out.push_str(&format!("  Target: {}\n", style(target.display()).bold()));
        }
        out.push_str(&format!("  Pipeline: {} steps\n", style(self.pipeline.len()).cyan()));
        for step in &self.pipeline {
            out.push_str(&format!("    {:>3}  {}\n", step.no, step.step));
        }
        out.push_str(&format!("  Sources: {}\n", style(self.sources.len()).cyan()));
        for source in &self.sources {
            out.push_str(&format!(
                "    {} -> {}{}\n",
                source.path,
                source.target_dir.display(),
                if source.privileged { " (sudo)" } else { "" }
            ));
        }
        out.push_str(&format!("  Databases: {}\n", style(self.databases.len()).cyan()));
        for db in &self.databases {
            out.push_str(&format!("    {} {} on {}\n", db.engine, db.name, db.host));
        }
        out.push_str(&format!("  Scripts: {}", style(self.scripts.len()).cyan()));
        for script in &self.scripts {
            out.push_str(&format!("\n    {:>3}  {}", script.id, script.command));
        }
        out
    }
}
