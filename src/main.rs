use anyhow::{Context, Result};
use backhaul::cli::notify::notify;
use backhaul::cli::output::*;
use backhaul::cli::Cli;
use backhaul::{
    ConfigResolver, PipelineExecutor, ProcessRunner, ResolvedConfiguration, SnapshotBuilder,
    TokioProcessRunner,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config_path = cli
        .config_path()
        .context("Could not determine the user configuration directory; pass --config")?;

    let config = match load_config(&cli, &config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", CROSS, style("Configuration rejected:").red());
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    if cli.validate {
        return print_validation(&cli, &config);
    }

    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
    let mut failures = 0;

    if !cli.snapshot_only {
        let mut executor = PipelineExecutor::new(&config, runner.clone()).with_toggles(cli.toggles());
        executor.add_event_handler(|event| {
            println!("{}", format_execution_event(&event));
        });

        println!();
        let report = executor.run().await;
        failures += report.failure_count();
        println!("\n{}", format_report(&report));
    }

    if cli.snapshot || cli.snapshot_only {
        println!("\n{} Creating snapshots", INFO);
        let snapshot_failures = SnapshotBuilder::new(runner.clone())
            .snapshot(&config.sources)
            .await;
        for failure in &snapshot_failures {
            println!("  {} {}", CROSS, style(failure).red());
        }
        if snapshot_failures.is_empty() {
            println!("{} Snapshots {}", CHECK, style("created").green());
        }
        failures += snapshot_failures.len();
    }

    if cli.notify {
        let body = if failures == 0 {
            "All steps completed".to_string()
        } else {
            format!("Completed with {} failures", failures)
        };
        notify(runner.as_ref(), "Backup finished", &body).await;
    }

    Ok(())
}

fn load_config(cli: &Cli, path: &Path) -> Result<ResolvedConfiguration> {
    ConfigResolver::new()
        .with_target_override(cli.target.clone())
        .load(path)
        .with_context(|| format!("Failed to load configuration '{}'", path.display()))
}

fn print_validation(cli: &Cli, config: &ResolvedConfiguration) -> Result<()> {
    let summary = ConfigSummary::new(config);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} Configuration is valid!", CHECK);
        println!("{}", summary.render());
    }
    Ok(())
}
