//! CLI entrypoint for Ward Coordinator
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use ward_application::{
    NoScenarioProgress, PlannerPort, ScenarioCoordinator, ScenarioLogger, ScenarioOutcome,
    ScenarioProgress,
};
use ward_infrastructure::{ConfigLoader, FileConfig, FilePlanner, JsonlScenarioLogger, SimulatedTravel};
use ward_presentation::{Cli, ConsoleFormatter, OutputFormat, ProgressReporter, SimpleProgress};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(());
    }

    // === Configuration ===
    let mut config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };
    apply_overrides(&mut config, &cli);

    let issues = config.validate();
    if !issues.is_empty() {
        let details: Vec<String> = issues.iter().map(|i| format!("  - {}", i)).collect();
        bail!("Invalid configuration:\n{}", details.join("\n"));
    }

    let _log_guard = init_logging(cli.verbose, config.logging.log_file.as_deref())?;
    info!("Starting Ward Coordinator");

    let description = match cli.description.as_deref() {
        Some(d) if !d.trim().is_empty() => d.to_string(),
        _ => bail!("A scenario description is required."),
    };

    // === Dependency Injection ===
    let planner = build_planner(&config)?;
    let registry = config.location_registry();
    let origin = registry
        .exit()
        .map(|l| l.arrival_point)
        .unwrap_or_default();
    let travel = Arc::new(
        SimulatedTravel::new(config.timing.clone(), origin)
            .with_speed(config.travel.speed)
            .with_escort_pace(config.travel.escort_pace),
    );

    let progress: Arc<dyn ScenarioProgress> =
        if cli.quiet || cli.output == OutputFormat::Json {
            Arc::new(NoScenarioProgress)
        } else if cli.verbose > 0 {
            Arc::new(SimpleProgress)
        } else {
            Arc::new(ProgressReporter::new())
        };

    let mut coordinator =
        ScenarioCoordinator::new(planner, travel, registry, config.coordinator_config())
            .with_progress(progress);

    if let Some(dir) = &config.logging.scenario_log_dir {
        match JsonlScenarioLogger::in_dir(dir) {
            Some(logger) => {
                info!(path = %logger.path().display(), "Writing scenario log");
                let logger: Arc<dyn ScenarioLogger> = Arc::new(logger);
                coordinator = coordinator.with_logger(logger);
            }
            None => warn!("Scenario log disabled"),
        }
    }

    // === Run ===
    if coordinator.start_scenario(&description).await.is_err() {
        coordinator.shutdown().await;
        bail!("The planner could not produce a plan for this scenario.");
    }

    let outcome = run(&mut coordinator, cli.time_limit).await;
    let Some(outcome) = outcome else {
        eprintln!("{}", ConsoleFormatter::format_snapshot(&coordinator.snapshot()));
        coordinator.shutdown().await;
        bail!("Scenario did not finish.");
    };

    let analysis = coordinator.analysis_report().await;
    let output = match cli.output {
        OutputFormat::Text => ConsoleFormatter::format(&outcome, analysis.as_ref()),
        OutputFormat::Json => ConsoleFormatter::format_json(&outcome, analysis.as_ref()),
    };
    println!("{}", output);

    coordinator.shutdown().await;
    Ok(())
}

/// Command-line flags take precedence over every configuration source.
fn apply_overrides(config: &mut FileConfig, cli: &Cli) {
    if let Some(speed) = cli.speed {
        config.timing.speed = speed;
    }
    if let Some(url) = &cli.planner_url {
        config.planner.url = url.clone();
        config.planner.plan_file = None;
    }
    if let Some(path) = &cli.plan_file {
        config.planner.plan_file = Some(path.display().to_string());
    }
    if let Some(dir) = &cli.output_dir {
        config.planner.output_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.scenario_log {
        config.logging.scenario_log_dir = Some(dir.display().to_string());
    }
    if let Some(path) = &cli.log_file {
        config.logging.log_file = Some(path.display().to_string());
    }
    if cli.no_report {
        config.planner.report_progress = false;
    }
}

fn build_planner(config: &FileConfig) -> Result<Arc<dyn PlannerPort>> {
    if let Some(path) = &config.planner.plan_file {
        info!(file = %path, "Using file planner");
        return Ok(Arc::new(FilePlanner::new(path)));
    }
    http_planner(config)
}

#[cfg(feature = "http-planner")]
fn http_planner(config: &FileConfig) -> Result<Arc<dyn PlannerPort>> {
    info!(url = %config.planner.url, "Using HTTP planner");
    let planner = ward_infrastructure::HttpPlanner::new(
        config.planner.url.clone(),
        Duration::from_secs(config.planner.timeout_seconds),
    )?;
    Ok(Arc::new(planner))
}

#[cfg(not(feature = "http-planner"))]
fn http_planner(_config: &FileConfig) -> Result<Arc<dyn PlannerPort>> {
    bail!("Built without HTTP planner support; use --plan-file.")
}

/// Drive the coordinator until the scenario finalizes, the time limit
/// passes or the user interrupts.
async fn run(coordinator: &mut ScenarioCoordinator, time_limit: Option<u64>) -> Option<ScenarioOutcome> {
    let limit = async {
        match time_limit {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        outcome = coordinator.run_until_finalized() => outcome,
        _ = limit => {
            warn!("Time limit reached");
            None
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            None
        }
    }
}

/// Install the tracing subscriber: stderr always, plus `log_file` when set.
fn init_logging(verbose: u8, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Could not create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(if verbose == 0 { "info" } else { level }));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
