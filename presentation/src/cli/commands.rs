//! CLI command definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the scenario summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON summary on stdout
    Json,
}

/// CLI arguments for ward-coordinator
#[derive(Parser, Debug)]
#[command(name = "ward-coordinator")]
#[command(author, version, about = "Nurse/doctor ward coordination runtime")]
#[command(long_about = r#"
Ward Coordinator runs a nurse and a doctor through a planned emergency-ward
scenario.

A planner turns a free-text description into patients and one command list
per agent. The coordinator walks patients through their treatment pathway,
arbitrates who may escort whom, enforces treatment time limits and reports
when every patient has left.

Configuration files are loaded from (in priority order):
1. WARD_* environment variables (WARD_TIMING__SPEED=2)
2. --config <path>     Explicit config file
3. ./ward.toml         Project-level config
4. ~/.config/ward-coordinator/config.toml   Global config

Example:
  ward-coordinator "Two patients: chest pain (critical) and a broken arm"
  ward-coordinator --plan-file plans/triage.json --speed 10 "triage drill"
  ward-coordinator --planner-url http://10.0.0.5:5000 -vv "busy night"
"#)]
pub struct Cli {
    /// Scenario description sent to the planner
    pub description: Option<String>,

    /// Read the plan from a JSON file instead of the HTTP planner
    #[arg(long, value_name = "PATH", conflicts_with = "planner_url")]
    pub plan_file: Option<PathBuf>,

    /// Base URL of the HTTP planner
    #[arg(long, value_name = "URL")]
    pub planner_url: Option<String>,

    /// Simulation speed multiplier
    #[arg(short, long, value_name = "FACTOR")]
    pub speed: Option<f64>,

    /// Directory the planner writes its analysis to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Directory for the JSONL scenario log
    #[arg(long, value_name = "DIR")]
    pub scenario_log: Option<PathBuf>,

    /// Also write diagnostics to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Give up if the scenario has not finished after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub time_limit: Option<u64>,

    /// Do not notify the planner of step completions and exits
    #[arg(long)]
    pub no_report: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}
