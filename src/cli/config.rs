use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::agent_model::EngineConfig;
use crate::browser::session::BrowserConfig;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "aria-pilot",
    version,
    about = "Accessibility-tree browser interaction engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: aria-pilot.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a page with a scripted decision engine
    Run {
        /// URL to open first
        #[arg(long)]
        url: String,

        /// YAML action script; without one the session ends immediately with `done`
        #[arg(long)]
        script: Option<PathBuf>,

        /// Override the configured turn budget
        #[arg(long)]
        max_turns: Option<u32>,

        /// Approve every destructive action without asking
        #[arg(long)]
        yes: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
        format: ReportFormat,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print one rendered snapshot of a page
    Observe {
        #[arg(long)]
        url: String,

        /// Print the snapshot as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the safety gate on an element description
    Classify {
        /// e.g. "button Delete account"
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Console,
    Json,
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

pub const DEFAULT_CONFIG_PATH: &str = "aria-pilot.yaml";

/// Optional YAML config file: `aria-pilot.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(flatten)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// JSONL step trace; `null` disables it.
    #[serde(default = "default_trace_path")]
    pub path: Option<PathBuf>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            path: default_trace_path(),
        }
    }
}

fn default_trace_path() -> Option<PathBuf> {
    Some(PathBuf::from("aria_pilot_trace.jsonl"))
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    match std::fs::read_to_string(config_path) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = config_path, error = %e, "malformed config file, using defaults");
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// `RUST_LOG`-style directive for a `-v` count.
pub fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
