//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "hapbridge", version, about = "Haptic feedback bridge")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/hapbridge.toml")]
    pub config: PathBuf,

    /// Optional routing CSV (strict header `serial,routing_key`) merged into the trackers table
    #[arg(long = "routing-csv", value_name = "FILE")]
    pub routing_csv: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Attach devices and feed `<routing_key> <value>` lines from stdin into them
    Run {
        /// Print per-device loop stats on exit
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        /// Stop after this many milliseconds instead of at end of input
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Write settings created during the run back to --config
        #[arg(long, action = ArgAction::SetTrue)]
        save: bool,
    },
    /// Pulse one device so it can be identified
    Pulse {
        /// Device serial
        #[arg(long)]
        serial: String,
        /// Pulse length in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 500)]
        ms: u32,
    },
    /// List the devices the tracker reports
    List,
    /// Validate the config and probe the tracker
    SelfCheck,
}
