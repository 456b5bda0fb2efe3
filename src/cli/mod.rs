//! Command-line interface for the receptor-satellite worker.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Receptor worker running Ansible playbooks through Satellite
///
/// Reads one directive per line from stdin and writes protocol messages as
/// JSON lines to stdout. Logs go to stderr.
#[derive(Parser, Debug, Clone)]
#[command(name = "receptor-satellite")]
#[command(version)]
#[command(about = "Runs Ansible playbooks through Satellite remote execution", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
