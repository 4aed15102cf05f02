//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Slotpipe - snapshot + change-stream resharding pipeline
#[derive(Parser, Debug)]
#[command(
    name = "slotpipe",
    author,
    version,
    about = "Key-value snapshot and change-stream resharding pipeline",
    long_about = "Reshards a replication stream across a destination cluster.\n\n\
                  Reads a snapshot followed by an ordered mutation stream, routes \n\
                  every record to its destination shard by key slot, and writes one \n\
                  independently verifiable output file per destination node."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SLOTPIPE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SLOTPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the resharding pipeline
    Run(RunArgs),

    /// Validate configuration and topology without running
    Validate(ValidateArgs),

    /// Display configuration and topology information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "slotpipe.toml", env = "SLOTPIPE_CONFIG")]
    pub config: PathBuf,

    /// Replay a recorded event stream from this file
    #[arg(short, long, env = "SLOTPIPE_INPUT", conflicts_with = "mock")]
    pub input: Option<PathBuf>,

    /// Use a deterministic synthetic stream instead of an input file
    #[arg(long)]
    pub mock: bool,

    /// Snapshot records in the synthetic stream
    #[arg(long, default_value = "1000", requires = "mock")]
    pub mock_records: usize,

    /// Mutations in the synthetic stream
    #[arg(long, default_value = "100", requires = "mock")]
    pub mock_mutations: usize,

    /// Override the worker pool size from configuration
    #[arg(long, env = "SLOTPIPE_WORKERS")]
    pub workers: Option<usize>,

    /// Override the output directory from configuration
    #[arg(long, env = "SLOTPIPE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SLOTPIPE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running the pipeline
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "slotpipe.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "slotpipe.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-node slot counts
    #[arg(long)]
    pub slots: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
