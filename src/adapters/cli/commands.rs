//! CLI Command Definitions
//!
//! Argument parsing for the butters-edge commands. Handlers live in `main.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Butters Edge - contextual pattern miner for closed-trade outcomes
#[derive(Parser, Debug)]
#[command(
    name = "butters-edge",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Contextual edge miner for closed-trade outcomes",
    long_about = "Butters Edge folds closed trades into running statistics for every \
                  combination of their decision context, and scores each pattern by \
                  edge over baseline, recurrence and emergence."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSONL file of closed trades into the pattern store
    Ingest(IngestCmd),

    /// Show ranked patterns of a module
    Report(ReportCmd),

    /// Show scores for a single pattern key
    Inspect(InspectCmd),

    /// Show field coherence of a pattern family
    Coherence(CoherenceCmd),
}

impl Command {
    /// Config file the command was pointed at
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Ingest(cmd) => &cmd.config,
            Command::Report(cmd) => &cmd.config,
            Command::Inspect(cmd) => &cmd.config,
            Command::Coherence(cmd) => &cmd.config,
        }
    }
}

/// Output format for read commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Replay closed trades
#[derive(Parser, Debug)]
pub struct IngestCmd {
    /// JSONL file, one closed trade per line
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/edge.toml")]
    pub config: PathBuf,

    /// Override data directory (snapshot location)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override price bars directory
    #[arg(long, value_name = "DIR")]
    pub bars_dir: Option<PathBuf>,

    /// Process trades without saving the snapshot
    #[arg(long)]
    pub dry_run: bool,
}

/// Ranked pattern report
#[derive(Parser, Debug)]
pub struct ReportCmd {
    /// Module to report on (e.g., pm)
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/edge.toml")]
    pub config: PathBuf,

    /// Override data directory (snapshot location)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Minimum sample count
    #[arg(long, value_name = "N", default_value = "0")]
    pub min_samples: u64,

    /// Minimum edge score
    #[arg(long, value_name = "EDGE")]
    pub min_edge: Option<f64>,

    /// Minimum incremental edge over the best parent
    #[arg(long, value_name = "EDGE")]
    pub min_incremental: Option<f64>,

    /// Maximum patterns per family
    #[arg(long, value_name = "N")]
    pub per_family: Option<usize>,

    /// Maximum patterns shown
    #[arg(short, long, value_name = "N", default_value = "20")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Single-pattern scores
#[derive(Parser, Debug)]
pub struct InspectCmd {
    /// Canonical pattern key
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/edge.toml")]
    pub config: PathBuf,

    /// Override data directory (snapshot location)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Family field coherence
#[derive(Parser, Debug)]
pub struct CoherenceCmd {
    /// Family id (canonical key of module, core dimensions, outcome class)
    #[arg(value_name = "FAMILY")]
    pub family_id: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/edge.toml")]
    pub config: PathBuf,

    /// Override data directory (snapshot location)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
