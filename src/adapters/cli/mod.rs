//! CLI Adapter
//!
//! Command-line interface for the edge miner.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, CoherenceCmd, Command, IngestCmd, InspectCmd, OutputFormat, ReportCmd};
