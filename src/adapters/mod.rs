//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Memory: in-memory pattern and baseline stores
//! - Snapshot: JSON persistence of both stores between runs
//! - Bar files: price history read from per-instrument JSON files
//! - CLI: Command-line interface definitions

pub mod memory;
pub mod snapshot;
pub mod bar_files;
pub mod cli;

pub use memory::{InMemoryBaselineStore, InMemoryPatternStore};
pub use snapshot::{RecoveryStatus, SnapshotError, StoreSnapshot};
pub use bar_files::JsonBarDirectory;
pub use cli::CliApp;
