//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Historical price bars (time-to-payback)
//! - Pattern storage with optimistic versioned writes
//! - Baseline tier storage with atomic increments

pub mod price_history;
pub mod storage;
#[cfg(test)]
pub mod mocks;

// Re-export main traits and types
pub use price_history::{BarQuery, NoPriceHistory, PriceHistoryError, PriceHistoryPort};
pub use storage::{BaselineStore, PatternStore, StoreError};
