//! In-Memory Storage Adapters
//!
//! Store implementations used by the CLI (restored from and saved to a JSON
//! snapshot around each run) and by tests.

mod baseline_store;
mod pattern_store;

pub use baseline_store::InMemoryBaselineStore;
pub use pattern_store::InMemoryPatternStore;
