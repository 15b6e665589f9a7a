use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{BaselineKey, BaselineSegment, Pattern};

/// Storage error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Version conflict on '{key}': expected version {expected}, found {found}")]
    VersionConflict { key: String, expected: u64, found: u64 },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Pattern store port trait
///
/// Writes follow an optimistic read-modify-write contract: a pattern read at
/// version `v` may only be written back while the stored version is still
/// `v` (0 = absent). A successful write stores version `v + 1`.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Point read by pattern key
    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, StoreError>;

    /// Compare-and-swap write; returns the stored record with its new version
    async fn compare_and_put(&self, pattern: Pattern) -> Result<Pattern, StoreError>;

    /// Secondary lookup by family id
    async fn find_by_family(&self, family_id: &str) -> Result<Vec<Pattern>, StoreError>;

    /// All patterns owned by a module
    async fn list_module(&self, module: &str) -> Result<Vec<Pattern>, StoreError>;

    /// Number of stored patterns
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Baseline store port trait
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Point read of one baseline tier
    async fn get(&self, key: &BaselineKey) -> Result<Option<BaselineSegment>, StoreError>;

    /// Atomically fold one return into the tier's running mean,
    /// creating the tier on first observation
    async fn record(
        &self,
        key: &BaselineKey,
        rr: f64,
        at: DateTime<Utc>,
    ) -> Result<BaselineSegment, StoreError>;

    /// All tiers of a module
    async fn list_module(&self, module: &str) -> Result<Vec<BaselineSegment>, StoreError>;
}
