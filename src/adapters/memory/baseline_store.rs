//! In-Memory Baseline Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{BaselineKey, BaselineSegment};
use crate::ports::{BaselineStore, StoreError};

/// Baseline tiers kept in memory; each `record` is one locked increment
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    segments: RwLock<HashMap<BaselineKey, BaselineSegment>>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<BaselineSegment>) -> Self {
        let segments = segments
            .into_iter()
            .map(|segment| (segment.key.clone(), segment))
            .collect();
        Self {
            segments: RwLock::new(segments),
        }
    }

    /// All tiers ordered by key
    pub async fn snapshot(&self) -> Vec<BaselineSegment> {
        let segments = self.segments.read().await;
        let mut all: Vec<BaselineSegment> = segments.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

#[async_trait]
impl BaselineStore for InMemoryBaselineStore {
    async fn get(&self, key: &BaselineKey) -> Result<Option<BaselineSegment>, StoreError> {
        Ok(self.segments.read().await.get(key).cloned())
    }

    async fn record(
        &self,
        key: &BaselineKey,
        rr: f64,
        at: DateTime<Utc>,
    ) -> Result<BaselineSegment, StoreError> {
        if !rr.is_finite() {
            return Err(StoreError::InvalidRecord(format!(
                "non-finite return {} for baseline {}",
                rr, key
            )));
        }

        let mut segments = self.segments.write().await;
        let segment = segments
            .entry(key.clone())
            .or_insert_with(|| BaselineSegment::new(key.clone(), at));
        segment.observe(rr, at);
        Ok(segment.clone())
    }

    async fn list_module(&self, module: &str) -> Result<Vec<BaselineSegment>, StoreError> {
        let segments = self.segments.read().await;
        let mut tiers: Vec<BaselineSegment> = segments
            .values()
            .filter(|s| s.key.module == module)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(tiers)
    }
}
