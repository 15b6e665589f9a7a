//! Baseline Tracker
//!
//! Records every realized return into the module's segment, timeframe and
//! global tiers, and resolves the baseline a pattern is scored against.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{BaselineKey, BaselineSegment, BucketedDimensions, ResolvedBaseline};
use crate::ports::{BaselineStore, StoreError};

#[derive(Clone)]
pub struct BaselineTracker {
    store: Arc<dyn BaselineStore>,
}

impl BaselineTracker {
    pub fn new(store: Arc<dyn BaselineStore>) -> Self {
        Self { store }
    }

    /// Fold one return into every tier whose key components are present
    pub async fn record(
        &self,
        module: &str,
        mcap_bucket: Option<&str>,
        timeframe: Option<&str>,
        rr: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<BaselineSegment>, StoreError> {
        let mut updated = Vec::with_capacity(3);
        for key in BaselineKey::tiers(module, mcap_bucket, timeframe) {
            let segment = self.store.record(&key, rr, at).await?;
            tracing::debug!(
                "Baseline {} -> n={} mean_rr={:.4}",
                segment.key,
                segment.n,
                segment.mean_rr
            );
            updated.push(segment);
        }
        Ok(updated)
    }

    /// Most specific tier with samples for a pattern's own segment
    /// dimensions; the conservative default when none has any
    pub async fn lookup(
        &self,
        module: &str,
        dimensions: &BucketedDimensions,
    ) -> Result<ResolvedBaseline, StoreError> {
        for key in BaselineKey::chain_for(module, dimensions) {
            if let Some(segment) = self.store.get(&key).await? {
                if segment.has_samples() {
                    return Ok(ResolvedBaseline::from_chain([Some(segment)]));
                }
            }
        }
        Ok(ResolvedBaseline::default_baseline())
    }

    /// Every recorded tier of a module, ordered by key
    pub async fn tiers(&self, module: &str) -> Result<Vec<BaselineSegment>, StoreError> {
        self.store.list_module(module).await
    }
}
