//! Streaming Aggregator
//!
//! Folds one observation into a pattern's running aggregate and rescores
//! it. Each update is an optimistic read-modify-write: read the record (or
//! start from a zeroed one), apply the observation, and compare-and-swap it
//! back. A concurrent write to the same key makes the swap fail and the
//! whole cycle is retried from a fresh read, so no update is ever lost.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{edge_score, BucketedDimensions, Observation, Pattern, ScoringParams};
use crate::ports::{PatternStore, StoreError};

use super::baseline_tracker::BaselineTracker;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gave up on '{key}' after {attempts} conflicting writes")]
    Contention { key: String, attempts: u32 },
}

/// One observation destined for one pattern key
#[derive(Debug, Clone, PartialEq)]
pub struct PatternUpdate {
    pub pattern_key: String,
    pub module: String,
    pub dimensions: BucketedDimensions,
    pub family_id: String,
    pub parent_keys: Vec<String>,
    pub observation: Observation,
    /// Drives the recurrence decay
    pub observed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StreamingAggregator {
    patterns: Arc<dyn PatternStore>,
    baselines: BaselineTracker,
    scoring: ScoringParams,
    max_attempts: u32,
}

impl StreamingAggregator {
    pub fn new(
        patterns: Arc<dyn PatternStore>,
        baselines: BaselineTracker,
        scoring: ScoringParams,
        max_attempts: u32,
    ) -> Self {
        Self {
            patterns,
            baselines,
            scoring,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Apply one observation and persist the rescored pattern
    pub async fn update(&self, update: &PatternUpdate) -> Result<Pattern, AggregatorError> {
        for attempt in 1..=self.max_attempts {
            let pattern = self.apply(update).await?;

            match self.patterns.compare_and_put(pattern).await {
                Ok(stored) => {
                    tracing::debug!(
                        "Updated {} (n={}, avg_rr={:.4}, edge={:.4}, v{})",
                        stored.pattern_key,
                        stored.stats.n,
                        stored.stats.avg_rr,
                        stored.stats.edge_score,
                        stored.version
                    );
                    return Ok(stored);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(
                        "Write conflict on {} (attempt {}/{}): {}",
                        update.pattern_key,
                        attempt,
                        self.max_attempts,
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AggregatorError::Contention {
            key: update.pattern_key.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Read the current record and fold the observation into it
    async fn apply(&self, update: &PatternUpdate) -> Result<Pattern, AggregatorError> {
        let now = Utc::now();
        let mut pattern = match self.patterns.get(&update.pattern_key).await? {
            Some(existing) => existing,
            None => Pattern::new(
                update.pattern_key.clone(),
                update.module.clone(),
                update.dimensions.clone(),
                update.family_id.clone(),
                update.parent_keys.clone(),
                now,
            ),
        };

        pattern.stats.observe(&update.observation);

        let baseline = self
            .baselines
            .lookup(&pattern.module, &pattern.dimensions)
            .await?;
        let edge = edge_score(&pattern.stats.edge_inputs(), baseline.rr, &self.scoring);
        pattern
            .stats
            .apply_edge(edge, update.observed_at, self.scoring.recurrence_tau_days);
        pattern.last_updated = now;

        Ok(pattern)
    }
}
