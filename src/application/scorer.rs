//! Edge Scorer
//!
//! On-demand scoring of stored patterns. Edges are recomputed against the
//! current baselines, so a score read long after the last update reflects
//! how the pattern compares to the market as it is now.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{edge_score, emergence, Confidence, KeyError, Pattern, PatternKey, ScoringParams};
use crate::ports::{PatternStore, StoreError};

use super::baseline_tracker::BaselineTracker;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Invalid pattern key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Everything a downstream rule generator reads about one pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternScores {
    pub pattern_key: String,
    pub module: String,
    pub family_id: String,
    pub parent_keys: Vec<String>,
    pub n: u64,
    pub avg_rr: f64,
    pub variance: f64,
    pub win_rate: f64,
    pub avg_time_to_payback_days: f64,
    pub baseline_rr: f64,
    pub edge_score: f64,
    pub recurrence_score: f64,
    pub emergence_score: f64,
    pub incremental_edge: f64,
    /// Number of parents found in the store
    pub scored_parents: usize,
    pub confidence: Confidence,
}

/// Ranking filter, mirroring what the downstream rule job selects on
#[derive(Debug, Clone, PartialEq)]
pub struct RankingQuery {
    pub module: String,
    pub min_samples: u64,
    pub min_edge: Option<f64>,
    pub min_incremental_edge: Option<f64>,
    pub max_per_family: Option<usize>,
    pub limit: Option<usize>,
}

impl RankingQuery {
    pub fn for_module(module: &str) -> Self {
        Self {
            module: module.to_string(),
            min_samples: 0,
            min_edge: None,
            min_incremental_edge: None,
            max_per_family: None,
            limit: None,
        }
    }

    pub fn min_samples(mut self, n: u64) -> Self {
        self.min_samples = n;
        self
    }

    pub fn min_edge(mut self, edge: f64) -> Self {
        self.min_edge = Some(edge);
        self
    }

    pub fn min_incremental_edge(mut self, edge: f64) -> Self {
        self.min_incremental_edge = Some(edge);
        self
    }

    pub fn max_per_family(mut self, cap: usize) -> Self {
        self.max_per_family = Some(cap);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn admits(&self, scores: &PatternScores) -> bool {
        self.min_edge.map_or(true, |min| scores.edge_score >= min)
            && self
                .min_incremental_edge
                .map_or(true, |min| scores.incremental_edge >= min)
    }
}

#[derive(Clone)]
pub struct EdgeScorer {
    patterns: Arc<dyn PatternStore>,
    baselines: BaselineTracker,
    params: ScoringParams,
}

impl EdgeScorer {
    pub fn new(patterns: Arc<dyn PatternStore>, baselines: BaselineTracker, params: ScoringParams) -> Self {
        Self {
            patterns,
            baselines,
            params,
        }
    }

    /// Scores of one pattern; `None` if the key was never observed
    pub async fn score(&self, pattern_key: &str) -> Result<Option<PatternScores>, ScoringError> {
        let canonical = PatternKey::parse(pattern_key)?.render();
        match self.patterns.get(&canonical).await? {
            Some(pattern) => Ok(Some(self.score_pattern(&pattern).await?)),
            None => Ok(None),
        }
    }

    /// Patterns of a module ordered by edge score, best first
    pub async fn rank(&self, query: &RankingQuery) -> Result<Vec<PatternScores>, ScoringError> {
        let candidates = self.patterns.list_module(&query.module).await?;

        let mut ranked = Vec::new();
        for pattern in candidates.iter().filter(|p| p.stats.n >= query.min_samples) {
            let scores = self.score_pattern(pattern).await?;
            if query.admits(&scores) {
                ranked.push(scores);
            }
        }

        ranked.sort_by(|a, b| {
            b.edge_score
                .partial_cmp(&a.edge_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.pattern_key.cmp(&b.pattern_key))
        });

        if let Some(cap) = query.max_per_family {
            let mut per_family: HashMap<String, usize> = HashMap::new();
            ranked.retain(|scores| {
                let taken = per_family.entry(scores.family_id.clone()).or_insert(0);
                *taken += 1;
                *taken <= cap
            });
        }

        if let Some(limit) = query.limit {
            ranked.truncate(limit);
        }

        tracing::debug!(
            "Ranked {} of {} {} patterns",
            ranked.len(),
            candidates.len(),
            query.module
        );

        Ok(ranked)
    }

    /// Edge of a pattern against its current baseline
    pub async fn current_edge(&self, pattern: &Pattern) -> Result<(f64, f64), StoreError> {
        let baseline = self
            .baselines
            .lookup(&pattern.module, &pattern.dimensions)
            .await?;
        let edge = edge_score(&pattern.stats.edge_inputs(), baseline.rr, &self.params);
        Ok((edge, baseline.rr))
    }

    async fn score_pattern(&self, pattern: &Pattern) -> Result<PatternScores, StoreError> {
        let (edge, baseline_rr) = self.current_edge(pattern).await?;

        let mut parent_edges = Vec::with_capacity(pattern.parent_keys.len());
        for parent_key in &pattern.parent_keys {
            if let Some(parent) = self.patterns.get(parent_key).await? {
                parent_edges.push(self.current_edge(&parent).await?.0);
            }
        }

        let stats = &pattern.stats;
        let emergence = emergence(edge, &parent_edges, stats.variance, stats.n);

        Ok(PatternScores {
            pattern_key: pattern.pattern_key.clone(),
            module: pattern.module.clone(),
            family_id: pattern.family_id.clone(),
            parent_keys: pattern.parent_keys.clone(),
            n: stats.n,
            avg_rr: stats.avg_rr,
            variance: stats.variance,
            win_rate: stats.win_rate,
            avg_time_to_payback_days: stats.avg_time_to_payback_days,
            baseline_rr,
            edge_score: edge,
            recurrence_score: stats.recurrence_score,
            emergence_score: emergence.score,
            incremental_edge: emergence.incremental_edge,
            scored_parents: parent_edges.len(),
            confidence: Confidence::from_samples(stats.n, self.params.min_sample_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBaselineStore, InMemoryPatternStore};
    use crate::domain::{parent_key_strings, Observation};
    use approx::assert_abs_diff_eq;
    use chrono::Utc;

    async fn seed(store: &InMemoryPatternStore, key: &str, family: &str, returns: &[f64]) {
        let parsed = PatternKey::parse(key).unwrap();
        let mut pattern = Pattern::new(
            key.to_string(),
            parsed.module().to_string(),
            parsed.dimension_map(),
            family.to_string(),
            parent_key_strings(key).unwrap(),
            Utc::now(),
        );
        for rr in returns {
            pattern.stats.observe(&Observation {
                rr: *rr,
                is_win: *rr > 0.0,
                hold_time_days: 1.0,
                time_to_payback_days: 1.0,
            });
        }
        store.compare_and_put(pattern).await.unwrap();
    }

    fn scorer(store: Arc<InMemoryPatternStore>) -> EdgeScorer {
        EdgeScorer::new(
            store,
            BaselineTracker::new(Arc::new(InMemoryBaselineStore::new())),
            ScoringParams::default(),
        )
    }

    const PARENT_A: &str = "module=pm|state=S1|outcome_class=win";
    const PARENT_B: &str = "module=pm|a_bucket=med|outcome_class=win";
    const CHILD: &str = "module=pm|a_bucket=med|state=S1|outcome_class=win";

    #[tokio::test]
    async fn test_score_unknown_key() {
        let scorer = scorer(Arc::new(InMemoryPatternStore::new()));
        assert!(scorer.score(PARENT_A).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_score_invalid_key() {
        let scorer = scorer(Arc::new(InMemoryPatternStore::new()));
        assert!(matches!(
            scorer.score("state=S1").await,
            Err(ScoringError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_score_without_parents_uses_edge() {
        let store = Arc::new(InMemoryPatternStore::new());
        seed(&store, PARENT_A, PARENT_A, &[1.0; 10]).await;

        let scores = scorer(store).score(PARENT_A).await.unwrap().unwrap();

        // avg 1.0, var 0, full sample, time_efficiency 0.5
        assert_abs_diff_eq!(scores.edge_score, 1.0, epsilon = 1e-12);
        assert_eq!(scores.incremental_edge, scores.edge_score);
        assert_eq!(scores.scored_parents, 0);
        assert_eq!(scores.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_score_with_parents() {
        let store = Arc::new(InMemoryPatternStore::new());
        seed(&store, PARENT_A, PARENT_A, &[0.2; 10]).await;
        seed(&store, PARENT_B, PARENT_A, &[0.4; 10]).await;
        seed(&store, CHILD, PARENT_A, &[1.0; 10]).await;

        let scores = scorer(store).score(CHILD).await.unwrap().unwrap();

        assert_eq!(scores.scored_parents, 2);
        assert_abs_diff_eq!(scores.incremental_edge, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(scores.emergence_score, 0.6 / 10f64.sqrt(), epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_stored_parent_edge_is_recomputed() {
        let store = Arc::new(InMemoryPatternStore::new());
        seed(&store, PARENT_A, PARENT_A, &[0.2; 10]).await;
        seed(&store, PARENT_B, PARENT_A, &[0.4; 10]).await;
        seed(&store, CHILD, PARENT_A, &[1.0; 10]).await;

        // Stale edge from an earlier baseline
        let mut stale = store.get(PARENT_B).await.unwrap().unwrap();
        stale.stats.edge_score = 5.0;
        store.compare_and_put(stale).await.unwrap();

        let scores = scorer(store).score(CHILD).await.unwrap().unwrap();

        assert_abs_diff_eq!(scores.incremental_edge, 0.6, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_score_accepts_non_canonical_key() {
        let store = Arc::new(InMemoryPatternStore::new());
        seed(&store, CHILD, PARENT_A, &[1.0]).await;

        let reordered = "module=pm|state=S1|a_bucket=med|outcome_class=win";
        let scores = scorer(store).score(reordered).await.unwrap().unwrap();
        assert_eq!(scores.pattern_key, CHILD);
    }

    #[tokio::test]
    async fn test_rank_orders_and_filters() {
        let store = Arc::new(InMemoryPatternStore::new());
        seed(&store, PARENT_A, PARENT_A, &[0.2; 10]).await;
        seed(&store, PARENT_B, PARENT_A, &[0.4; 10]).await;
        seed(&store, CHILD, PARENT_A, &[1.0; 10]).await;
        seed(&store, "module=pm|state=S2|outcome_class=win", "f2", &[2.0; 2]).await;
        seed(&store, "module=dm|curator=x|outcome_class=win", "f3", &[5.0; 20]).await;

        let scorer = scorer(store);

        let all = scorer.rank(&RankingQuery::for_module("pm")).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|s| s.pattern_key.as_str()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], CHILD);
        assert!(all.windows(2).all(|w| w[0].edge_score >= w[1].edge_score));

        let sampled = scorer
            .rank(&RankingQuery::for_module("pm").min_samples(10))
            .await
            .unwrap();
        assert_eq!(sampled.len(), 3);

        let emerging = scorer
            .rank(&RankingQuery::for_module("pm").min_samples(10).min_incremental_edge(0.5))
            .await
            .unwrap();
        assert_eq!(emerging.len(), 1);
        assert_eq!(emerging[0].pattern_key, CHILD);

        let capped = scorer
            .rank(&RankingQuery::for_module("pm").max_per_family(1))
            .await
            .unwrap();
        let families: Vec<&str> = capped.iter().map(|s| s.family_id.as_str()).collect();
        assert_eq!(families, vec![PARENT_A, "f2"]);

        let limited = scorer
            .rank(&RankingQuery::for_module("pm").min_edge(0.3).limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_query_builder() {
        let query = RankingQuery::for_module("pm")
            .min_samples(5)
            .min_edge(0.1)
            .max_per_family(2)
            .limit(10);
        assert_eq!(query.min_samples, 5);
        assert_eq!(query.min_edge, Some(0.1));
        assert_eq!(query.max_per_family, Some(2));
        assert_eq!(query.limit, Some(10));
        assert!(query.min_incremental_edge.is_none());
    }
}
