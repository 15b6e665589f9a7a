//! Field Coherence Analyzer
//!
//! Checks whether a family's edge holds up across market segments: every
//! stored segment variant of the family core is rescored against its own
//! segment baseline, and coherence is the share of segments with a
//! positive edge.

use std::sync::Arc;

use crate::domain::coherence::{core_dimensions, segment_of};
use crate::domain::{FieldCoherence, PatternKey, SegmentEdge};
use crate::ports::PatternStore;

use super::scorer::{EdgeScorer, ScoringError};

#[derive(Clone)]
pub struct CoherenceAnalyzer {
    patterns: Arc<dyn PatternStore>,
    scorer: EdgeScorer,
}

impl CoherenceAnalyzer {
    pub fn new(patterns: Arc<dyn PatternStore>, scorer: EdgeScorer) -> Self {
        Self { patterns, scorer }
    }

    /// Coherence of one family; `score` is `None` while no segment variant
    /// has been observed
    pub async fn field_coherence(&self, family_id: &str) -> Result<FieldCoherence, ScoringError> {
        let family_id = PatternKey::parse(family_id)?.render();
        let core = core_dimensions(&family_id)?;

        let members = self.patterns.find_by_family(&family_id).await?;
        let mut segments = Vec::new();
        for pattern in &members {
            let Some(segment) = segment_of(&core, pattern) else {
                continue;
            };
            let (edge_score, baseline_rr) = self.scorer.current_edge(pattern).await?;
            segments.push(SegmentEdge {
                pattern_key: pattern.pattern_key.clone(),
                segment,
                n: pattern.stats.n,
                baseline_rr,
                edge_score,
            });
        }

        let coherence = FieldCoherence::from_segments(&family_id, segments);
        tracing::debug!(
            "Family {}: {}/{} positive segments ({} members)",
            family_id,
            coherence.positive_segments,
            coherence.tested_segments,
            members.len()
        );

        Ok(coherence)
    }
}
