//! Field Coherence
//!
//! Does a family's edge hold in every market segment it has been seen in?
//! Segment variants of a core pattern are the family's patterns whose
//! dimensions are exactly the core plus some market-cap bucket and/or
//! timeframe. Each variant's edge is measured against its own segment
//! baseline; coherence is the share of tested segments with positive edge.

use serde::{Deserialize, Serialize};

use super::aggregate::Pattern;
use super::context::{BucketedDimensions, MCAP_BUCKET_DIM, SEGMENT_DIMENSIONS, TIMEFRAME_DIM};
use super::pattern_key::{KeyError, PatternKey};

/// Market segment a pattern variant belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId {
    pub mcap_bucket: Option<String>,
    pub timeframe: Option<String>,
}

/// Edge of one segment variant against its own baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEdge {
    pub pattern_key: String,
    pub segment: SegmentId,
    pub n: u64,
    pub baseline_rr: f64,
    pub edge_score: f64,
}

/// Coherence of a family's edge across segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCoherence {
    pub family_id: String,
    pub tested_segments: usize,
    pub positive_segments: usize,
    /// `None` when no segment has been tested yet
    pub score: Option<f64>,
    pub segments: Vec<SegmentEdge>,
}

impl FieldCoherence {
    pub fn from_segments(family_id: &str, mut segments: Vec<SegmentEdge>) -> Self {
        segments.sort_by(|a, b| a.segment.cmp(&b.segment));

        let tested_segments = segments.len();
        let positive_segments = segments.iter().filter(|s| s.edge_score > 0.0).count();
        let score = if tested_segments == 0 {
            None
        } else {
            Some(positive_segments as f64 / tested_segments as f64)
        };

        Self {
            family_id: family_id.to_string(),
            tested_segments,
            positive_segments,
            score,
            segments,
        }
    }

    pub fn is_tested(&self) -> bool {
        self.score.is_some()
    }
}

/// Core dimensions of a family id, segment dimensions excluded
pub fn core_dimensions(family_id: &str) -> Result<BucketedDimensions, KeyError> {
    let key = PatternKey::parse(family_id)?;
    Ok(key
        .dimension_map()
        .into_iter()
        .filter(|(name, _)| !SEGMENT_DIMENSIONS.contains(&name.as_str()))
        .collect())
}

/// Segment of a pattern if it is a pure segment variant of `core`
pub fn segment_of(core: &BucketedDimensions, pattern: &Pattern) -> Option<SegmentId> {
    let matches_core = core
        .iter()
        .all(|(name, value)| pattern.dimensions.get(name) == Some(value));
    if !matches_core {
        return None;
    }

    let mut extra = pattern
        .dimensions
        .keys()
        .filter(|name| !core.contains_key(name.as_str()))
        .peekable();
    extra.peek()?;
    if !extra.all(|name| SEGMENT_DIMENSIONS.contains(&name.as_str())) {
        return None;
    }

    Some(SegmentId {
        mcap_bucket: pattern.dimensions.get(MCAP_BUCKET_DIM).cloned(),
        timeframe: pattern.dimensions.get(TIMEFRAME_DIM).cloned(),
    })
}
