//! Counterfactual Inefficiency Buckets
//!
//! Discretizes a trade's "missed R/R" (how much better the entry or exit
//! could have been, in units of risk) into a small ordinal bucket so it can
//! take part in pattern keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound (inclusive) of the `small` bucket
pub const SMALL_THRESHOLD: f64 = 0.5;
/// Lower bound (inclusive) of the `medium` bucket
pub const MEDIUM_THRESHOLD: f64 = 1.0;
/// Lower bound (inclusive) of the `large` bucket
pub const LARGE_THRESHOLD: f64 = 2.0;

/// Discrete counterfactual improvement bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InefficiencyBucket {
    None,
    Small,
    Medium,
    Large,
}

impl InefficiencyBucket {
    /// Bucket a missed R/R value. Absent or NaN input maps to `None`.
    pub fn from_missed_rr(missed_rr: Option<f64>) -> Self {
        let Some(value) = missed_rr else {
            return InefficiencyBucket::None;
        };
        if value.is_nan() {
            return InefficiencyBucket::None;
        }

        if value < SMALL_THRESHOLD {
            InefficiencyBucket::None
        } else if value < MEDIUM_THRESHOLD {
            InefficiencyBucket::Small
        } else if value < LARGE_THRESHOLD {
            InefficiencyBucket::Medium
        } else {
            InefficiencyBucket::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InefficiencyBucket::None => "none",
            InefficiencyBucket::Small => "small",
            InefficiencyBucket::Medium => "medium",
            InefficiencyBucket::Large => "large",
        }
    }
}

impl fmt::Display for InefficiencyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
