//! Edge, Recurrence & Emergence Scoring
//!
//! Edge score:
//!
//! ```text
//! edge = (avg_rr - baseline_rr) / (sqrt(variance) + 1)
//!        * min(1, n / MIN_SAMPLE)
//!        * (1 + 0.5 * (time_efficiency - 0.5))
//! ```
//!
//! Positive edge means outperformance after volatility adjustment. The
//! magnitude is not a probability.
//!
//! Recurrence is an exponentially time-decayed trend of the edge score
//! (tau = 30 days), emergence measures how much a pattern beats its best
//! one-dimension-simpler parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::payback::days_between;

/// Sample size at which the small-sample penalty disappears
pub const DEFAULT_MIN_SAMPLE_SIZE: u64 = 10;
/// Recurrence decay constant in days
pub const DEFAULT_RECURRENCE_TAU_DAYS: f64 = 30.0;
/// Emergence never discounts by fewer samples than this
pub const EMERGENCE_MIN_N: u64 = 3;

/// Tunables shared by all scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    pub min_sample_size: u64,
    pub recurrence_tau_days: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            recurrence_tau_days: DEFAULT_RECURRENCE_TAU_DAYS,
        }
    }
}

/// Aggregate fields the edge score depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeInputs {
    pub n: u64,
    pub avg_rr: f64,
    pub variance: f64,
    pub time_efficiency: f64,
}

/// Risk-adjusted, sample-penalized outperformance versus `baseline_rr`
pub fn edge_score(inputs: &EdgeInputs, baseline_rr: f64, params: &ScoringParams) -> f64 {
    if inputs.n == 0 {
        return 0.0;
    }
    let risk_adjusted = (inputs.avg_rr - baseline_rr) / (inputs.variance.max(0.0).sqrt() + 1.0);
    let sample_factor = if params.min_sample_size == 0 {
        1.0
    } else {
        (inputs.n as f64 / params.min_sample_size as f64).min(1.0)
    };
    let speed_factor = 1.0 + 0.5 * (inputs.time_efficiency - 0.5);
    risk_adjusted * sample_factor * speed_factor
}

/// Blend weight of the newest edge given elapsed time since the last update
pub fn recurrence_alpha(
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tau_days: f64,
) -> f64 {
    match last_update {
        None => 1.0,
        Some(last) => {
            let delta_days = days_between(last, now);
            1.0 - (-delta_days / tau_days).exp()
        }
    }
}

/// `alpha * edge + (1 - alpha) * previous`
pub fn update_recurrence(
    previous: f64,
    last_update: Option<DateTime<Utc>>,
    edge: f64,
    now: DateTime<Utc>,
    tau_days: f64,
) -> f64 {
    let alpha = recurrence_alpha(last_update, now, tau_days);
    alpha * edge + (1.0 - alpha) * previous
}

/// Edge of a pattern relative to its best parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emergence {
    pub incremental_edge: f64,
    pub score: f64,
}

/// Emergence score.
///
/// With no parent edges the baseline is the implicit parent, so the
/// incremental edge is the edge itself.
pub fn emergence(edge: f64, parent_edges: &[f64], variance: f64, n: u64) -> Emergence {
    let best_parent = parent_edges
        .iter()
        .copied()
        .filter(|e| e.is_finite())
        .fold(None, |best: Option<f64>, e| Some(best.map_or(e, |b| b.max(e))));

    let incremental_edge = edge - best_parent.unwrap_or(0.0);
    let variance_discount = 1.0 + variance.max(0.0);
    let sample_discount = (n.max(EMERGENCE_MIN_N) as f64).sqrt();

    Emergence {
        incremental_edge,
        score: incremental_edge / variance_discount / sample_discount,
    }
}

/// Sample-size confidence label attached to ranked scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_samples(n: u64, min_sample_size: u64) -> Self {
        if n < min_sample_size {
            Confidence::Low
        } else if n < min_sample_size.saturating_mul(3) {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}
