//! Streaming Pattern Aggregates
//!
//! Single-pass running statistics per pattern key. Only sums are
//! accumulated; every mean and the variance are recomputed from the sums on
//! each observation, so history is never re-scanned and a freshly created
//! aggregate is just the zeroed aggregate after one observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::BucketedDimensions;
use super::scoring::{update_recurrence, EdgeInputs};

/// One closed-trade observation as seen by a pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub rr: f64,
    pub is_win: bool,
    pub hold_time_days: f64,
    pub time_to_payback_days: f64,
}

/// Running aggregate of a pattern
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningAggregate {
    pub n: u64,
    pub wins: u64,
    pub sum_rr: f64,
    pub sum_rr_squared: f64,
    pub sum_hold_time_days: f64,
    pub sum_time_to_payback_days: f64,
    pub avg_rr: f64,
    /// Population variance of rr, clamped at zero
    pub variance: f64,
    pub win_rate: f64,
    pub avg_hold_time_days: f64,
    pub avg_time_to_payback_days: f64,
    /// `1 / (1 + avg_time_to_payback_days)`
    pub time_efficiency: f64,
    /// Edge computed on the most recent update
    pub edge_score: f64,
    pub recurrence_score: f64,
    pub last_recurrence_update: Option<DateTime<Utc>>,
}

impl RunningAggregate {
    /// Add one observation's contributions and recompute derived fields
    pub fn observe(&mut self, obs: &Observation) {
        self.n += 1;
        if obs.is_win {
            self.wins += 1;
        }
        self.sum_rr += obs.rr;
        self.sum_rr_squared += obs.rr * obs.rr;
        self.sum_hold_time_days += obs.hold_time_days;
        self.sum_time_to_payback_days += obs.time_to_payback_days;
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.n == 0 {
            return;
        }
        let n = self.n as f64;
        self.avg_rr = self.sum_rr / n;
        self.variance = (self.sum_rr_squared / n - self.avg_rr * self.avg_rr).max(0.0);
        self.win_rate = self.wins as f64 / n;
        self.avg_hold_time_days = self.sum_hold_time_days / n;
        self.avg_time_to_payback_days = self.sum_time_to_payback_days / n;
        self.time_efficiency = 1.0 / (1.0 + self.avg_time_to_payback_days);
    }

    pub fn edge_inputs(&self) -> EdgeInputs {
        EdgeInputs {
            n: self.n,
            avg_rr: self.avg_rr,
            variance: self.variance,
            time_efficiency: self.time_efficiency,
        }
    }

    /// Record the current edge and fold it into the recurrence trend
    pub fn apply_edge(&mut self, edge: f64, at: DateTime<Utc>, tau_days: f64) {
        self.edge_score = edge;
        self.recurrence_score = update_recurrence(
            self.recurrence_score,
            self.last_recurrence_update,
            edge,
            at,
            tau_days,
        );
        self.last_recurrence_update = Some(match self.last_recurrence_update {
            Some(last) if last > at => last,
            _ => at,
        });
    }
}

/// Persistent pattern record, keyed by `pattern_key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_key: String,
    pub module: String,
    pub dimensions: BucketedDimensions,
    pub family_id: String,
    pub parent_keys: Vec<String>,
    pub stats: RunningAggregate,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Write counter used for compare-and-swap; 0 means never persisted
    #[serde(default)]
    pub version: u64,
}

impl Pattern {
    /// Unpersisted pattern with a zeroed aggregate
    pub fn new(
        pattern_key: String,
        module: String,
        dimensions: BucketedDimensions,
        family_id: String,
        parent_keys: Vec<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            pattern_key,
            module,
            dimensions,
            family_id,
            parent_keys,
            stats: RunningAggregate::default(),
            created_at: at,
            last_updated: at,
            version: 0,
        }
    }

    /// Number of variable dimensions
    pub fn arity(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}
