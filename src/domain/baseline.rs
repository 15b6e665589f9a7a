//! Return Baselines
//!
//! Running mean realized return per module at three nested granularities:
//! market segment (market-cap bucket + timeframe), timeframe only, and the
//! module as a whole. Edge scores are measured against the most specific
//! baseline that has samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::{BucketedDimensions, MCAP_BUCKET_DIM, TIMEFRAME_DIM};

/// Baseline used when no tier has any samples yet
pub const DEFAULT_BASELINE_RR: f64 = 0.0;

/// Granularity of a baseline tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineGranularity {
    Segment,
    Timeframe,
    Global,
}

/// Identity of a baseline record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineKey {
    pub module: String,
    pub mcap_bucket: Option<String>,
    pub timeframe: Option<String>,
}

impl BaselineKey {
    pub fn segment(module: &str, mcap_bucket: &str, timeframe: &str) -> Self {
        Self {
            module: module.to_string(),
            mcap_bucket: Some(mcap_bucket.to_string()),
            timeframe: Some(timeframe.to_string()),
        }
    }

    pub fn timeframe(module: &str, timeframe: &str) -> Self {
        Self {
            module: module.to_string(),
            mcap_bucket: None,
            timeframe: Some(timeframe.to_string()),
        }
    }

    pub fn global(module: &str) -> Self {
        Self {
            module: module.to_string(),
            mcap_bucket: None,
            timeframe: None,
        }
    }

    pub fn granularity(&self) -> BaselineGranularity {
        match (&self.mcap_bucket, &self.timeframe) {
            (Some(_), Some(_)) => BaselineGranularity::Segment,
            (None, Some(_)) => BaselineGranularity::Timeframe,
            _ => BaselineGranularity::Global,
        }
    }

    /// Tiers a trade contributes to, most specific first.
    ///
    /// The same order is the lookup fallback chain.
    pub fn tiers(module: &str, mcap_bucket: Option<&str>, timeframe: Option<&str>) -> Vec<Self> {
        let mut tiers = Vec::with_capacity(3);
        if let (Some(mcap), Some(tf)) = (mcap_bucket, timeframe) {
            tiers.push(Self::segment(module, mcap, tf));
        }
        if let Some(tf) = timeframe {
            tiers.push(Self::timeframe(module, tf));
        }
        tiers.push(Self::global(module));
        tiers
    }

    /// Fallback chain for a pattern's own segment dimensions
    pub fn chain_for(module: &str, dimensions: &BucketedDimensions) -> Vec<Self> {
        Self::tiers(
            module,
            dimensions.get(MCAP_BUCKET_DIM).map(String::as_str),
            dimensions.get(TIMEFRAME_DIM).map(String::as_str),
        )
    }
}

impl fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.module,
            self.mcap_bucket.as_deref().unwrap_or("*"),
            self.timeframe.as_deref().unwrap_or("*")
        )
    }
}

/// Running mean return of one baseline tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSegment {
    pub key: BaselineKey,
    pub n: u64,
    pub mean_rr: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl BaselineSegment {
    /// Empty segment; the first `observe` sets the mean to the sample
    pub fn new(key: BaselineKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            n: 0,
            mean_rr: 0.0,
            created_at: at,
            last_updated: at,
        }
    }

    /// Incremental mean update: `mean += (x - mean) / n`
    pub fn observe(&mut self, rr: f64, at: DateTime<Utc>) {
        self.n += 1;
        self.mean_rr += (rr - self.mean_rr) / self.n as f64;
        self.last_updated = at;
    }

    pub fn has_samples(&self) -> bool {
        self.n > 0
    }
}

/// Resolved baseline value and the tier it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBaseline {
    pub rr: f64,
    /// `None` when the conservative default was used
    pub source: Option<BaselineKey>,
}

impl ResolvedBaseline {
    pub fn default_baseline() -> Self {
        Self {
            rr: DEFAULT_BASELINE_RR,
            source: None,
        }
    }

    /// First tier with samples wins
    pub fn from_chain<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Option<BaselineSegment>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find(BaselineSegment::has_samples)
            .map(|segment| Self {
                rr: segment.mean_rr,
                source: Some(segment.key),
            })
            .unwrap_or_else(Self::default_baseline)
    }
}
