//! Domain Layer - Core pattern statistics for the edge miner
//!
//! This module contains pure domain types and logic with no external dependencies.
//! All external interactions happen through the ports layer.
//!
//! - `bucket`: Counterfactual inefficiency bucketing
//! - `context`: Dimension values and per-module whitelists
//! - `pattern_key`: Canonical pattern keys and k-combination enumeration
//! - `lineage`: Family ids and parent keys
//! - `payback`: Time-to-payback bar walk
//! - `baseline`: Three-tier return baselines
//! - `aggregate`: Streaming per-pattern aggregates
//! - `scoring`: Edge, recurrence and emergence scores
//! - `coherence`: Cross-segment field coherence
//! - `trade_outcome`: Inbound closed-trade events

pub mod bucket;
pub mod context;
pub mod pattern_key;
pub mod lineage;
pub mod payback;
pub mod baseline;
pub mod aggregate;
pub mod scoring;
pub mod coherence;
pub mod trade_outcome;

pub use bucket::InefficiencyBucket;
pub use context::{BucketedDimensions, DimensionMap, DimensionValue, ModuleRegistry, ModuleSpec};
pub use pattern_key::{generate_pattern_keys, expected_key_count, KeyError, PatternKey, DEFAULT_MAX_ARITY};
pub use lineage::{family_id, parent_key_strings, parent_keys};
pub use payback::{time_to_payback_days, PaybackWindow, PriceBar};
pub use baseline::{BaselineGranularity, BaselineKey, BaselineSegment, ResolvedBaseline, DEFAULT_BASELINE_RR};
pub use aggregate::{Observation, Pattern, RunningAggregate};
pub use scoring::{edge_score, emergence, Confidence, EdgeInputs, Emergence, ScoringParams};
pub use coherence::{FieldCoherence, SegmentEdge, SegmentId};
pub use trade_outcome::{ActionContext, ClosedTrade};
