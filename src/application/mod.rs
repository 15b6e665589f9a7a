//! Application Layer - Use cases over the ports
//!
//! - `outcome_processor`: per-trade pipeline and the stream run loop
//! - `aggregator`: optimistic read-modify-write of pattern aggregates
//! - `baseline_tracker`: three-tier baseline recording and lookup
//! - `payback_resolver`: time-to-payback with price-history fallback
//! - `scorer`: on-demand scores and ranking
//! - `coherence_analyzer`: cross-segment field coherence

pub mod engine;
pub mod payback_resolver;
pub mod baseline_tracker;
pub mod aggregator;
pub mod scorer;
pub mod coherence_analyzer;
pub mod outcome_processor;

pub use engine::{EngineConfig, DEFAULT_MAX_UPDATE_RETRIES, DEFAULT_PRICE_TIMEOUT};
pub use payback_resolver::{PaybackResolver, PaybackSource, ResolvedPayback};
pub use baseline_tracker::BaselineTracker;
pub use aggregator::{AggregatorError, PatternUpdate, StreamingAggregator};
pub use scorer::{EdgeScorer, PatternScores, RankingQuery, ScoringError};
pub use coherence_analyzer::CoherenceAnalyzer;
pub use outcome_processor::{OutcomeProcessor, ProcessError, ProcessReport, RunSummary};
