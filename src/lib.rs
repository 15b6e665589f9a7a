//! Butters Edge - Contextual Edge Miner Library
//!
//! Streams closed-trade outcomes into running statistics for every
//! combination of each trade's decision context, and scores the resulting
//! patterns by edge over baseline, recurrence and emergence.
//!
//! # Modules
//!
//! - `domain`: Core logic (pattern keys, lineage, aggregates, baselines, scoring)
//! - `ports`: Trait abstractions (PatternStore, BaselineStore, PriceHistoryPort)
//! - `adapters`: Implementations (in-memory stores, JSON snapshot, bar files, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Outcome processor, aggregator, scorer and coherence use cases

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
