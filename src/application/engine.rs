//! Engine Settings
//!
//! Runtime parameters shared by the processor, aggregator and scorer.

use std::time::Duration;

use crate::domain::{ModuleRegistry, ScoringParams, DEFAULT_MAX_ARITY};

/// Default bound on compare-and-swap attempts per pattern update
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 5;

/// Default price-history query timeout
pub const DEFAULT_PRICE_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Largest dimension combination enumerated per context
    pub max_arity: usize,
    pub scoring: ScoringParams,
    pub max_update_retries: u32,
    pub price_timeout: Duration,
    pub modules: ModuleRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_arity: DEFAULT_MAX_ARITY,
            scoring: ScoringParams::default(),
            max_update_retries: DEFAULT_MAX_UPDATE_RETRIES,
            price_timeout: DEFAULT_PRICE_TIMEOUT,
            modules: ModuleRegistry::standard(),
        }
    }
}

impl EngineConfig {
    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_max_arity(mut self, max_arity: usize) -> Self {
        self.max_arity = max_arity;
        self
    }

    pub fn with_price_timeout(mut self, timeout: Duration) -> Self {
        self.price_timeout = timeout;
        self
    }

    pub fn with_max_update_retries(mut self, retries: u32) -> Self {
        self.max_update_retries = retries;
        self
    }
}
