//! Trade Context Dimensions
//!
//! Value types for the dimension→value mapping attached to every action of a
//! closed trade, and the per-module whitelists that decide which dimensions
//! may take part in pattern keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::pattern_key::sanitize_token;

/// Reserved token naming the owning module
pub const MODULE_TOKEN: &str = "module";
/// Reserved dimension carrying the trade's outcome class
pub const OUTCOME_CLASS_DIM: &str = "outcome_class";
/// Market-cap segment dimension
pub const MCAP_BUCKET_DIM: &str = "mcap_bucket";
/// Timeframe segment dimension
pub const TIMEFRAME_DIM: &str = "timeframe";
pub const HOLD_TIME_CLASS_DIM: &str = "hold_time_class";
pub const ENTRY_IMPROVEMENT_DIM: &str = "entry_improvement_bucket";
pub const EXIT_IMPROVEMENT_DIM: &str = "exit_improvement_bucket";

/// Dimensions that identify a market segment rather than a decision context
pub const SEGMENT_DIMENSIONS: [&str; 2] = [MCAP_BUCKET_DIM, TIMEFRAME_DIM];

/// A single context value as produced upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl DimensionValue {
    /// Canonical string form used inside pattern keys.
    ///
    /// Booleans render lowercase, numbers in their shortest round-trip form.
    /// The key separator `|` is never allowed through.
    pub fn render(&self) -> String {
        match self {
            DimensionValue::Bool(b) => b.to_string(),
            DimensionValue::Number(n) => n.to_string(),
            DimensionValue::Text(s) => sanitize_token(s),
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for DimensionValue {
    fn from(value: &str) -> Self {
        DimensionValue::Text(value.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(value: String) -> Self {
        DimensionValue::Text(value)
    }
}

impl From<bool> for DimensionValue {
    fn from(value: bool) -> Self {
        DimensionValue::Bool(value)
    }
}

impl From<f64> for DimensionValue {
    fn from(value: f64) -> Self {
        DimensionValue::Number(value)
    }
}

/// Raw dimension mapping of one action context. `None` values are ignored.
pub type DimensionMap = BTreeMap<String, Option<DimensionValue>>;

/// Bucketed, rendered dimensions of a stored pattern
pub type BucketedDimensions = BTreeMap<String, String>;

/// Whitelist and family definition for one trading module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Module identifier (e.g. "pm")
    pub name: String,
    /// Dimensions allowed to appear in this module's pattern keys
    pub dimensions: BTreeSet<String>,
    /// Family-defining core dimensions, in declaration order
    pub core_dimensions: Vec<String>,
}

impl ModuleSpec {
    pub fn new<I, J, S, T>(name: &str, dimensions: I, core_dimensions: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.to_string(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            core_dimensions: core_dimensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a dimension may take part in this module's keys
    pub fn allows(&self, dimension: &str) -> bool {
        dimension != OUTCOME_CLASS_DIM
            && dimension != MODULE_TOKEN
            && self.dimensions.contains(dimension)
    }
}

/// Lookup of module specs by module id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleSpec>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register a module
    pub fn with_module(mut self, spec: ModuleSpec) -> Self {
        self.insert(spec);
        self
    }

    pub fn insert(&mut self, spec: ModuleSpec) {
        self.modules.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, module: &str) -> Option<&ModuleSpec> {
        self.modules.get(module)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Built-in registry for the decision maker ("dm") and position manager ("pm")
    pub fn standard() -> Self {
        Self::new()
            .with_module(ModuleSpec::new(
                "dm",
                [
                    "curator",
                    "chain",
                    "intent_type",
                    "age_bucket",
                    "vol_bucket",
                    MCAP_BUCKET_DIM,
                    TIMEFRAME_DIM,
                    HOLD_TIME_CLASS_DIM,
                    ENTRY_IMPROVEMENT_DIM,
                ],
                ["curator", "chain"],
            ))
            .with_module(ModuleSpec::new(
                "pm",
                [
                    "state",
                    "a_bucket",
                    "action_type",
                    "buyback_flag",
                    "trim_flag",
                    MCAP_BUCKET_DIM,
                    TIMEFRAME_DIM,
                    HOLD_TIME_CLASS_DIM,
                    ENTRY_IMPROVEMENT_DIM,
                    EXIT_IMPROVEMENT_DIM,
                ],
                ["state", "action_type"],
            ))
    }
}
