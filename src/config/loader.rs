//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/edge.toml structure.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::snapshot::DEFAULT_SNAPSHOT_FILE;
use crate::application::{EngineConfig, DEFAULT_MAX_UPDATE_RETRIES};
use crate::domain::context::{MODULE_TOKEN, OUTCOME_CLASS_DIM};
use crate::domain::pattern_key::KEY_SEPARATOR;
use crate::domain::scoring::{DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_RECURRENCE_TAU_DAYS};
use crate::domain::{ModuleRegistry, ModuleSpec, ScoringParams, DEFAULT_MAX_ARITY};

/// Environment override for `storage.data_dir`
pub const DATA_DIR_ENV: &str = "BUTTERS_EDGE_DATA_DIR";
/// Environment override for `price_history.bars_dir`
pub const BARS_DIR_ENV: &str = "BUTTERS_EDGE_BARS_DIR";

/// Largest arity accepted; key count grows combinatorially beyond this
const MAX_ALLOWED_ARITY: usize = 6;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure matching config/edge.toml
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub price_history: PriceHistorySection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Per-module whitelists; the built-in dm/pm registry when empty
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSection>,
}

/// Engine configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Largest dimension combination enumerated per context
    #[serde(default = "default_max_arity")]
    pub max_arity: usize,
    /// Sample count at which the edge small-sample penalty disappears
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    /// Recurrence decay constant in days
    #[serde(default = "default_recurrence_tau_days")]
    pub recurrence_tau_days: f64,
    /// Compare-and-swap attempts per pattern update before giving up
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,
}

fn default_max_arity() -> usize {
    DEFAULT_MAX_ARITY
}

fn default_min_sample_size() -> u64 {
    DEFAULT_MIN_SAMPLE_SIZE
}

fn default_recurrence_tau_days() -> f64 {
    DEFAULT_RECURRENCE_TAU_DAYS
}

fn default_max_update_retries() -> u32 {
    DEFAULT_MAX_UPDATE_RETRIES
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_arity: default_max_arity(),
            min_sample_size: default_min_sample_size(),
            recurrence_tau_days: default_recurrence_tau_days(),
            max_update_retries: default_max_update_retries(),
        }
    }
}

/// Price history configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct PriceHistorySection {
    /// Directory of `<instrument>_<timeframe>.json` bar files
    #[serde(default = "default_bars_dir")]
    pub bars_dir: String,
    /// Query timeout before falling back to hold time
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bars_dir() -> String {
    "data/bars".to_string()
}

fn default_timeout_ms() -> u64 {
    2_000
}

impl Default for PriceHistorySection {
    fn default() -> Self {
        Self {
            bars_dir: default_bars_dir(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PriceHistorySection {
    /// Get bars directory with environment variable override.
    /// Checks BUTTERS_EDGE_BARS_DIR first, then falls back to config value.
    pub fn get_bars_dir(&self) -> PathBuf {
        let raw = std::env::var(BARS_DIR_ENV).unwrap_or_else(|_| self.bars_dir.clone());
        PathBuf::from(shellexpand::tilde(&raw).to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Directory holding the store snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_snapshot_file() -> String {
    DEFAULT_SNAPSHOT_FILE.to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl StorageSection {
    /// Get data directory with environment variable override.
    /// Checks BUTTERS_EDGE_DATA_DIR first, then falls back to config value.
    pub fn get_data_dir(&self) -> PathBuf {
        let raw = std::env::var(DATA_DIR_ENV).unwrap_or_else(|_| self.data_dir.clone());
        PathBuf::from(shellexpand::tilde(&raw).to_string())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.get_data_dir().join(&self.snapshot_file)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One module's whitelist
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSection {
    /// Dimensions allowed in this module's pattern keys
    pub dimensions: Vec<String>,
    /// Family-defining dimensions (subset of `dimensions`)
    #[serde(default)]
    pub core_dimensions: Vec<String>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, using defaults when the file does not exist
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate engine section
        if self.engine.max_arity == 0 || self.engine.max_arity > MAX_ALLOWED_ARITY {
            return Err(ConfigError::ValidationError(format!(
                "max_arity must be 1-{}, got {}",
                MAX_ALLOWED_ARITY, self.engine.max_arity
            )));
        }

        if self.engine.min_sample_size == 0 {
            return Err(ConfigError::ValidationError(
                "min_sample_size must be > 0".to_string(),
            ));
        }

        if !self.engine.recurrence_tau_days.is_finite() || self.engine.recurrence_tau_days <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "recurrence_tau_days must be > 0, got {}",
                self.engine.recurrence_tau_days
            )));
        }

        if self.engine.max_update_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_update_retries must be > 0".to_string(),
            ));
        }

        // Validate price history section
        if self.price_history.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "price_history.timeout_ms must be > 0".to_string(),
            ));
        }

        // Validate storage section
        if self.storage.snapshot_file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.snapshot_file must not be empty".to_string(),
            ));
        }

        // Validate logging section
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.logging.level
            )));
        }

        // Validate modules
        for (name, module) in &self.modules {
            validate_name(&format!("module '{}'", name), name)?;
            if module.dimensions.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "module '{}' must whitelist at least one dimension",
                    name
                )));
            }
            for dimension in &module.dimensions {
                validate_name(&format!("dimension '{}' of module '{}'", dimension, name), dimension)?;
                if dimension == OUTCOME_CLASS_DIM || dimension == MODULE_TOKEN {
                    return Err(ConfigError::ValidationError(format!(
                        "module '{}' cannot whitelist reserved dimension '{}'",
                        name, dimension
                    )));
                }
            }
            if let Some(missing) = module
                .core_dimensions
                .iter()
                .find(|core| !module.dimensions.contains(core))
            {
                return Err(ConfigError::ValidationError(format!(
                    "core dimension '{}' of module '{}' is not whitelisted",
                    missing, name
                )));
            }
        }

        Ok(())
    }

    /// Module registry from `[modules.*]`, or the built-in one
    pub fn module_registry(&self) -> ModuleRegistry {
        if self.modules.is_empty() {
            return ModuleRegistry::standard();
        }
        self.modules
            .iter()
            .fold(ModuleRegistry::new(), |registry, (name, module)| {
                registry.with_module(ModuleSpec::new(
                    name,
                    module.dimensions.iter().cloned(),
                    module.core_dimensions.iter().cloned(),
                ))
            })
    }
}

fn validate_name(what: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains(KEY_SEPARATOR) || name.contains('=') {
        return Err(ConfigError::ValidationError(format!(
            "{} must be non-empty and contain neither '{}' nor '='",
            what, KEY_SEPARATOR
        )));
    }
    Ok(())
}

// Conversion from Config to EngineConfig
impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        EngineConfig {
            max_arity: config.engine.max_arity,
            scoring: ScoringParams {
                min_sample_size: config.engine.min_sample_size,
                recurrence_tau_days: config.engine.recurrence_tau_days,
            },
            max_update_retries: config.engine.max_update_retries,
            price_timeout: config.price_history.timeout(),
            modules: config.module_registry(),
        }
    }
}
