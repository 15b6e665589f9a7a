//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Config, ConfigError, load_config, load_config_or_default, BARS_DIR_ENV, DATA_DIR_ENV,
};
