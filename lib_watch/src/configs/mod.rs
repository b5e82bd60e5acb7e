//! # Runtime Configuration
//!
//! Environment-backed settings for the binaries.

pub mod config_env;

pub use config_env::{AppConfig, ConfigError};
