//! # Environment Configuration
//!
//! One typed struct holding everything the watcher needs, loaded from the
//! process environment (with `.env` support via `dotenvy`). Secrets stay in
//! the environment; everything else has a workable default so a development
//! instance comes up with just `DATABASE_URL` set.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::flagging::{FlagConfig, DEFAULT_LARGE_PUSH_THRESHOLD, DEFAULT_SAMPLING_MODULUS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not present")]
    MissingEnvVar(String),
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: String, value: String },
}

/// Complete runtime configuration for the watcher process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// URL of the upstream events feed.
    pub feed_url: String,
    /// Bearer token for the feed; unauthenticated polling works but is
    /// rate-limited much harder.
    pub github_token: Option<String>,
    /// PostgreSQL connection string for the warnings store.
    pub database_url: String,
    /// Redis connection string for the horizon cursor.
    pub redis_url: String,
    /// Port the gateway listens on.
    pub server_port: u16,
    /// Retention bound of the in-memory event log.
    pub queue_capacity: usize,
    /// Keep-alive granularity for streaming subscribers.
    pub keepalive_tick: Duration,
    /// Commit count threshold for the "large push" rule.
    pub large_push_threshold: u64,
    /// Sampling rule modulus; `None` disables the dummy warnings.
    pub sampling_modulus: Option<u64>,
    /// Chat-completions endpoint for warning analysis.
    pub analysis_api_url: Option<String>,
    /// API key for the analysis endpoint.
    pub analysis_api_key: Option<String>,
    /// Model name sent to the analysis endpoint.
    pub analysis_model: String,
    /// Exact allowed CORS origin; `None` means any origin.
    pub frontend_origins: Option<String>,
}

impl AppConfig {
    /// Loads the configuration from the environment, reading a `.env` file
    /// first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let sampling_modulus = match parsed_var::<u64>("SAMPLING_MODULUS")? {
            Some(0) => None, // 0 switches the dummy-warning rule off
            Some(m) => Some(m),
            None => Some(DEFAULT_SAMPLING_MODULUS),
        };

        Ok(Self {
            feed_url: var_or("FEED_URL", "https://api.github.com/events"),
            github_token: optional_var("GITHUB_TOKEN"),
            database_url: required_var("DATABASE_URL")?,
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            server_port: parsed_var("SERVER_PORT")?.unwrap_or(8080),
            queue_capacity: parsed_var("QUEUE_CAPACITY")?.unwrap_or(10_000),
            keepalive_tick: Duration::from_millis(
                parsed_var("KEEPALIVE_TICK_MS")?.unwrap_or(500),
            ),
            large_push_threshold: parsed_var("LARGE_PUSH_THRESHOLD")?
                .unwrap_or(DEFAULT_LARGE_PUSH_THRESHOLD),
            sampling_modulus,
            analysis_api_url: optional_var("ANALYSIS_API_URL"),
            analysis_api_key: optional_var("ANALYSIS_API_KEY"),
            analysis_model: var_or("ANALYSIS_MODEL", "gpt-4o-mini"),
            frontend_origins: optional_var("FRONTEND_ORIGINS"),
        })
    }

    /// The classifier settings derived from this configuration.
    pub fn flag_config(&self) -> FlagConfig {
        FlagConfig {
            large_push_threshold: self.large_push_threshold,
            sampling_modulus: self.sampling_modulus,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    optional_var(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parsed_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match optional_var(name) {
        None => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::Invalid {
            var: name.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_modulus_zero_disables() {
        // Exercised through the same parsing path from_env uses.
        env::set_var("TEST_SAMPLING_A", "0");
        let parsed = parsed_var::<u64>("TEST_SAMPLING_A").unwrap();
        assert_eq!(parsed, Some(0));
        env::remove_var("TEST_SAMPLING_A");
    }

    #[test]
    fn test_parsed_var_rejects_garbage() {
        env::set_var("TEST_PORT_B", "not-a-port");
        assert!(parsed_var::<u16>("TEST_PORT_B").is_err());
        env::remove_var("TEST_PORT_B");
    }

    #[test]
    fn test_empty_var_treated_as_absent() {
        env::set_var("TEST_EMPTY_C", "");
        assert_eq!(optional_var("TEST_EMPTY_C"), None);
        env::remove_var("TEST_EMPTY_C");
    }
}
