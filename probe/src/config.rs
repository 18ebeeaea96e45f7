//! Configuration module for the pagetap probe.
//!
//! Native hosts read the configuration from environment variables. Builds for
//! the browser have no environment at runtime, so the same variables are read
//! at compile time instead (see [`Config::embedded`]).
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PAGETAP_COLLECTOR_URL` | Yes | - | Collector base URL (e.g., `http://localhost:3333`) |
//! | `PAGETAP_MARKER_NAME` | No | `__PAGETAP_INSTALLED__` | Page-global installation flag |
//!
//! # Example
//!
//! ```no_run
//! use pagetap_probe::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Collector endpoint: {}", config.endpoint());
//! ```

use std::env;

use reqwest::Url;
use thiserror::Error;

/// Environment variable holding the collector base URL.
pub const COLLECTOR_URL_VAR: &str = "PAGETAP_COLLECTOR_URL";

/// Environment variable holding the installation marker name.
pub const MARKER_NAME_VAR: &str = "PAGETAP_MARKER_NAME";

/// Default name of the page-global installation flag.
pub const DEFAULT_MARKER_NAME: &str = "__PAGETAP_INSTALLED__";

/// Collector used by browser builds when none was supplied at build time.
pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:3333";

/// Path appended to the collector base URL for event ingestion.
const LOG_PATH: &str = "/log";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Collector base URL without a trailing slash.
    pub collector_url: String,

    /// Name of the page-global property used as the installation marker.
    pub marker_name: String,
}

impl Config {
    /// Creates a configuration from explicit values, validating both.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the collector URL is not an
    /// absolute `http`/`https` URL or the marker name is empty or contains
    /// whitespace.
    pub fn new(collector_url: &str, marker_name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            collector_url: parse_collector_url(collector_url)?,
            marker_name: parse_marker_name(marker_name)?,
        })
    }

    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `PAGETAP_COLLECTOR_URL` is not set or is not an `http`/`https` URL
    /// - `PAGETAP_MARKER_NAME` is set but empty or contains whitespace
    pub fn from_env() -> Result<Self, ConfigError> {
        let collector_url = env::var(COLLECTOR_URL_VAR)
            .map_err(|_| ConfigError::MissingEnvVar(COLLECTOR_URL_VAR.to_string()))?;

        let marker_name =
            env::var(MARKER_NAME_VAR).unwrap_or_else(|_| DEFAULT_MARKER_NAME.to_string());

        Self::new(&collector_url, &marker_name)
    }

    /// Creates the configuration baked in at compile time.
    ///
    /// This is how the collector URL reaches a probe running inside a page:
    /// the value is substituted when the probe is built, not read at runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the baked-in values are invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::new(
            option_env!("PAGETAP_COLLECTOR_URL").unwrap_or(DEFAULT_COLLECTOR_URL),
            option_env!("PAGETAP_MARKER_NAME").unwrap_or(DEFAULT_MARKER_NAME),
        )
    }

    /// Returns the full URL events are posted to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}{LOG_PATH}", self.collector_url)
    }
}

fn parse_collector_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: COLLECTOR_URL_VAR.to_string(),
        message,
    };

    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| invalid(format!("{e}: '{trimmed}'")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("expected http or https scheme, got '{other}'"))),
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

fn parse_marker_name(raw: &str) -> Result<String, ConfigError> {
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            key: MARKER_NAME_VAR.to_string(),
            message: format!("expected a non-empty name without whitespace, got '{raw}'"),
        });
    }
    Ok(raw.to_string())
}
