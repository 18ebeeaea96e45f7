//! Error types for the pagetap probe.
//!
//! Failures never reach the instrumented page: interceptors swallow them and
//! report through [`EventSink::dropped`](crate::reporter::EventSink::dropped).
//! [`ProbeError`] is for the host setting the probe up, where configuration
//! and client construction can fail.

use thiserror::Error;

use crate::config::ConfigError;
use crate::reporter::ReportError;

/// Errors that can occur while setting up or driving the probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Event reporting error.
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// The host environment lacks something the probe needs.
    #[error("host error: {0}")]
    Host(String),
}

/// A specialized `Result` type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
