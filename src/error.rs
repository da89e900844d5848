//! Error types for the gesture engine.
//!
//! Only conditions the core genuinely cannot recover from are errors.
//! Malformed samples and out-of-range configuration values are handled in
//! place (dropped or normalized) and never surface here.

use thiserror::Error;

/// Errors that prevent the engine from starting or running.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host offers no magnetometer of any fidelity.
    #[error("no magnetometer available (tried uncalibrated and calibrated)")]
    SensorUnavailable,

    /// Configuration could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The event channel feeding the runtime was closed by every sender.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Errors that can occur while loading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for [`crate::config::EngineConfig`].
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
