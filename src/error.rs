//! PulseChat error types.
//!
//! # Error Classification
//!
//! Errors only exist at the edges of the crate:
//!
//! - **Construction**: invalid configuration, HTTP client setup
//! - **Persistence**: reading or writing a key-set file
//!
//! The dialogue and learning paths never return these. A failed generation
//! degrades to an empty string, a rejected candidate is dropped, and a failed
//! refinement is requeued, so the periodic tasks cannot be stopped by a
//! single bad request.

use thiserror::Error;

/// PulseChat errors.
#[derive(Error, Debug)]
pub enum PulseError {
    /// Configuration could not be read or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Text-generation gateway could not be constructed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Persistent key-set store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PulseChat operations
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<reqwest::Error> for PulseError {
    fn from(err: reqwest::Error) -> Self {
        PulseError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for PulseError {
    fn from(err: toml::de::Error) -> Self {
        PulseError::Config(err.to_string())
    }
}
