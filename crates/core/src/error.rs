//! Error types for NMOS conformance checks
//!
//! These are operational failures (a device could not be reached, a document
//! could not be parsed). Conformance findings are never errors: they are
//! collected as structured records in [`crate::validation`].

use thiserror::Error;

/// Result type alias for conformance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while fetching or preparing device state
#[derive(Debug, Error)]
pub enum Error {
    /// Device could not be reached or the request failed in flight
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device answered a read with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A JSON schema could not be compiled
    #[error("Schema error for '{name}': {reason}")]
    Schema {
        /// Registered schema name
        name: String,
        /// Compiler message
        reason: String,
    },

    /// Constraints, staged and active disagree on the number of legs
    #[error("Leg count mismatch: constraints={constraints}, staged={staged}, active={active}")]
    LegCountMismatch {
        /// Legs in the constraints document
        constraints: usize,
        /// Legs in the staged document
        staged: usize,
        /// Legs in the active document
        active: usize,
    },

    /// A fetched document does not have the shape of the expected resource
    #[error("Invalid resource {id}: {reason}")]
    InvalidResource {
        /// Resource id, or "(unknown)" when absent
        id: String,
        /// What was wrong
        reason: String,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl Error {
    /// Build an [`Error::InvalidResource`]
    pub fn invalid_resource(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidResource {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
