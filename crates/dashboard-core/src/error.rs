//! Error types for dashboard data operations.
//!
//! This module defines [`DashError`] which covers every failure that can occur
//! when talking to the backend, decoding its responses, or reading configuration.
//! The error is `Clone` so a single in-flight fetch can hand the same failure to
//! every caller waiting on it.

use thiserror::Error;

/// Errors that can occur during dashboard data operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashError {
    /// The request never reached the server or the response never arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered HTTP 401.
    #[error("Unauthorized")]
    Unauthorized,

    /// The backend answered with a non-2xx status other than 401, or with a
    /// `{ "success": false }` envelope.
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code of the response.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DashError {
    /// Returns the HTTP status associated with this error, if any.
    ///
    /// Network failures have no status.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if this is an [`DashError::Unauthorized`] error.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Result type alias using [`DashError`].
pub type Result<T> = std::result::Result<T, DashError>;
