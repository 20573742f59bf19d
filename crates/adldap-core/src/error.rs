//! Error types for directory operations.
//!
//! Every failure inside the OU engine is surfaced as one of these variants. Nothing in the
//! workspace terminates the process on error; callers decide how to report.

use thiserror::Error;

/// Main error type for organizational unit management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The distinguished name lies outside the authorized search base
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// The entry to create is already present
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A required ancestor is absent and parent creation is disabled
    #[error("Missing parent: {0}")]
    MissingParent(String),

    /// The directory returned an impossible result multiplicity
    #[error("Inconsistent directory state: {0}")]
    Inconsistency(String),

    /// Connection, bind or protocol-level failure reported by the directory
    #[error("Directory {operation} failed: {message}")]
    Transport {
        /// Protocol operation that failed (`connect`, `bind`, `search`, ...)
        operation: String,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a [`Error::Transport`] for the given protocol operation.
    #[must_use]
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PolicyViolation(_) => "POLICY_VIOLATION",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::MissingParent(_) => "MISSING_PARENT",
            Self::Inconsistency(_) => "INCONSISTENCY",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Inconsistency(_) | Self::ConfigError(_) | Self::Transport { .. }
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
