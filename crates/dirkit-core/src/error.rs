//! Error types for directory operations.
//!
//! Every fallible operation in the workspace returns [`Error`]. The taxonomy is closed on
//! purpose so callers can tell bad input from an unreachable directory from a missing entry
//! without re-deriving it from context.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required input was missing, empty or malformed. Never sent to the directory.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The addressed entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The directory connection failed or the server rejected the operation.
    #[error("Directory connection fault during {operation}: {message}")]
    ConnectionFault {
        /// Operation that was being performed (`search`, `modify`, ...).
        operation: String,
        /// Error message reported by the transport or server.
        message: String,
    },

    /// Range retrieval did not terminate within the configured number of windows.
    #[error("Range retrieval of `{attribute}` exceeded {windows} windows")]
    PaginationExceeded {
        /// Attribute being paged.
        attribute: String,
        /// Number of windows requested before giving up.
        windows: usize,
    },

    /// Operation timed out.
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A multi-step rename could neither complete nor be rolled back.
    #[error("Rename left entry at `{path}` incomplete: {message}")]
    RenameIncomplete {
        /// Path the entry currently lives at.
        path: String,
        /// Description of the step that failed.
        message: String,
    },
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a [`Error::ConnectionFault`] for the given operation.
    #[must_use]
    pub fn connection(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFault {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConnectionFault { .. } => "CONNECTION_FAULT",
            Self::PaginationExceeded { .. } => "PAGINATION_EXCEEDED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::RenameIncomplete { .. } => "RENAME_INCOMPLETE",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFault { .. }
                | Self::ConfigError(_)
                | Self::PaginationExceeded { .. }
                | Self::RenameIncomplete { .. }
        )
    }

    /// Returns true if the error only says the entry is missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidInput(format!("invalid GUID: {err}"))
    }
}
