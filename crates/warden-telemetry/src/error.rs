//! Telemetry error types.

use thiserror::Error;

/// Errors raised while configuring logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A filter directive (or the base level) could not be parsed.
    #[error("invalid log directive '{directive}': {message}")]
    InvalidDirective {
        /// The directive as written.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// Unknown log format name.
    #[error("unknown log format '{0}' (expected pretty, compact, json or full)")]
    UnknownFormat(String),

    /// A global subscriber was already installed, or installation failed.
    #[error("initialization error: {0}")]
    InitError(String),

    /// IO error (log directory creation).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
