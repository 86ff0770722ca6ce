//! Core error types.

/// Errors from core type construction and manifest parsing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The package identifier is malformed.
    #[error("invalid package id: {0}")]
    InvalidId(String),

    /// The manifest is not valid JSON.
    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    /// The manifest parsed but its top level is not a JSON object.
    #[error("manifest must be a JSON object, found {found}")]
    ManifestNotObject {
        /// JSON type actually found.
        found: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
