//! Policy error types.

use thiserror::Error;

/// Errors raised before a manifest can be validated.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// `manifest.json` is absent from the package root.
    #[error("manifest.json not found in package root")]
    MissingManifest,

    /// `manifest.json` exceeds the configured ceiling.
    #[error("manifest.json is {bytes} bytes, maximum is {limit}")]
    ManifestTooLarge {
        /// Actual size.
        bytes: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// `manifest.json` is not a JSON object.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Filesystem error while reading the package.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
