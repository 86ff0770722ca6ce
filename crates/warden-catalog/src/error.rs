//! Catalog error types.

use thiserror::Error;

/// Errors raised by the catalog client.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The input is neither a catalog URL nor a bare package id.
    #[error("not a catalog URL or package id: {0}")]
    InvalidIdentifier(String),

    /// A configured endpoint is not a valid URL.
    #[error("invalid catalog endpoint {url}: {message}")]
    InvalidEndpoint {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },

    /// Connection or protocol failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("catalog returned HTTP {status} for {url}")]
    Status {
        /// Status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The request did not finish in time.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// `"metadata fetch"` or `"download"`.
        operation: &'static str,
        /// Configured timeout.
        secs: u64,
    },

    /// The download is larger than the package ceiling.
    #[error("download is {size} bytes, maximum is {limit}")]
    TooLarge {
        /// Declared or observed size.
        size: u64,
        /// Ceiling.
        limit: u64,
    },

    /// Filesystem error while writing the download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether retrying the same request might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
