//! Error types for container parsing and archive extraction.

use thiserror::Error;

/// Errors raised while reading a container or unpacking its payload.
#[derive(Debug, Error)]
pub enum CrxError {
    /// The first four bytes are not `Cr24`.
    #[error("invalid container magic: expected \"Cr24\"")]
    InvalidMagic,

    /// The format version is neither 2 nor 3.
    #[error("unsupported container format version {0}")]
    UnsupportedVersion(u32),

    /// The header claims a payload offset at or beyond the end of the file.
    #[error("truncated container header: payload offset {offset} is not below file length {length}")]
    TruncatedHeader {
        /// Computed payload offset.
        offset: u64,
        /// Total container length.
        length: u64,
    },

    /// The embedded archive is corrupt or unreadable.
    #[error("archive error: {0}")]
    Archive(String),

    /// The archive exceeds the extraction ceilings.
    #[error("archive exceeds extraction limit: {0}")]
    LimitExceeded(String),

    /// Extraction was cancelled between entries.
    #[error("extraction cancelled")]
    Cancelled,

    /// Filesystem error while writing an entry.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for CrxError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// Result type for container operations.
pub type CrxResult<T> = Result<T, CrxError>;
