//! Warden CRX - container parsing and archive extraction.
//!
//! A package arrives as a `Cr24` container: a short versioned header followed
//! by a zip archive. This crate:
//!
//! - parses the header ([`ContainerHeader`]) to locate the archive payload
//! - unpacks the payload ([`extract_archive`]) so that no entry can write
//!   outside the output root
//!
//! Signatures are not verified. Callers that care about origin compare the
//! key-derived id against the id they asked for.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod extract;
pub mod header;

pub use error::{CrxError, CrxResult};
pub use extract::{
    ExtractLimits, ExtractReport, SkipReason, SkippedEntry, contained_path, extract_archive,
};
pub use header::{Container, ContainerHeader, MAGIC, VersionFields};
