//! Warden Installer - the admission pipeline.
//!
//! [`Installer::install`] takes a catalog URL or bare id through every stage:
//! resolve, download, parse the container, extract the archive, validate
//! against policy, commit to the registry, and request capabilities from the
//! broker. [`Installer::install_local`] does the same for an unpacked
//! directory or a container file on disk.
//!
//! Failures are reported as [`InstallError`], which always names the
//! [`InstallStage`] that raised it. Scratch state lives in a temporary
//! directory that is removed on every exit path, cancellation included.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
mod local;
pub mod pipeline;

pub use error::{InstallError, InstallResult, InstallStage};
pub use pipeline::{InstallEvent, InstallOptions, InstallOutcome, Installer};
pub use warden_crx::ExtractLimits;
