//! Warden Core - shared types for the package admission pipeline.
//!
//! This crate provides:
//! - [`PackageId`]: the 32-character catalog identifier
//! - [`Manifest`]: the untrusted package manifest, parsed into a typed form
//!   where every field carries an explicit presence flag ([`Field`])
//! - [`PackageMetadata`]: cosmetic catalog information with fallbacks
//! - [`Provenance`]: where an installed package came from
//! - [`WardenHome`](dirs::WardenHome): on-disk layout of `~/.warden/`
//!
//! Nothing here touches the network. The only filesystem access is the
//! manifest loader and directory scaffolding.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod dirs;
pub mod error;
pub mod id;
pub mod manifest;
pub mod metadata;
pub mod provenance;

pub use error::{CoreError, CoreResult};
pub use id::PackageId;
pub use manifest::{
    Background, ContentScript, Field, MANIFEST_FILE_NAME, Manifest, WebAccessibleResource,
};
pub use metadata::PackageMetadata;
pub use provenance::Provenance;
