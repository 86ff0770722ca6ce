//! Warden Catalog - the remote package catalog.
//!
//! - [`resolve_identifier`] turns a catalog URL or bare id into a
//!   [`PackageId`](warden_core::PackageId)
//! - [`CatalogClient::fetch_metadata`] scrapes display metadata, degrading to
//!   fallback values on any failure
//! - [`CatalogClient::fetch_package`] streams the package container to disk
//!
//! Metadata is cosmetic. Nothing in this crate's metadata path can fail an
//! install; the download path can.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod error;
pub mod metadata;
pub mod popular;
pub mod resolve;
pub mod settings;

pub use client::{CatalogClient, Download, DownloadProgress, PACKAGE_CONTENT_TYPE};
pub use error::{CatalogError, CatalogResult};
pub use metadata::{MetadataSource, OfflineMetadata, parse_metadata};
pub use popular::{PopularPackage, popular_packages};
pub use resolve::{is_catalog_url, resolve_identifier};
pub use settings::CatalogSettings;
