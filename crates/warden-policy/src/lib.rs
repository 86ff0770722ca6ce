//! Warden Policy - admission rules for extracted packages.
//!
//! A [`SecurityPolicy`] holds three capability lists (allowed, escalation,
//! blocked), resource ceilings and a CSP template. [`validate`] checks a
//! parsed [`Manifest`](warden_core::Manifest) and the extracted directory
//! against it and returns every problem found, split into blocking
//! [`PolicyViolation`]s and advisory [`PolicyWarning`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use warden_policy::{SecurityPolicy, read_manifest, validate};
//!
//! # fn main() -> Result<(), warden_policy::PolicyError> {
//! let policy = SecurityPolicy::default();
//! let dir = Path::new("/tmp/staging/pkg");
//! let manifest = read_manifest(dir, &policy)?;
//! let result = validate(&manifest, dir, &policy);
//! if !result.valid {
//!     for e in &result.errors {
//!         eprintln!("{e}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod policy;
pub mod scan;
pub mod validate;

pub use error::{PolicyError, PolicyResult};
pub use policy::{
    DEFAULT_CSP_TEMPLATE, PermissionClass, ResourceLimits, SecurityPolicy, is_host_pattern,
};
pub use scan::{PackageStats, scan_package};
pub use validate::{
    ClassifiedPermission, PolicyViolation, PolicyWarning, ValidationResult, read_manifest,
    validate,
};
