//! Warden Registry - installed packages and capability grants.
//!
//! The [`Registry`] is the durable source of truth: one record per package in
//! a [`KvStore`](warden_storage::KvStore) namespace, one directory per package
//! under `~/.warden/packages/`, and an ordered `enabled.json` sidecar. Every
//! mutation holds a per-id lock, so two operations on the same package never
//! interleave while operations on different packages run freely.
//!
//! The [`PermissionBroker`] sits on top and decides which capabilities a
//! package holds. Safe capabilities are granted on request; escalation
//! capabilities wait in a pending table until approved, denied or expired.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(
//! #     registry: std::sync::Arc<warden_registry::Registry>,
//! #     broker: warden_registry::PermissionBroker,
//! #     id: warden_core::PackageId,
//! # ) -> warden_registry::RegistryResult<()> {
//! use warden_registry::CapabilityDecision;
//!
//! registry.enable(&id).await?;
//! match broker.request_capabilities(&id, &["storage".into(), "proxy".into()]).await? {
//!     CapabilityDecision::Granted { .. } => {},
//!     CapabilityDecision::Pending { request_id, .. } => {
//!         broker.resolve_request(request_id, true).await?;
//!     },
//! }
//! assert!(broker.has_capability(&id, "proxy").await);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod broker;
pub mod error;
mod locks;
pub mod record;
pub mod registry;
mod sidecar;

pub use broker::{
    BrokerSettings, CapabilityDecision, PENDING_NAMESPACE, PendingEscalationRequest,
    PermissionBroker, RequestId, Resolution,
};
pub use error::{RegistryError, RegistryResult};
pub use record::{CommitRequest, InstalledPackageRecord, PackageSummary};
pub use registry::{RECORDS_NAMESPACE, Registry};
