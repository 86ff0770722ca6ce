//! Registry and broker error types.

use std::path::PathBuf;

use thiserror::Error;
use warden_core::PackageId;
use warden_storage::StorageError;

use crate::broker::RequestId;

/// Errors raised by the registry and the permission broker.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A record with this id exists and replacement was not requested.
    #[error("package {0} is already installed")]
    AlreadyInstalled(PackageId),

    /// No record with this id.
    #[error("package {0} is not installed")]
    NotFound(PackageId),

    /// The staged extraction to commit does not exist.
    #[error("staged package directory missing: {}", .0.display())]
    MissingStaging(PathBuf),

    /// No pending escalation request with this id.
    #[error("no pending request {0}")]
    RequestNotFound(RequestId),

    /// The pending request outlived its TTL and was dropped.
    #[error("request {0} expired; request the capabilities again")]
    RequestExpired(RequestId),

    /// The package was uninstalled or reinstalled after the request was made.
    #[error("request {0} predates the current installation of its package")]
    RequestSuperseded(RequestId),

    /// The broker refuses to grant a capability the policy does not admit.
    #[error("capability {0} is not grantable")]
    NotGrantable(String),

    /// A string that is not a request id.
    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    /// Record store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("internal registry error: {0}")]
    Internal(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
