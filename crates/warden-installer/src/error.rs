//! Install errors, tagged with the pipeline stage that raised them.

use std::fmt;

use thiserror::Error;
use warden_catalog::CatalogError;
use warden_crx::CrxError;
use warden_policy::PolicyError;
use warden_registry::RegistryError;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallStage {
    /// Turning user input into a package id.
    Resolve,
    /// Fetching the container.
    Download,
    /// Reading the container header.
    Parse,
    /// Unpacking the embedded archive.
    Extract,
    /// Checking the manifest and files against policy.
    Validate,
    /// Moving the package into the registry.
    Commit,
    /// Asking the broker for the requested capabilities.
    Grant,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Download => "download",
            Self::Parse => "parse",
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::Commit => "commit",
            Self::Grant => "grant",
        })
    }
}

/// Why an install failed. Every variant names its stage.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The input does not name a package.
    #[error("{stage}: invalid input: {message}")]
    Input {
        /// Failing stage.
        stage: InstallStage,
        /// Detail.
        message: String,
    },

    /// Transport failure, timeout or bad status.
    #[error("{stage}: network error: {message}")]
    Network {
        /// Failing stage.
        stage: InstallStage,
        /// Detail.
        message: String,
        /// Whether trying again may succeed.
        retryable: bool,
    },

    /// The container, archive or manifest is malformed.
    #[error("{stage}: malformed package: {message}")]
    Format {
        /// Failing stage.
        stage: InstallStage,
        /// Detail.
        message: String,
    },

    /// The package breaks the security policy.
    #[error("{stage}: rejected by policy: {}", errors.join("; "))]
    Policy {
        /// Failing stage.
        stage: InstallStage,
        /// Every violation found.
        errors: Vec<String>,
    },

    /// Local state prevented the install (already installed, disk, store).
    #[error("{stage}: {message}")]
    State {
        /// Failing stage.
        stage: InstallStage,
        /// Detail.
        message: String,
    },

    /// The caller cancelled the install.
    #[error("{stage}: cancelled")]
    Cancelled {
        /// Stage that observed the cancellation.
        stage: InstallStage,
    },
}

impl InstallError {
    /// Stage that raised the error.
    #[must_use]
    pub fn stage(&self) -> InstallStage {
        match self {
            Self::Input { stage, .. }
            | Self::Network { stage, .. }
            | Self::Format { stage, .. }
            | Self::Policy { stage, .. }
            | Self::State { stage, .. }
            | Self::Cancelled { stage } => *stage,
        }
    }

    pub(crate) fn state(stage: InstallStage, message: impl fmt::Display) -> Self {
        Self::State {
            stage,
            message: message.to_string(),
        }
    }

    pub(crate) fn catalog(stage: InstallStage, err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidIdentifier(_) | CatalogError::InvalidEndpoint { .. } => {
                Self::Input {
                    stage,
                    message: err.to_string(),
                }
            },
            CatalogError::Io(e) => Self::state(stage, e),
            other => Self::Network {
                stage,
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn crx(stage: InstallStage, err: CrxError) -> Self {
        match err {
            CrxError::Cancelled => Self::Cancelled { stage },
            CrxError::Io(e) => Self::state(stage, e),
            other => Self::Format {
                stage,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn policy(err: PolicyError) -> Self {
        let stage = InstallStage::Validate;
        match err {
            PolicyError::ManifestTooLarge { .. } => Self::Policy {
                stage,
                errors: vec![err.to_string()],
            },
            PolicyError::Io(e) => Self::state(stage, e),
            other => Self::Format {
                stage,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn registry(stage: InstallStage, err: RegistryError) -> Self {
        match err {
            RegistryError::NotGrantable(capability) => Self::Policy {
                stage,
                errors: vec![format!("capability {capability} is not grantable")],
            },
            RegistryError::AlreadyInstalled(id) => Self::state(
                stage,
                format!("package {id} is already installed; pass replace to overwrite it"),
            ),
            other => Self::state(stage, other),
        }
    }
}

/// Result type for install operations.
pub type InstallResult<T> = Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_message() {
        let err = InstallError::Policy {
            stage: InstallStage::Validate,
            errors: vec!["blocked permission: usb".into(), "too many files".into()],
        };
        assert_eq!(
            err.to_string(),
            "validate: rejected by policy: blocked permission: usb; too many files"
        );
        assert_eq!(err.stage(), InstallStage::Validate);
    }

    #[test]
    fn crx_errors_map_by_kind() {
        assert!(matches!(
            InstallError::crx(InstallStage::Parse, CrxError::InvalidMagic),
            InstallError::Format {
                stage: InstallStage::Parse,
                ..
            }
        ));
        assert!(matches!(
            InstallError::crx(InstallStage::Extract, CrxError::Cancelled),
            InstallError::Cancelled {
                stage: InstallStage::Extract
            }
        ));
    }

    #[test]
    fn catalog_errors_keep_retryability() {
        let err = InstallError::catalog(
            InstallStage::Download,
            CatalogError::Status {
                status: 503,
                url: "https://example.test".into(),
            },
        );
        assert!(matches!(err, InstallError::Network { retryable: true, .. }));

        let err = InstallError::catalog(
            InstallStage::Download,
            CatalogError::Status {
                status: 404,
                url: "https://example.test".into(),
            },
        );
        assert!(matches!(err, InstallError::Network { retryable: false, .. }));
    }

    #[test]
    fn oversized_manifest_is_a_policy_error() {
        let err = InstallError::policy(PolicyError::ManifestTooLarge {
            bytes: 10,
            limit: 1,
        });
        assert!(matches!(err, InstallError::Policy { .. }));
        assert!(matches!(
            InstallError::policy(PolicyError::MissingManifest),
            InstallError::Format { .. }
        ));
    }

    #[test]
    fn stages_are_ordered() {
        assert!(InstallStage::Resolve < InstallStage::Download);
        assert!(InstallStage::Commit < InstallStage::Grant);
    }
}
