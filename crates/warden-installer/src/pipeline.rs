//! The install pipeline.
//!
//! resolve → download → parse → extract → validate → commit → grant
//!
//! Every install works inside a fresh `TempDir` under `~/.warden/tmp/`.
//! Whatever happens (error, cancellation, the future being dropped) that
//! directory goes away with it; only a successful commit moves the staged
//! package out of it first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_catalog::{CatalogClient, DownloadProgress, MetadataSource, resolve_identifier};
use warden_core::dirs::WardenHome;
use warden_core::{PackageId, PackageMetadata, Provenance};
use warden_crx::{Container, ExtractLimits, extract_archive};
use warden_policy::{SecurityPolicy, read_manifest, validate};
use warden_registry::{
    CapabilityDecision, CommitRequest, InstalledPackageRecord, PermissionBroker, Registry,
    RegistryError,
};

use crate::error::{InstallError, InstallResult, InstallStage};
use crate::local::{copy_package_dir, ensure_outside_home, local_package_id};

const CONTAINER_FILE_NAME: &str = "package.crx";
const STAGED_DIR_NAME: &str = "package";
const UNVERIFIED_SIGNATURE: &str = "container signature was not verified";

/// Install behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Overwrite an existing installation of the same id.
    pub replace: bool,
}

/// Progress notifications. Purely advisory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstallEvent {
    /// A stage is starting.
    Stage(InstallStage),
    /// Bytes arrived during the download stage.
    Download(DownloadProgress),
}

/// A successful install.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// The committed record, with grants applied.
    pub record: InstalledPackageRecord,
    /// What the broker granted and what awaits approval.
    pub decision: CapabilityDecision,
    /// Non-fatal findings from every stage.
    pub warnings: Vec<String>,
}

/// Drives packages through the pipeline into the registry.
pub struct Installer {
    home: WardenHome,
    catalog: CatalogClient,
    metadata: Arc<dyn MetadataSource>,
    policy: Arc<SecurityPolicy>,
    registry: Arc<Registry>,
    broker: Arc<PermissionBroker>,
    limits: ExtractLimits,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("home", &self.home.root())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Create an installer. Metadata is scraped with `catalog`.
    #[must_use]
    pub fn new(
        home: WardenHome,
        catalog: CatalogClient,
        policy: Arc<SecurityPolicy>,
        registry: Arc<Registry>,
        broker: Arc<PermissionBroker>,
    ) -> Self {
        Self {
            home,
            metadata: Arc::new(catalog.clone()),
            catalog,
            policy,
            registry,
            broker,
            limits: ExtractLimits::default(),
        }
    }

    /// Use `source` for display metadata instead of the catalog.
    #[must_use]
    pub fn with_metadata_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.metadata = source;
        self
    }

    /// Override the archive extraction limits.
    #[must_use]
    pub fn with_extract_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The registry packages are committed to.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The broker capabilities are requested from.
    #[must_use]
    pub fn broker(&self) -> &Arc<PermissionBroker> {
        &self.broker
    }

    /// Install from the catalog. `input` is a catalog URL or a bare id.
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] naming the stage that failed. Nothing is
    /// left on disk or in the registry unless the commit stage succeeded.
    pub async fn install<F>(
        &self,
        input: &str,
        options: InstallOptions,
        mut on_event: F,
        cancel: &CancellationToken,
    ) -> InstallResult<InstallOutcome>
    where
        F: FnMut(InstallEvent) + Send,
    {
        on_event(InstallEvent::Stage(InstallStage::Resolve));
        let id = resolve_identifier(input)
            .map_err(|e| InstallError::catalog(InstallStage::Resolve, e))?;
        self.check_installable(&id, options, InstallStage::Resolve)
            .await?;
        info!(package_id = %id, "Installing package");

        let workdir = self.workdir(InstallStage::Resolve)?;
        let metadata = tokio::select! {
            () = cancel.cancelled() => return Err(InstallError::Cancelled { stage: InstallStage::Resolve }),
            metadata = self.metadata.metadata(&id) => metadata,
        };

        on_event(InstallEvent::Stage(InstallStage::Download));
        let crx_path = workdir.path().join(CONTAINER_FILE_NAME);
        let download = tokio::select! {
            () = cancel.cancelled() => return Err(InstallError::Cancelled { stage: InstallStage::Download }),
            result = self.catalog.fetch_package(&id, &crx_path, |p| on_event(InstallEvent::Download(p))) => {
                result.map_err(|e| InstallError::catalog(InstallStage::Download, e))?
            },
        };
        let mut warnings = download.warnings;

        on_event(InstallEvent::Stage(InstallStage::Parse));
        let container = read_container(crx_path).await?;
        if let Some(key) = container.public_key() {
            let derived = PackageId::from_public_key(key);
            if derived != id {
                warn!(package_id = %id, key_id = %derived, "Container key does not match package id");
                warnings.push(format!(
                    "container key belongs to {derived}, not {id}"
                ));
            }
        }
        warnings.push(UNVERIFIED_SIGNATURE.to_owned());

        on_event(InstallEvent::Stage(InstallStage::Extract));
        let staged = workdir.path().join(STAGED_DIR_NAME);
        warnings.extend(self.extract(container, staged.clone(), cancel).await?);

        let provenance = Provenance::Catalog {
            source: input.trim().to_owned(),
        };
        let outcome = self
            .admit(
                id,
                &staged,
                provenance,
                Some(metadata),
                options,
                warnings,
                &mut on_event,
                cancel,
            )
            .await;
        drop(workdir);
        outcome
    }

    /// Install an unpacked directory or a local container file.
    ///
    /// A container with a public key takes its id from the key; anything
    /// else gets an id derived from the manifest name and the canonical
    /// source path.
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] naming the stage that failed.
    pub async fn install_local<F>(
        &self,
        source: &Path,
        options: InstallOptions,
        mut on_event: F,
        cancel: &CancellationToken,
    ) -> InstallResult<InstallOutcome>
    where
        F: FnMut(InstallEvent) + Send,
    {
        on_event(InstallEvent::Stage(InstallStage::Resolve));
        let canonical = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| InstallError::Input {
                stage: InstallStage::Resolve,
                message: format!("{}: {e}", source.display()),
            })?;
        let file_type = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| InstallError::state(InstallStage::Resolve, e))?
            .file_type();

        let workdir = self.workdir(InstallStage::Resolve)?;
        let staged = workdir.path().join(STAGED_DIR_NAME);
        let mut warnings = Vec::new();

        let key_id = if file_type.is_dir() {
            on_event(InstallEvent::Stage(InstallStage::Extract));
            let (src, dst) = (canonical.clone(), staged.clone());
            let home = self.home.root().to_path_buf();
            run_blocking(InstallStage::Extract, move || {
                ensure_outside_home(&src, &home)
                    .and_then(|()| copy_package_dir(&src, &dst))
                    .map_err(|e| match e.kind() {
                        std::io::ErrorKind::InvalidInput => InstallError::Input {
                            stage: InstallStage::Extract,
                            message: e.to_string(),
                        },
                        _ => InstallError::state(InstallStage::Extract, e),
                    })
            })
            .await?;
            None
        } else if file_type.is_file() {
            on_event(InstallEvent::Stage(InstallStage::Parse));
            let container = read_container(canonical.clone()).await?;
            let key_id = container.public_key().map(PackageId::from_public_key);
            warnings.push(UNVERIFIED_SIGNATURE.to_owned());

            on_event(InstallEvent::Stage(InstallStage::Extract));
            warnings.extend(self.extract(container, staged.clone(), cancel).await?);
            key_id
        } else {
            return Err(InstallError::Input {
                stage: InstallStage::Resolve,
                message: format!(
                    "{} is neither a directory nor a package file",
                    source.display()
                ),
            });
        };

        let id = match key_id {
            Some(id) => id,
            None => {
                let (dir, policy) = (staged.clone(), Arc::clone(&self.policy));
                let manifest = run_blocking(InstallStage::Validate, move || {
                    read_manifest(&dir, &policy).map_err(InstallError::policy)
                })
                .await?;
                local_package_id(manifest.display_name(), &canonical)
            },
        };
        self.check_installable(&id, options, InstallStage::Resolve)
            .await?;
        debug!(package_id = %id, source = %canonical.display(), "Installing local package");

        let provenance = Provenance::Local {
            source_path: canonical,
        };
        let outcome = self
            .admit(
                id,
                &staged,
                provenance,
                None,
                options,
                warnings,
                &mut on_event,
                cancel,
            )
            .await;
        drop(workdir);
        outcome
    }

    /// Validate, commit and grant. Shared tail of both install paths.
    #[allow(clippy::too_many_arguments)]
    async fn admit<F>(
        &self,
        id: PackageId,
        staged: &Path,
        provenance: Provenance,
        metadata: Option<PackageMetadata>,
        options: InstallOptions,
        mut warnings: Vec<String>,
        on_event: &mut F,
        cancel: &CancellationToken,
    ) -> InstallResult<InstallOutcome>
    where
        F: FnMut(InstallEvent) + Send,
    {
        on_event(InstallEvent::Stage(InstallStage::Validate));
        check_cancelled(cancel, InstallStage::Validate)?;
        let (dir, policy) = (staged.to_path_buf(), Arc::clone(&self.policy));
        let (manifest, validation) = run_blocking(InstallStage::Validate, move || {
            let manifest = read_manifest(&dir, &policy).map_err(InstallError::policy)?;
            let result = validate(&manifest, &dir, &policy);
            Ok((manifest, result))
        })
        .await?;

        if !validation.valid {
            let errors = validation.error_messages();
            warn!(package_id = %id, errors = ?errors, "Package rejected by policy");
            return Err(InstallError::Policy {
                stage: InstallStage::Validate,
                errors,
            });
        }
        warnings.extend(validation.warning_messages());
        check_cancelled(cancel, InstallStage::Validate)?;

        on_event(InstallEvent::Stage(InstallStage::Commit));
        if options.replace {
            let dropped = self
                .broker
                .forget_package(&id)
                .await
                .map_err(|e| InstallError::registry(InstallStage::Commit, e))?;
            if dropped > 0 {
                debug!(package_id = %id, dropped, "Dropped pending requests of replaced package");
            }
        }
        let requested = manifest.requested_permissions().to_vec();
        let record = self
            .registry
            .commit_install(CommitRequest {
                id: id.clone(),
                staged_dir: staged.to_path_buf(),
                manifest,
                provenance,
                metadata,
                replace: options.replace,
            })
            .await
            .map_err(|e| InstallError::registry(InstallStage::Commit, e))?;

        // Past this point the package is committed; cancellation is ignored.
        on_event(InstallEvent::Stage(InstallStage::Grant));
        let decision = match self.broker.request_capabilities(&id, &requested).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(package_id = %id, error = %e, "Capability grant failed, removing package");
                if let Err(undo) = self.broker.uninstall(&id).await {
                    warn!(package_id = %id, error = %undo, "Failed to remove package after grant failure");
                }
                return Err(InstallError::registry(InstallStage::Grant, e));
            },
        };

        let record = self.registry.get_details(&id).await.unwrap_or(record);
        info!(
            package_id = %id,
            name = %record.manifest.display_name(),
            version = %record.manifest.display_version(),
            warnings = warnings.len(),
            "Installed package"
        );
        Ok(InstallOutcome {
            record,
            decision,
            warnings,
        })
    }

    async fn check_installable(
        &self,
        id: &PackageId,
        options: InstallOptions,
        stage: InstallStage,
    ) -> InstallResult<()> {
        if !options.replace && self.registry.contains(id).await {
            return Err(InstallError::registry(
                stage,
                RegistryError::AlreadyInstalled(id.clone()),
            ));
        }
        Ok(())
    }

    fn workdir(&self, stage: InstallStage) -> InstallResult<TempDir> {
        let tmp = self.home.tmp_dir();
        std::fs::create_dir_all(&tmp).map_err(|e| InstallError::state(stage, e))?;
        tempfile::Builder::new()
            .prefix("install-")
            .tempdir_in(&tmp)
            .map_err(|e| InstallError::state(stage, e))
    }

    /// Unpack `container` into `staged`. Returns the extractor's warnings.
    async fn extract(
        &self,
        container: Container,
        staged: PathBuf,
        cancel: &CancellationToken,
    ) -> InstallResult<Vec<String>> {
        let limits = self.limits;
        let token = cancel.clone();
        let report = run_blocking(InstallStage::Extract, move || {
            extract_archive(container.payload(), &staged, limits, &token)
                .map_err(|e| InstallError::crx(InstallStage::Extract, e))
        })
        .await?;
        debug!(
            files = report.files,
            directories = report.directories,
            bytes = report.bytes,
            skipped = report.skipped.len(),
            "Extracted package"
        );
        Ok(report.warnings())
    }
}

async fn read_container(path: PathBuf) -> InstallResult<Container> {
    run_blocking(InstallStage::Parse, move || {
        Container::read(&path).map_err(|e| InstallError::crx(InstallStage::Parse, e))
    })
    .await
}

async fn run_blocking<T, F>(stage: InstallStage, f: F) -> InstallResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> InstallResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InstallError::state(stage, format!("worker task failed: {e}")))?
}

fn check_cancelled(cancel: &CancellationToken, stage: InstallStage) -> InstallResult<()> {
    if cancel.is_cancelled() {
        return Err(InstallError::Cancelled { stage });
    }
    Ok(())
}
