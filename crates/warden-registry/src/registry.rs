//! The installed-package registry.
//!
//! Records live in a [`KvStore`] namespace, one JSON value per id. Package
//! files live in `{home}/packages/{id}/`. The enabled set lives in the
//! `enabled.json` sidecar. Every mutation of one id holds that id's lock for
//! its whole duration, so record, files and sidecar move together.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use warden_core::PackageId;
use warden_core::dirs::WardenHome;
use warden_storage::{KvStore, ScopedKvStore};

use crate::error::{RegistryError, RegistryResult};
use crate::locks::KeyedLocks;
use crate::record::{CommitRequest, InstalledPackageRecord, PackageSummary};
use crate::sidecar;

/// Store namespace for installed package records.
pub const RECORDS_NAMESPACE: &str = "records";

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<PackageId, InstalledPackageRecord>,
    enabled: Vec<PackageId>,
}

/// Durable source of truth for installed packages.
#[derive(Debug)]
pub struct Registry {
    home: WardenHome,
    records: ScopedKvStore,
    state: RwLock<State>,
    locks: KeyedLocks,
}

impl Registry {
    /// Load the registry from `home` and `store`.
    ///
    /// Records whose package directory is gone are dropped with a warning.
    /// Enabled ids without a record are discarded and the sidecar rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the sidecar cannot be read.
    pub async fn open(home: WardenHome, store: Arc<dyn KvStore>) -> RegistryResult<Self> {
        let records = ScopedKvStore::new(store, RECORDS_NAMESPACE)?;
        let mut state = State::default();

        for key in records.list_keys().await? {
            let Ok(id) = PackageId::new(key.as_str()) else {
                warn!(key = %key, "Skipping record with invalid id");
                continue;
            };
            let record: InstalledPackageRecord = match records.get_json(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(package_id = %id, error = %e, "Skipping unreadable record");
                    continue;
                },
            };
            if record.id != id {
                warn!(package_id = %id, recorded = %record.id, "Skipping record stored under the wrong key");
                continue;
            }

            let dir = home.package_dir(&id);
            if !dir.is_dir() {
                warn!(package_id = %id, path = %dir.display(), "Package directory missing, dropping record");
                records.delete(&key).await?;
                continue;
            }
            // Never trust a stored path; everything is derived from the id.
            let record = InstalledPackageRecord {
                storage_path: dir,
                ..record
            };
            state.records.insert(id, record);
        }

        let enabled_path = home.enabled_path();
        let persisted = blocking({
            let path = enabled_path.clone();
            move || sidecar::read(&path)
        })
        .await?;
        let enabled: Vec<PackageId> = persisted
            .iter()
            .filter(|id| state.records.contains_key(*id))
            .cloned()
            .collect();
        if enabled != persisted {
            warn!(
                dropped = persisted.len().saturating_sub(enabled.len()),
                "Discarding enabled ids with no installed record"
            );
            let ids = enabled.clone();
            blocking(move || sidecar::write(&enabled_path, &ids)).await?;
        }
        for id in &enabled {
            if let Some(record) = state.records.get_mut(id) {
                record.enabled = true;
            }
        }
        state.enabled = enabled;

        info!(
            packages = state.records.len(),
            enabled = state.enabled.len(),
            "Loaded registry"
        );
        Ok(Self {
            home,
            records,
            state: RwLock::new(state),
            locks: KeyedLocks::default(),
        })
    }

    /// The home directory this registry manages.
    #[must_use]
    pub fn home(&self) -> &WardenHome {
        &self.home
    }

    /// Move a validated extraction into permanent storage and record it.
    ///
    /// With `replace`, a previous installation is moved aside, the staged
    /// directory moved into place, the record written, and only then the
    /// backup removed. A failed record write restores the previous files and
    /// hands the staged directory back to the caller. Grants are cleared on
    /// replace; the enabled state is preserved.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::AlreadyInstalled`] if the id is installed and
    ///   `replace` is false
    /// - [`RegistryError::MissingStaging`] if `staged_dir` is not a directory
    /// - I/O or storage errors from the swap or the record write
    pub async fn commit_install(
        &self,
        request: CommitRequest,
    ) -> RegistryResult<InstalledPackageRecord> {
        let _guard = self.locks.lock(&request.id).await;

        let previous = self.state.read().await.records.get(&request.id).cloned();
        if previous.is_some() && !request.replace {
            return Err(RegistryError::AlreadyInstalled(request.id));
        }
        if !request.staged_dir.is_dir() {
            return Err(RegistryError::MissingStaging(request.staged_dir));
        }

        let target = self.home.package_dir(&request.id);
        if previous.is_none() && target.exists() {
            warn!(package_id = %request.id, path = %target.display(), "Replacing orphaned package directory");
        }

        let backup = blocking({
            let staged = request.staged_dir.clone();
            let target = target.clone();
            move || swap_into_place(&staged, &target)
        })
        .await?;

        let record = InstalledPackageRecord {
            id: request.id.clone(),
            storage_path: target.clone(),
            manifest: request.manifest,
            enabled: previous.as_ref().is_some_and(|p| p.enabled),
            installed_at: Utc::now(),
            provenance: request.provenance,
            granted_capabilities: BTreeSet::new(),
            metadata: request.metadata,
        };

        if let Err(e) = self.records.set_json(record.id.as_str(), &record).await {
            warn!(package_id = %record.id, error = %e, "Record write failed, rolling back");
            let staged = request.staged_dir;
            blocking(move || restore(&target, &staged, backup.as_deref())).await?;
            return Err(e.into());
        }

        self.state
            .write()
            .await
            .records
            .insert(record.id.clone(), record.clone());

        if let Some(backup) = backup {
            let removed = blocking(move || match std::fs::remove_dir_all(&backup) {
                Ok(()) => Ok(None),
                Err(e) => Ok(Some((backup, e))),
            })
            .await?;
            if let Some((path, e)) = removed {
                warn!(path = %path.display(), error = %e, "Failed to remove package backup");
            }
        }

        info!(
            package_id = %record.id,
            name = %record.manifest.display_name(),
            replaced = previous.is_some(),
            "Committed package"
        );
        Ok(record)
    }

    /// Add `id` to the enabled set. Returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id, or an I/O error
    /// if the sidecar cannot be rewritten.
    pub async fn enable(&self, id: &PackageId) -> RegistryResult<bool> {
        let _guard = self.locks.lock(id).await;
        self.set_enabled(id, true).await
    }

    /// Remove `id` from the enabled set. Grants are kept.
    /// Returns `false` if it already was disabled.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id, or an I/O error
    /// if the sidecar cannot be rewritten.
    pub async fn disable(&self, id: &PackageId) -> RegistryResult<bool> {
        let _guard = self.locks.lock(id).await;
        self.set_enabled(id, false).await
    }

    /// Caller holds the id lock.
    async fn set_enabled(&self, id: &PackageId, enabled: bool) -> RegistryResult<bool> {
        let mut state = self.state.write().await;
        let current = state
            .records
            .get(id)
            .map(|r| r.enabled)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if current == enabled {
            return Ok(false);
        }

        let mut next = state.enabled.clone();
        if enabled {
            next.push(id.clone());
        } else {
            next.retain(|e| e != id);
        }

        // The sidecar is written under the state lock so concurrent toggles
        // of different ids cannot reorder whole-file rewrites.
        let path = self.home.enabled_path();
        let ids = next.clone();
        blocking(move || sidecar::write(&path, &ids)).await?;

        state.enabled = next;
        if let Some(record) = state.records.get_mut(id) {
            record.enabled = enabled;
        }
        info!(package_id = %id, enabled, "Updated enabled set");
        Ok(true)
    }

    /// Remove a package: disable it, move its directory aside, drop its
    /// record, then delete the moved directory.
    ///
    /// If the record cannot be deleted the directory is moved back, so the
    /// record never outlives its files.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id, or the I/O or
    /// storage error that stopped the removal.
    pub async fn uninstall(&self, id: &PackageId) -> RegistryResult<InstalledPackageRecord> {
        let _guard = self.locks.lock(id).await;

        let record = self
            .state
            .read()
            .await
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if record.enabled {
            self.set_enabled(id, false).await?;
        }

        let dir = self.home.package_dir(id);
        let doomed = sibling(&dir, ".removing");
        let moved = blocking({
            let (dir, doomed) = (dir.clone(), doomed.clone());
            move || {
                if doomed.exists() {
                    std::fs::remove_dir_all(&doomed)?;
                }
                match std::fs::rename(&dir, &doomed) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await?;

        if let Err(e) = self.records.delete(id.as_str()).await {
            warn!(package_id = %id, error = %e, "Record delete failed, restoring package directory");
            if moved {
                blocking(move || std::fs::rename(&doomed, &dir)).await?;
            }
            return Err(e.into());
        }
        self.state.write().await.records.remove(id);

        if moved {
            let removed = blocking(move || match std::fs::remove_dir_all(&doomed) {
                Ok(()) => Ok(None),
                Err(e) => Ok(Some((doomed, e))),
            })
            .await?;
            if let Some((path, e)) = removed {
                warn!(path = %path.display(), error = %e, "Failed to delete removed package files");
            }
        }

        info!(package_id = %id, "Uninstalled package");
        Ok(InstalledPackageRecord {
            enabled: false,
            ..record
        })
    }

    /// Union `capabilities` into the package's granted set and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id, or a storage
    /// error if the record cannot be written.
    pub async fn grant<I, S>(
        &self,
        id: &PackageId,
        capabilities: I,
    ) -> RegistryResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capabilities: Vec<String> = capabilities.into_iter().map(Into::into).collect();
        self.update_grants(id, |granted| granted.extend(capabilities))
            .await
    }

    /// Remove `capabilities` from the granted set, or everything for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id, or a storage
    /// error if the record cannot be written.
    pub async fn revoke(
        &self,
        id: &PackageId,
        capabilities: Option<&[String]>,
    ) -> RegistryResult<BTreeSet<String>> {
        self.update_grants(id, |granted| match capabilities {
            Some(caps) => granted.retain(|g| !caps.contains(g)),
            None => granted.clear(),
        })
        .await
    }

    async fn update_grants<F>(&self, id: &PackageId, apply: F) -> RegistryResult<BTreeSet<String>>
    where
        F: FnOnce(&mut BTreeSet<String>),
    {
        let _guard = self.locks.lock(id).await;
        let mut record = self
            .get_details(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let before = record.granted_capabilities.clone();
        apply(&mut record.granted_capabilities);
        if record.granted_capabilities == before {
            return Ok(before);
        }

        self.records.set_json(id.as_str(), &record).await?;
        let granted = record.granted_capabilities.clone();
        debug!(package_id = %id, granted = granted.len(), "Updated capability grants");
        self.state.write().await.records.insert(id.clone(), record);
        Ok(granted)
    }

    /// Current grants for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id.
    pub async fn granted_capabilities(&self, id: &PackageId) -> RegistryResult<BTreeSet<String>> {
        self.state
            .read()
            .await
            .records
            .get(id)
            .map(|r| r.granted_capabilities.clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Every installed package, ordered by id.
    pub async fn list(&self) -> Vec<PackageSummary> {
        self.state
            .read()
            .await
            .records
            .values()
            .map(InstalledPackageRecord::summary)
            .collect()
    }

    /// Enabled packages, in enabled-set order.
    pub async fn enabled_packages(&self) -> Vec<PackageSummary> {
        let state = self.state.read().await;
        state
            .enabled
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(InstalledPackageRecord::summary)
            .collect()
    }

    /// The full record for `id`.
    pub async fn get_details(&self, id: &PackageId) -> Option<InstalledPackageRecord> {
        self.state.read().await.records.get(id).cloned()
    }

    /// When each installed package was last committed.
    pub(crate) async fn install_times(&self) -> HashMap<PackageId, DateTime<Utc>> {
        self.state
            .read()
            .await
            .records
            .iter()
            .map(|(id, r)| (id.clone(), r.installed_at))
            .collect()
    }

    /// Whether `id` is installed.
    pub async fn contains(&self, id: &PackageId) -> bool {
        self.state.read().await.records.contains_key(id)
    }
}

async fn blocking<T, F>(f: F) -> RegistryResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RegistryError::Internal(format!("registry task failed: {e}")))?
        .map_err(RegistryError::from)
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

fn backup_path(target: &Path) -> PathBuf {
    sibling(target, ".backup")
}

/// Move `target` aside (if present) and `staged` into its place.
/// Returns the backup location.
fn swap_into_place(staged: &Path, target: &Path) -> std::io::Result<Option<PathBuf>> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let backup = if target.exists() {
        let backup = backup_path(target);
        // Stale backup from an interrupted commit.
        if backup.exists() {
            std::fs::remove_dir_all(&backup)?;
        }
        std::fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staged, target) {
        return Err(match &backup {
            Some(backup) => roll_back(backup, target, e),
            None => e,
        });
    }
    Ok(backup)
}

/// Put `backup` back at `target` after a failed swap. Returns `cause`, or
/// an error naming both failures if the backup cannot be moved back.
fn roll_back(backup: &Path, target: &Path, cause: std::io::Error) -> std::io::Error {
    match std::fs::rename(backup, target) {
        Ok(()) => cause,
        Err(rollback) => {
            error!(
                backup = %backup.display(),
                target = %target.display(),
                error = %cause,
                rollback_error = %rollback,
                "Failed to restore previous package after a failed swap"
            );
            std::io::Error::new(
                cause.kind(),
                format!(
                    "{cause}; restoring {} from {} also failed: {rollback}",
                    target.display(),
                    backup.display()
                ),
            )
        },
    }
}

/// Undo [`swap_into_place`]: the new content goes back to `staged` and the
/// backup (if any) back to `target`.
fn restore(target: &Path, staged: &Path, backup: Option<&Path>) -> std::io::Result<()> {
    std::fs::rename(target, staged)?;
    if let Some(backup) = backup {
        std::fs::rename(backup, target)?;
    }
    Ok(())
}
