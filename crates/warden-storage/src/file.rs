//! File-backed key-value store.
//!
//! Layout: `{root}/{namespace}/{key}`, one file per value. Writes go to a
//! temp file in the namespace directory, are synced, then renamed over the
//! target, so a reader never observes a torn value. Mutations additionally
//! hold an exclusive advisory lock on `{root}/{namespace}/.lock` so two warden
//! processes sharing a home cannot interleave.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, validate_segment};

const LOCK_FILE_NAME: &str = ".lock";

/// Persistent [`KvStore`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> StorageResult<PathBuf> {
        validate_segment("namespace", namespace)?;
        Ok(self.root.join(namespace))
    }

    fn entry_path(&self, namespace: &str, key: &str) -> StorageResult<PathBuf> {
        validate_segment("key", key)?;
        Ok(self.namespace_dir(namespace)?.join(key))
    }
}

/// Exclusive lock on a namespace directory, released on drop.
struct NamespaceLock {
    file: File,
}

impl NamespaceLock {
    fn acquire(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE_NAME))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for NamespaceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn write_atomic(dir: &Path, path: &Path, value: &[u8]) -> StorageResult<()> {
    let _lock = NamespaceLock::acquire(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".tmp").tempfile_in(dir)?;
    tmp.write_all(value)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

fn remove_locked(dir: &Path, path: &Path) -> StorageResult<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    let _lock = NamespaceLock::acquire(dir)?;
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Internal(format!("storage task failed: {e}")))?
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.entry_path(namespace, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let dir = self.namespace_dir(namespace)?;
        let path = self.entry_path(namespace, key)?;
        debug!(path = %path.display(), bytes = value.len(), "Writing store entry");
        blocking(move || write_atomic(&dir, &path, &value)).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let dir = self.namespace_dir(namespace)?;
        let path = self.entry_path(namespace, key)?;
        blocking(move || remove_locked(&dir, &path)).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let dir = self.namespace_dir(namespace)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }
}
