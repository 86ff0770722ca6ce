//! Key-value store trait, in-memory backend and scoped view.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a namespace or key.
///
/// Both become path segments in [`FileKvStore`](crate::FileKvStore), so the
/// rules are the same for every backend: non-empty, no separators, no null
/// bytes, no leading dot (reserved for lock and temp files).
pub(crate) fn validate_segment(kind: &str, segment: &str) -> StorageResult<()> {
    if segment.is_empty() {
        return Err(StorageError::InvalidKey(format!("{kind} must not be empty")));
    }
    if segment.starts_with('.') {
        return Err(StorageError::InvalidKey(format!(
            "{kind} must not start with '.': {segment}"
        )));
    }
    if segment.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidKey(format!(
            "{kind} must not contain path separators or null bytes: {segment:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw key-value store trait.
///
/// Provides namespaced byte-level storage. Writers are expected to serialize
/// mutations of the same key themselves; the store only guarantees that each
/// individual `set`/`delete` is atomic.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value for a namespace and key, overwriting any existing value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key from a namespace.
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a namespace, sorted.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory key-value store for tests and ephemeral data.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data
            .get_mut(namespace)
            .is_some_and(|ns| ns.remove(key).is_some()))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_segment("namespace", namespace)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let mut keys: Vec<String> = data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Scoped view
// ---------------------------------------------------------------------------

/// A [`KvStore`] pre-bound to one namespace, with JSON helpers.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Create a scoped view into the given store for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is invalid.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_segment("namespace", &namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The namespace this store is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(&self.namespace, key).await
    }

    /// List all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Deserialize a JSON value. Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not
    /// valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.inner.get(&self.namespace, key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be encoded.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))?;
        self.inner.set(&self.namespace, key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_crud() {
        let store = MemoryKvStore::new();
        assert!(store.get("ns", "a").await.unwrap().is_none());

        store.set("ns", "b", b"2".to_vec()).await.unwrap();
        store.set("ns", "a", b"1".to_vec()).await.unwrap();
        store.set("other", "c", b"3".to_vec()).await.unwrap();

        assert_eq!(store.get("ns", "a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["a", "b"]);

        assert!(store.delete("ns", "a").await.unwrap());
        assert!(!store.delete("ns", "a").await.unwrap());
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["b"]);
        assert_eq!(store.list_keys("other").await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn rejects_unsafe_segments() {
        let store = MemoryKvStore::new();
        for bad in ["", "../x", "a/b", "a\\b", ".hidden", "nul\0"] {
            assert!(
                matches!(
                    store.set("ns", bad, vec![]).await,
                    Err(StorageError::InvalidKey(_))
                ),
                "key {bad:?} should be rejected"
            );
        }
        assert!(store.list_keys("").await.is_err());
    }

    #[tokio::test]
    async fn scoped_json_round_trip() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let scoped = ScopedKvStore::new(Arc::clone(&store), "records").unwrap();

        scoped.set_json("k", &vec!["x", "y"]).await.unwrap();
        let back: Option<Vec<String>> = scoped.get_json("k").await.unwrap();
        assert_eq!(back.unwrap(), vec!["x", "y"]);

        store.set("records", "bad", b"{".to_vec()).await.unwrap();
        let err = scoped.get_json::<Vec<String>>("bad").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        assert_eq!(scoped.list_keys().await.unwrap(), vec!["bad", "k"]);
    }
}
