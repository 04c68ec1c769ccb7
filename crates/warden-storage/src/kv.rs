//! Namespaced key-value store trait and backends.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{StorageError, StorageResult};

/// Byte-level namespaced key-value storage.
///
/// Implementations must be thread-safe. Writes are durable on return for
/// disk-backed implementations.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the value stored under `namespace`/`key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `namespace`/`key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete the value under `namespace`/`key`. Deleting a missing key is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()>;

    /// List all keys in `namespace`, in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory store for tests and explicitly ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    maps: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(e: &std::sync::PoisonError<T>) -> StorageError {
        StorageError::Backend(format!("lock poisoned: {e}"))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let maps = self.maps.read().map_err(|e| Self::lock_err(&e))?;
        Ok(maps.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut maps = self.maps.write().map_err(|e| Self::lock_err(&e))?;
        maps.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let mut maps = self.maps.write().map_err(|e| Self::lock_err(&e))?;
        if let Some(ns) = maps.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let maps = self.maps.read().map_err(|e| Self::lock_err(&e))?;
        Ok(maps
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Sled backend
// ---------------------------------------------------------------------------

/// Durable store backed by an embedded sled database.
///
/// Each namespace maps to one sled tree. Every write is flushed before
/// returning, so a successful `set` survives a crash.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    /// Open or create a store at the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be opened
    /// (missing parent directory, held lock, corrupt files).
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    fn tree(&self, namespace: &str) -> StorageResult<sled::Tree> {
        Ok(self.db.open_tree(namespace)?)
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let tree = self.tree(namespace)?;
        Ok(tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let tree = self.tree(namespace)?;
        tree.insert(key, value)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let tree = self.tree(namespace)?;
        tree.remove(key)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let tree = self.tree(namespace)?;
        let mut keys = Vec::new();
        for item in tree.iter() {
            let (key, _) = item?;
            match std::str::from_utf8(&key) {
                Ok(s) => keys.push(s.to_string()),
                Err(e) => {
                    tracing::warn!(namespace, error = %e, "skipping non-utf8 key");
                },
            }
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for SledKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledKvStore")
            .field("trees", &self.db.tree_names().len())
            .finish_non_exhaustive()
    }
}
