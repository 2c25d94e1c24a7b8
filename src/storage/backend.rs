//! Storage backend implementations

use super::StorageBackend;
use crate::error::{QuireError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory backend
///
/// Clones share the same map, so one instance can back both the session
/// store and the identity provider in tests. The backend can be switched
/// to "unavailable" to exercise hard storage failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    values: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a key is currently present
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QuireError::Storage("memory backend is unavailable".to_string()).into());
        }
        let mut values = self
            .values
            .lock()
            .map_err(|_| QuireError::Storage("memory backend lock poisoned".to_string()))?;
        Ok(f(&mut values))
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_values(|values| values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_values(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_values(|values| {
            values.remove(key);
        })
    }
}

/// Durable backend on an embedded `sled` database
///
/// Every write is flushed before returning so a crash never loses an
/// acknowledged mutation.
pub struct SledBackend {
    db: sled::Db,
    path: PathBuf,
}

impl SledBackend {
    /// Open or create the database directory at `path`
    ///
    /// # Errors
    ///
    /// Returns `QuireError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::storage::{SledBackend, StorageBackend};
    ///
    /// # fn main() -> quire::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let backend = SledBackend::open(dir.path().join("store"))?;
    /// backend.set("k", "v")?;
    /// assert_eq!(backend.get("k")?, Some("v".to_string()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QuireError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }
        let db = sled::open(&path)
            .map_err(|e| QuireError::Storage(format!("Failed to open database: {}", e)))?;
        tracing::debug!("Opened sled store at {}", path.display());
        Ok(Self { db, path })
    }

    /// Location of the database directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| QuireError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

impl StorageBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| QuireError::Storage(format!("Get failed: {}", e)))?;
        match value {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| QuireError::Storage(format!("Value is not UTF-8: {}", e)))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| QuireError::Storage(format!("Insert failed: {}", e)))?;
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| QuireError::Storage(format!("Remove failed: {}", e)))?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_roundtrip_and_remove() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("k").unwrap(), None);
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("v".to_string()));
        backend.remove("k").unwrap();
        assert!(!backend.contains("k"));
        backend.remove("k").expect("removing an absent key is fine");
    }

    #[test]
    fn test_memory_backend_clones_share_state() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.set("shared", "1").unwrap();
        assert_eq!(b.get("shared").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_memory_backend_unavailable_fails_every_op() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        let err = backend.set("k", "v").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuireError>(),
            Some(QuireError::Storage(_))
        ));
        assert!(backend.get("k").is_err());
        backend.set_unavailable(false);
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_sled_backend_set_get_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store");
        let backend = SledBackend::open(&path).expect("open");
        assert_eq!(backend.path(), path.as_path());
        assert!(path.parent().unwrap().exists());

        backend.set("chatSessions", "[]").expect("set");
        assert_eq!(backend.get("chatSessions").unwrap(), Some("[]".to_string()));
        backend.set("chatSessions", "[1]").expect("overwrite");
        assert_eq!(backend.get("chatSessions").unwrap(), Some("[1]".to_string()));
        backend.remove("chatSessions").unwrap();
        assert_eq!(backend.get("chatSessions").unwrap(), None);
    }
}
