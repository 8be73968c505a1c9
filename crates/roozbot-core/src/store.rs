//! Abstract key-value JSON store.
//!
//! One logical record per named key. The file-backed implementation keeps a
//! pretty-printed JSON file per key — human-readable and git-friendly. Reads
//! fail open: an unreadable or corrupt record logs a warning and behaves as
//! absent, so a damaged file never takes the bot down. Write failures are
//! reported to the caller as `RoozError::Store`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, RoozError};

/// Well-known store keys.
pub mod keys {
    pub const ADMIN_LIST: &str = "admin-list";
    pub const ROSTER: &str = "roster";
    pub const LEAVES: &str = "leaves";
    pub const MESSAGE_TEMPLATE: &str = "message-template";
    pub const SCHEDULE: &str = "schedule";
    pub const ACK_LOG: &str = "ack-log";
}

/// Injected persistence dependency. Object-safe so domain components can hold
/// an `Arc<dyn KvStore>`; typed access goes through [`StoreExt`].
pub trait KvStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<Value>>;
    fn put_raw(&self, key: &str, value: Value) -> Result<()>;
}

/// Typed get/put on top of any [`KvStore`].
pub trait StoreExt {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;
    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;

    /// Fail-open read: any error or absent record becomes the default.
    fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key).ok().flatten().unwrap_or_default()
    }
}

impl<S: KvStore + ?Sized> StoreExt for S {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(value) => match serde_json::from_value(value) {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    tracing::warn!("record '{key}' has unexpected shape, treating as absent: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| RoozError::Store(format!("serialize '{key}': {e}")))?;
        self.put_raw(key, value)
    }
}

/// File-backed store: `<dir>/<key>.json` per key.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn file(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for JsonFileStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        let file = self.file(key);
        if !file.exists() {
            return Ok(None);
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("failed to parse {}: {e}", file.display());
                    Ok(None)
                }
            },
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", file.display());
                Ok(None)
            }
        }
    }

    fn put_raw(&self, key: &str, value: Value) -> Result<()> {
        let file = self.file(key);
        let json = serde_json::to_string_pretty(&value)
            .map_err(|e| RoozError::Store(format!("serialize '{key}': {e}")))?;
        std::fs::write(&file, json)
            .map_err(|e| RoozError::Store(format!("write {}: {e}", file.display())))?;
        tracing::debug!("saved '{key}' to {}", file.display());
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        let records = self
            .records
            .lock()
            .map_err(|_| RoozError::Store("store lock poisoned".into()))?;
        Ok(records.get(key).cloned())
    }

    fn put_raw(&self, key: &str, value: Value) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RoozError::Store("store lock poisoned".into()))?;
        records.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join("roozbot-test-store");
        let store = JsonFileStore::new(&dir);
        store.put(keys::MESSAGE_TEMPLATE, &serde_json::json!({"text": "hi"})).unwrap();
        let value: Option<Value> = store.get(keys::MESSAGE_TEMPLATE).unwrap();
        assert_eq!(value.unwrap()["text"], "hi");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn file_store_reads_fail_open() {
        let dir = std::env::temp_dir().join("roozbot-test-store-corrupt");
        let store = JsonFileStore::new(&dir);
        assert!(store.get_raw("missing").unwrap().is_none());
        std::fs::write(dir.join("roster.json"), "{not json").unwrap();
        assert!(store.get_raw(keys::ROSTER).unwrap().is_none());
        let roster: Vec<Value> = store.get_or_default(keys::ROSTER);
        assert!(roster.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mem_store_round_trip() {
        let store = MemStore::new();
        store.put("k", &vec![1, 2, 3]).unwrap();
        let v: Option<Vec<i32>> = store.get("k").unwrap();
        assert_eq!(v.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn typed_get_fails_open_on_shape_mismatch() {
        let store = MemStore::new();
        store.put("k", &serde_json::json!({"unexpected": true})).unwrap();
        let v: Option<Vec<i32>> = store.get("k").unwrap();
        assert!(v.is_none());
    }
}
