//! Keyed record storage for small pieces of gateway state (the active
//! welcome announcement, the pending-deletion queue).
//!
//! Stores only persist; callers own the read-modify-write discipline.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cb_domain::error::{Error, Result};

#[async_trait]
pub trait RecordStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Missing or undecodable records read as `None`.
    async fn get(&self, key: &str) -> Result<Option<T>>;
    async fn put(&self, key: &str, value: T) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryRecordStore<T> {
    records: RwLock<HashMap<String, T>>,
}

impl<T> MemoryRecordStore<T> {
    pub fn new() -> Self {
        Self { records: RwLock::new(HashMap::new()) }
    }
}

impl<T> Default for MemoryRecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> RecordStore<T> for MemoryRecordStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: T) -> Result<()> {
        self.records.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<_> = self.records.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// All records live in one JSON object file (`key -> record`).
///
/// The file is re-read on every access so it stays the single source of
/// truth across restarts. A missing, empty, or corrupt file reads as empty.
pub struct JsonRecordStore<T> {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonRecordStore<T> {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<JsonMap> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_map_file(&path))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))
    }

    async fn write_map(&self, map: JsonMap) -> Result<()> {
        let path = self.path.clone();
        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| Error::Store(format!("serializing records: {e}")))?;
        tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, json).map_err(Error::Io)?;
            std::fs::rename(&tmp, &path).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }
}

#[async_trait]
impl<T> RecordStore<T> for JsonRecordStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        let mut map = self.read_map().await?;
        let Some(value) = map.remove(key) else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    key,
                    path = %self.path.display(),
                    error = %e,
                    "ignoring undecodable record"
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::Store(format!("serializing record: {e}")))?;
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_owned(), value);
        self.write_map(map).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_none() && self.path.exists() {
            return Ok(());
        }
        self.write_map(map).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let map = self.read_map().await?;
        Ok(map.keys().cloned().collect())
    }
}

fn read_map_file(path: &Path) -> JsonMap {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return JsonMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "record file unreadable, treating as empty");
            return JsonMap::new();
        }
    };
    if raw.trim().is_empty() {
        return JsonMap::new();
    }
    match serde_json::from_str(&raw) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "record file corrupt, treating as empty");
            JsonMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryRecordStore::<Rec>::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.put("a", Rec { n: 1 }).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Rec { n: 1 }));
        assert_eq!(store.keys().await.unwrap(), vec!["a"]);
        store.clear("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("records.json");
        {
            let store = JsonRecordStore::<Rec>::new(&path).unwrap();
            store.put("chat:1", Rec { n: 7 }).await.unwrap();
            store.put("chat:2", Rec { n: 8 }).await.unwrap();
        }
        let store = JsonRecordStore::<Rec>::new(&path).unwrap();
        assert_eq!(store.get("chat:1").await.unwrap(), Some(Rec { n: 7 }));
        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["chat:1", "chat:2"]);

        store.clear("chat:1").await.unwrap();
        assert_eq!(store.get("chat:1").await.unwrap(), None);
        assert_eq!(store.get("chat:2").await.unwrap(), Some(Rec { n: 8 }));
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty_and_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonRecordStore::<Rec>::new(&path).unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.keys().await.unwrap().is_empty());

        store.put("a", Rec { n: 3 }).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Rec { n: 3 }));
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, r#"{"a": {"n": "oops"}, "b": {"n": 2}}"#).unwrap();

        let store = JsonRecordStore::<Rec>::new(&path).unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(Rec { n: 2 }));
    }

    #[tokio::test]
    async fn empty_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "").unwrap();
        let store = JsonRecordStore::<Rec>::new(&path).unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
