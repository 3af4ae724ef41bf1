use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Key-value store persisted as a single JSON object on disk.
///
/// Every mutation rewrites the whole file through a sibling temporary file followed by a
/// rename, so a crash mid-write leaves the previous contents intact.
pub struct JsonFileKeyValueStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, String>>,
}

impl JsonFileKeyValueStore {
    /// Open the store at `path`, loading existing records if the file is present
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if fs::try_exists(&path).await.unwrap_or(false) {
            let text = fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str(&text)
                .map_err(|e| StoreError::Unavailable(format!("Corrupt store file {}: {}", path.display(), e)))?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), records = records.len(), "Opened key-value store");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, records: &BTreeMap<String, String>) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
            }
        }
        let text = serde_json::to_string_pretty(records).map_err(|e| e.to_string())?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, text).await.map_err(|e| e.to_string())?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(key.to_string(), value.to_string());
        if let Err(message) = self.flush(&records).await {
            // keep memory consistent with disk
            match previous {
                Some(old) => records.insert(key.to_string(), old),
                None => records.remove(key),
            };
            return Err(StoreError::WriteFailed {
                key: key.to_string(),
                message,
            });
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let Some(previous) = records.remove(key) else {
            return Ok(());
        };
        if let Err(message) = self.flush(&records).await {
            records.insert(key.to_string(), previous);
            return Err(StoreError::RemoveFailed {
                key: key.to_string(),
                message,
            });
        }
        Ok(())
    }
}
