use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory key-value store
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    records: Arc<DashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (key, value) in records {
            store.records.insert(key.into(), value.into());
        }
        store
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Synchronous read, for assertions and diagnostics
    pub fn peek(&self, key: &str) -> Option<String> {
        self.records.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}
