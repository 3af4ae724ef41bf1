//! Key-value persistence for the application's named string records.
//!
//! The backup coordinator never interprets the values it moves around; every record is an
//! opaque, already-serialized string. Implementations only need `get`, `set` and `remove`.

mod file;
mod memory;

pub use file::JsonFileKeyValueStore;
pub use memory::MemoryKeyValueStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a key-value store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read key {key}: {message}")]
    ReadFailed { key: String, message: String },

    #[error("Failed to write key {key}: {message}")]
    WriteFailed { key: String, message: String },

    #[error("Failed to remove key {key}: {message}")]
    RemoveFailed { key: String, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Async get/set/remove over named string records
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record; `Ok(None)` when the key holds no value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a record, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
