//! Storage abstraction layer
//!
//! Serialized indexes are opaque byte blobs addressed by string keys. The
//! relation layer picks the keys; backends only move bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

pub mod local;
pub mod memory;

/// Byte-oriented key-value store
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, or `Error::NotFound` if absent
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Write (or replace) the value stored under `key`
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete `key`; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if `key` exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { root_path: String },
    Memory,
}

/// Create storage backend from config
pub fn create_storage(config: StorageConfig) -> Result<Box<dyn StorageBackend>> {
    match config {
        StorageConfig::Local { root_path } => {
            let backend = local::LocalStorage::new(root_path)?;
            Ok(Box::new(backend))
        }
        StorageConfig::Memory => Ok(Box::new(memory::MemoryStorage::new())),
    }
}
