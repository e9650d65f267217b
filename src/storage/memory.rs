//! In-memory storage backend

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::{Error, Result};

use super::StorageBackend;

/// Process-local storage, mainly for tests and ephemeral tables
#[derive(Default)]
pub struct MemoryStorage {
    objects: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(key))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.put("t.b.U", Bytes::from_static(b"b")).await.unwrap();
        storage.put("t.a.I", Bytes::from_static(b"a")).await.unwrap();

        assert_eq!(storage.get("t.a.I").await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(storage.list("t.").await.unwrap(), vec!["t.a.I", "t.b.U"]);
        assert!(matches!(storage.get("missing").await, Err(Error::NotFound(_))));

        storage.delete("t.a.I").await.unwrap();
        assert_eq!(storage.len(), 1);
    }
}
