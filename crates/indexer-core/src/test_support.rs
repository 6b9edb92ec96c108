//! In-memory mocks for the external-collaborator traits, used by every
//! subsystem's unit tests. Mirrors how the teacher mocks `StateFetcher`
//! in its own test modules rather than standing up a real RPC client.

use crate::storage::{Batch, Storage, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct InMemoryStorage {
    map: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

struct InMemoryBatch {
    map: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    ops: Vec<(String, Option<Vec<u8>>)>,
}

#[async_trait]
impl Batch for InMemoryBatch {
    fn put(&mut self, key: &str, value: Vec<u8>) {
        self.ops.push((key.to_string(), Some(value)));
    }

    fn delete(&mut self, key: &str) {
        self.ops.push((key.to_string(), None));
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        for (k, v) in self.ops {
            match v {
                Some(value) => {
                    map.insert(k, value);
                }
                None => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.lock().get(key).cloned())
    }

    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.map.lock().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.map.lock().remove(key);
        Ok(())
    }

    async fn iterate_prefix(
        &self,
        prefix: &str,
        f: &mut (dyn FnMut(&str, &[u8]) -> bool + Send),
    ) -> Result<(), StorageError> {
        let snapshot: Vec<(String, Vec<u8>)> = self
            .map
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (k, v) in snapshot {
            if !f(&k, &v) {
                break;
            }
        }
        Ok(())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(InMemoryBatch { map: self.map.clone(), ops: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryStorage::new();
        store.put("/a/1", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("/a/1").await.unwrap(), Some(b"hello".to_vec()));
        assert!(store.has("/a/1").await.unwrap());
        assert!(!store.has("/a/2").await.unwrap());
    }

    #[tokio::test]
    async fn prefix_iteration_is_sorted() {
        let store = InMemoryStorage::new();
        store.put("/b/2", b"2".to_vec()).await.unwrap();
        store.put("/b/1", b"1".to_vec()).await.unwrap();
        store.put("/c/1", b"skip".to_vec()).await.unwrap();

        let mut seen = Vec::new();
        store
            .iterate_prefix("/b/", &mut |k, v| {
                seen.push((k.to_string(), v.to_vec()));
                true
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![
            ("/b/1".to_string(), b"1".to_vec()),
            ("/b/2".to_string(), b"2".to_vec()),
        ]);
    }

    #[tokio::test]
    async fn batch_commits_atomically() {
        let store = InMemoryStorage::new();
        let mut batch = store.new_batch();
        batch.put("/x", b"1".to_vec());
        batch.put("/y", b"2".to_vec());
        batch.commit().await.unwrap();

        assert_eq!(store.get("/x").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("/y").await.unwrap(), Some(b"2".to_vec()));
    }
}
