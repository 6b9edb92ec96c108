//! The on-disk key-value store is an external collaborator (spec §1, §6);
//! this module only specifies the interface the CORE depends on.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A batch of writes applied atomically by the backing store. `put` and
/// `delete` queue operations; nothing is visible until `commit` succeeds.
#[async_trait]
pub trait Batch: Send {
    fn put(&mut self, key: &str, value: Vec<u8>);
    fn delete(&mut self, key: &str);
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Minimal KV-oriented interface the CORE requires (spec §6). All keys are
/// string-prefixed and lexicographically sortable per `crate::keys`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn has(&self, key: &str) -> Result<bool, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Invokes `f` for every `(key, value)` pair whose key starts with
    /// `prefix`, in lexicographic (thus numeric, given the key schema)
    /// order. Iteration stops early if `f` returns `false`.
    async fn iterate_prefix(
        &self,
        prefix: &str,
        f: &mut (dyn FnMut(&str, &[u8]) -> bool + Send),
    ) -> Result<(), StorageError>;

    fn new_batch(&self) -> Box<dyn Batch>;
}

/// Typed convenience helpers layered over the raw byte `Storage`. Every
/// subsystem that persists a domain type should go through one of these
/// rather than hand-rolling `serde_json::to_vec` at each call site.
pub mod typed {
    use super::*;
    use serde::{de::DeserializeOwned, Serialize};
    use std::sync::Arc;

    pub async fn put_json<T: Serialize + Sync>(
        storage: &Arc<dyn Storage>,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Backend(e.to_string()))?;
        storage.put(key, bytes).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        storage: &Arc<dyn Storage>,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match storage.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
