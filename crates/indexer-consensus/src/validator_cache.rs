//! Process-local validator-set cache (spec §3.5): "Validator-set caches
//! (by block height) are process-local, bounded, and flushable; they are
//! an optimization, never the source of truth." `epoch_info` is only
//! present on epoch-boundary blocks (spec §3.2); every ordinary block in
//! between reuses the most recently announced set instead of decoding an
//! empty one from its own extra-data. Grounded on the teacher's own
//! bounded, lock-guarded `lru::LruCache` sitting in front of a handler
//! (`sidecar/src/commitment/request.rs`'s `CommitmentRequestHandler`
//! caches recent `PreconfRequest`s the same way).

use indexer_core::consensus_types::EpochInfo;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 16;

/// Keyed by epoch number (`height / epoch_length`): every block within
/// one epoch shares the validator set announced at that epoch's boundary.
pub struct ValidatorSetCache {
    inner: RwLock<LruCache<u64, EpochInfo>>,
}

impl ValidatorSetCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: RwLock::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())) }
    }

    /// Returns the cached validator set for `epoch_number`, if any.
    pub fn get(&self, epoch_number: u64) -> Option<EpochInfo> {
        self.inner.write().get(&epoch_number).cloned()
    }

    /// Records the validator set announced at `epoch_number`'s boundary.
    pub fn insert(&self, epoch_number: u64, info: EpochInfo) {
        self.inner.write().put(epoch_number, info);
    }

    /// Drops every cached entry (spec §3.5 "flushable"): never the source
    /// of truth, so this is always safe — callers simply lose validators
    /// for non-boundary blocks until the cache is repopulated from the
    /// next boundary block they process.
    pub fn flush(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValidatorSetCache {
    fn default() -> Self {
        Self::new()
    }
}
