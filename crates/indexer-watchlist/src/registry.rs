//! Per-chain watched-address registry: bloom filter + exact index
//! (spec §4.4 "Event matcher").

use crate::bloom::BloomFilter;
use crate::error::WatchlistError;
use alloy::primitives::Address;
use chrono::Utc;
use indexer_core::keys;
use indexer_core::storage::{typed, Storage};
use indexer_core::watchlist_types::{WatchFilter, WatchStats, WatchedAddress};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Default bloom sizing (spec §4.4: "false-positive rate target <= 1e-4
/// at expected scale 1e5 addresses").
const DEFAULT_EXPECTED_ITEMS: usize = 100_000;
const DEFAULT_TARGET_FPR: f64 = 1e-4;

struct ChainWatch {
    bloom: BloomFilter,
    exact: HashMap<Address, WatchedAddress>,
}

impl ChainWatch {
    fn new() -> Self {
        Self {
            bloom: BloomFilter::new(DEFAULT_EXPECTED_ITEMS, DEFAULT_TARGET_FPR)
                .expect("default bloom parameters are always valid"),
            exact: HashMap::new(),
        }
    }
}

/// Owns every chain's bloom filter and exact watched-address map. Locks
/// are released before any storage I/O — nothing awaits while a lock is
/// held (spec §9 "Scoped acquisition").
pub struct WatchRegistry {
    storage: Arc<dyn Storage>,
    chains: RwLock<HashMap<u64, ChainWatch>>,
}

impl WatchRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, chains: RwLock::new(HashMap::new()) }
    }

    /// The common-case check used by the matcher: "no watched addresses
    /// for this chain" must be one cheap map probe (spec §4.4 step 1).
    pub fn has_any(&self, chain_id: u64) -> bool {
        self.chains
            .read()
            .get(&chain_id)
            .map(|c| !c.exact.is_empty())
            .unwrap_or(false)
    }

    pub fn lookup(&self, chain_id: u64, address: Address) -> Option<WatchedAddress> {
        self.chains.read().get(&chain_id)?.exact.get(&address).cloned()
    }

    /// Scans every chain's exact map for a watched address by its uuid.
    /// Used by the event emitter, which only has the id at hand.
    pub fn lookup_by_id(&self, id: Uuid) -> Option<WatchedAddress> {
        self.chains
            .read()
            .values()
            .find_map(|chain| chain.exact.values().find(|w| w.id == id).cloned())
    }

    /// Probes the bloom filter, then falls back to the exact map only on
    /// a bloom hit (spec §4.4 step 3-4).
    pub fn probe(&self, chain_id: u64, address: Address) -> Option<WatchedAddress> {
        let chains = self.chains.read();
        let chain = chains.get(&chain_id)?;
        if !chain.bloom.might_contain(address.as_slice()) {
            return None;
        }
        chain.exact.get(&address).cloned()
    }

    pub async fn watch(
        &self,
        chain_id: u64,
        address: Address,
        label: Option<String>,
        filter: WatchFilter,
    ) -> Result<WatchedAddress, WatchlistError> {
        if self.lookup(chain_id, address).is_some() {
            return Err(WatchlistError::AddressAlreadyExists);
        }

        let watched = WatchedAddress {
            id: Uuid::new_v4(),
            address,
            chain_id,
            label,
            filter,
            created_at: Utc::now(),
            stats: WatchStats::default(),
        };

        typed::put_json(&self.storage, &keys::watchlist::address(watched.id), &watched).await?;
        self.storage
            .put(&keys::watchlist::chain_index(chain_id, watched.id), vec![])
            .await?;
        typed::put_json(
            &self.storage,
            &keys::watchlist::address_lookup(chain_id, address),
            &watched.id,
        )
        .await?;

        {
            let mut chains = self.chains.write();
            let chain = chains.entry(chain_id).or_insert_with(ChainWatch::new);
            chain.bloom.add(address.as_slice());
            chain.exact.insert(address, watched.clone());
        }

        let bloom_bytes = {
            let chains = self.chains.read();
            chains.get(&chain_id).unwrap().bloom.serialize()
        };
        self.storage.put(&keys::watchlist::bloom(chain_id), bloom_bytes).await?;

        Ok(watched)
    }

    /// Removes `id` from the exact map; the bloom bit pattern is left as
    /// is (spec §4.4 "Bloom filter semantics" — removal is not supported).
    pub async fn unwatch(&self, chain_id: u64, id: Uuid) -> Result<(), WatchlistError> {
        let address = {
            let mut chains = self.chains.write();
            let Some(chain) = chains.get_mut(&chain_id) else {
                return Err(WatchlistError::AddressNotFound);
            };
            let address = chain
                .exact
                .iter()
                .find(|(_, w)| w.id == id)
                .map(|(a, _)| *a)
                .ok_or(WatchlistError::AddressNotFound)?;
            chain.exact.remove(&address);
            address
        };

        self.storage.delete(&keys::watchlist::address(id)).await?;
        self.storage.delete(&keys::watchlist::chain_index(chain_id, id)).await?;
        self.storage.delete(&keys::watchlist::address_lookup(chain_id, address)).await?;
        Ok(())
    }

    pub async fn update_stats<F>(
        &self,
        chain_id: u64,
        address: Address,
        update: F,
    ) -> Result<(), WatchlistError>
    where
        F: FnOnce(&mut WatchStats),
    {
        let watched = {
            let mut chains = self.chains.write();
            let Some(chain) = chains.get_mut(&chain_id) else {
                return Err(WatchlistError::AddressNotFound);
            };
            let Some(watched) = chain.exact.get_mut(&address) else {
                return Err(WatchlistError::AddressNotFound);
            };
            update(&mut watched.stats);
            watched.clone()
        };

        typed::put_json(&self.storage, &keys::watchlist::stats(watched.id), &watched.stats).await?;
        typed::put_json(&self.storage, &keys::watchlist::address(watched.id), &watched).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_core::test_support::InMemoryStorage;

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    #[tokio::test]
    async fn watch_then_probe_hits() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let registry = WatchRegistry::new(storage);
        let a = addr(1);
        registry.watch(1, a, None, WatchFilter::default()).await.unwrap();
        assert!(registry.has_any(1));
        assert!(registry.probe(1, a).is_some());
        assert!(registry.probe(1, addr(2)).is_none());
    }

    #[tokio::test]
    async fn duplicate_watch_errors() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let registry = WatchRegistry::new(storage);
        let a = addr(1);
        registry.watch(1, a, None, WatchFilter::default()).await.unwrap();
        let result = registry.watch(1, a, None, WatchFilter::default()).await;
        assert_eq!(result.unwrap_err(), WatchlistError::AddressAlreadyExists);
    }

    #[tokio::test]
    async fn unwatch_removes_from_exact_map_but_not_bloom() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let registry = WatchRegistry::new(storage);
        let a = addr(1);
        let watched = registry.watch(1, a, None, WatchFilter::default()).await.unwrap();
        registry.unwatch(1, watched.id).await.unwrap();
        assert!(registry.lookup(1, a).is_none());
    }
}
