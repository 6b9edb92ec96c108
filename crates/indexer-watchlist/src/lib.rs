//! Watchlist event matcher: per-chain bloom filter + exact index,
//! ERC-20/721 log decoding, subscription fan-out (spec §4.4).

pub mod bloom;
pub mod error;
pub mod events;
pub mod matcher;
pub mod registry;
pub mod subscribers;

pub use bloom::BloomFilter;
pub use error::WatchlistError;
pub use events::{EventEmitter, NullTransport, SubscriberTransport};
pub use registry::WatchRegistry;
pub use subscribers::SubscriberRegistry;

use alloy::primitives::Address;
use indexer_core::event_bus::EventBus;
use indexer_core::storage::Storage;
use indexer_core::types::{Receipt, Transaction};
use indexer_core::watchlist_types::{WatchEvent, WatchFilter, WatchedAddress};
use std::sync::Arc;
use uuid::Uuid;

/// Facade combining the registry, subscribers, and event emitter — what
/// `indexer-ingestion` actually holds one instance of per process.
pub struct WatchlistService {
    pub registry: WatchRegistry,
    pub subscribers: SubscriberRegistry,
    pub emitter: EventEmitter,
}

impl WatchlistService {
    pub fn new(
        storage: Arc<dyn Storage>,
        event_bus: Arc<dyn EventBus>,
        transport: Arc<dyn SubscriberTransport>,
    ) -> Self {
        Self {
            registry: WatchRegistry::new(storage.clone()),
            subscribers: SubscriberRegistry::new(storage.clone()),
            emitter: EventEmitter::new(storage, event_bus, transport),
        }
    }

    pub async fn watch_address(
        &self,
        chain_id: u64,
        address: Address,
        label: Option<String>,
        filter: WatchFilter,
    ) -> Result<WatchedAddress, WatchlistError> {
        self.registry.watch(chain_id, address, label, filter).await
    }

    pub async fn unwatch_address(&self, chain_id: u64, id: Uuid) -> Result<(), WatchlistError> {
        self.subscribers.unsubscribe_all(id).await?;
        self.registry.unwatch(chain_id, id).await
    }

    pub async fn subscribe(
        &self,
        address_id: Uuid,
        transport_handle: String,
    ) -> Result<Uuid, WatchlistError> {
        self.subscribers.subscribe(address_id, transport_handle).await
    }

    pub async fn unsubscribe(&self, sub_id: Uuid) -> Result<(), WatchlistError> {
        self.subscribers.unsubscribe(sub_id).await
    }

    pub async fn process_block(
        &self,
        chain_id: u64,
        block_number: u64,
        transactions: &[Transaction],
        receipts: &[Receipt],
    ) -> Result<Vec<WatchEvent>, WatchlistError> {
        matcher::process_block(
            chain_id,
            block_number,
            transactions,
            receipts,
            &self.registry,
            &self.subscribers,
            &self.emitter,
        )
        .await
    }
}
