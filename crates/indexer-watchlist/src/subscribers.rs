//! Subscriber management (spec §4.4 "Subscriber management").

use crate::error::WatchlistError;
use chrono::Utc;
use indexer_core::keys;
use indexer_core::storage::{typed, Storage};
use indexer_core::watchlist_types::Subscriber;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct SubscriberRegistry {
    storage: Arc<dyn Storage>,
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    addr_subs: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl SubscriberRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            subscribers: RwLock::new(HashMap::new()),
            addr_subs: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the subscription id. Maintains both `subscribers[sub_id]`
    /// and `addr_subs[address_id]`.
    pub async fn subscribe(
        &self,
        address_id: Uuid,
        transport_handle: String,
    ) -> Result<Uuid, WatchlistError> {
        if self.storage.get(&keys::watchlist::address(address_id)).await?.is_none() {
            return Err(WatchlistError::AddressNotFound);
        }

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            address_id,
            transport_handle,
            created_at: Utc::now(),
            last_delivery: None,
        };

        typed::put_json(&self.storage, &keys::watchlist::subscriber(subscriber.id), &subscriber)
            .await?;
        self.storage
            .put(&keys::watchlist::addr_subs(address_id, subscriber.id), vec![])
            .await?;

        self.subscribers.write().insert(subscriber.id, subscriber.clone());
        self.addr_subs.write().entry(address_id).or_default().push(subscriber.id);

        Ok(subscriber.id)
    }

    pub async fn unsubscribe(&self, sub_id: Uuid) -> Result<(), WatchlistError> {
        let address_id = {
            let mut subs = self.subscribers.write();
            let subscriber = subs.remove(&sub_id).ok_or(WatchlistError::SubscriberNotFound)?;
            subscriber.address_id
        };

        if let Some(ids) = self.addr_subs.write().get_mut(&address_id) {
            ids.retain(|id| *id != sub_id);
        }

        self.storage.delete(&keys::watchlist::subscriber(sub_id)).await?;
        self.storage.delete(&keys::watchlist::addr_subs(address_id, sub_id)).await?;
        Ok(())
    }

    /// Tears down every subscriber of `address_id` (used by
    /// `unwatch_address`).
    pub async fn unsubscribe_all(&self, address_id: Uuid) -> Result<(), WatchlistError> {
        let ids = self.addr_subs.write().remove(&address_id).unwrap_or_default();
        for sub_id in ids {
            self.subscribers.write().remove(&sub_id);
            self.storage.delete(&keys::watchlist::subscriber(sub_id)).await?;
            self.storage.delete(&keys::watchlist::addr_subs(address_id, sub_id)).await?;
        }
        Ok(())
    }

    pub fn subscribers_for(&self, address_id: Uuid) -> Vec<Subscriber> {
        let ids = self.addr_subs.read().get(&address_id).cloned().unwrap_or_default();
        let subs = self.subscribers.read();
        ids.iter().filter_map(|id| subs.get(id).cloned()).collect()
    }

    pub fn mark_delivered(&self, sub_id: Uuid) {
        if let Some(sub) = self.subscribers.write().get_mut(&sub_id) {
            sub.last_delivery = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_core::test_support::InMemoryStorage;
    use indexer_core::watchlist_types::{WatchFilter, WatchStats, WatchedAddress};
    use alloy::primitives::Address;

    async fn seed_address(storage: &Arc<dyn Storage>) -> Uuid {
        let id = Uuid::new_v4();
        let watched = WatchedAddress {
            id,
            address: Address::ZERO,
            chain_id: 1,
            label: None,
            filter: WatchFilter::default(),
            created_at: Utc::now(),
            stats: WatchStats::default(),
        };
        typed::put_json(storage, &keys::watchlist::address(id), &watched).await.unwrap();
        id
    }

    #[tokio::test]
    async fn subscribe_requires_existing_address() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let registry = SubscriberRegistry::new(storage);
        let result = registry.subscribe(Uuid::new_v4(), "ws://x".to_string()).await;
        assert_eq!(result.unwrap_err(), WatchlistError::AddressNotFound);
    }

    #[tokio::test]
    async fn subscribe_then_list_then_unsubscribe() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let address_id = seed_address(&storage).await;
        let registry = SubscriberRegistry::new(storage);
        let sub_id = registry.subscribe(address_id, "ws://x".to_string()).await.unwrap();
        assert_eq!(registry.subscribers_for(address_id).len(), 1);
        registry.unsubscribe(sub_id).await.unwrap();
        assert_eq!(registry.subscribers_for(address_id).len(), 0);
    }

    #[tokio::test]
    async fn unwatch_tears_down_all_subscribers() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let address_id = seed_address(&storage).await;
        let registry = SubscriberRegistry::new(storage);
        registry.subscribe(address_id, "ws://a".to_string()).await.unwrap();
        registry.subscribe(address_id, "ws://b".to_string()).await.unwrap();
        registry.unsubscribe_all(address_id).await.unwrap();
        assert_eq!(registry.subscribers_for(address_id).len(), 0);
    }
}
