//! Event lifecycle: persist, update stats, publish, deliver
//! (spec §4.4 "Event lifecycle").

use crate::error::WatchlistError;
use crate::registry::WatchRegistry;
use crate::subscribers::SubscriberRegistry;
use async_trait::async_trait;
use chrono::Utc;
use indexer_core::event_bus::{EventBus, IndexerEvent};
use indexer_core::keys;
use indexer_core::metrics::IndexerMetrics;
use indexer_core::storage::{typed, Storage};
use indexer_core::watchlist_types::{Subscriber, WatchEvent, WatchEventType, WatchStats};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// The transport fan-out is an external collaborator (spec §6: "consumers
/// poll or subscribe, out of scope"); this narrow interface is what the
/// watchlist core calls once a match is confirmed.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    async fn deliver(&self, subscriber: &Subscriber, event: &WatchEvent);
}

/// A transport that drops every delivery; useful as a default when no
/// live subscriber fan-out is wired up yet.
pub struct NullTransport;

#[async_trait]
impl SubscriberTransport for NullTransport {
    async fn deliver(&self, _subscriber: &Subscriber, _event: &WatchEvent) {}
}

pub struct EventEmitter {
    storage: Arc<dyn Storage>,
    event_bus: Arc<dyn EventBus>,
    transport: Arc<dyn SubscriberTransport>,
}

impl EventEmitter {
    pub fn new(
        storage: Arc<dyn Storage>,
        event_bus: Arc<dyn EventBus>,
        transport: Arc<dyn SubscriberTransport>,
    ) -> Self {
        Self { storage, event_bus, transport }
    }

    /// Assigns a fresh id and timestamp, persists under the two schema
    /// keys, bumps the watched address's counters, publishes on the bus,
    /// and delivers to every live subscriber.
    pub async fn emit(
        &self,
        registry: &WatchRegistry,
        subscribers: &SubscriberRegistry,
        address_id: Uuid,
        mut event: WatchEvent,
    ) -> Result<WatchEvent, WatchlistError> {
        event.id = Uuid::new_v4();
        event.timestamp = Utc::now();
        event.address_id = address_id;

        typed::put_json(
            &self.storage,
            &keys::watchlist::event(event.chain_id, event.block, event.tx_hash, event.log_index.unwrap_or(0)),
            &event,
        )
        .await?;
        typed::put_json(
            &self.storage,
            &keys::watchlist::event_by_addr(address_id, event.timestamp.timestamp_millis(), event.id),
            &event,
        )
        .await?;

        let watched = registry
            .lookup_by_id(address_id)
            .ok_or(WatchlistError::AddressNotFound)?;
        let chain_id = watched.chain_id;
        let address = watched.address;
        registry
            .update_stats(chain_id, address, |stats| bump_stats(stats, event.event_type))
            .await?;

        IndexerMetrics::watchlist_event(event_type_label(event.event_type));

        if !self.event_bus.publish(IndexerEvent::Watch(event.clone())) {
            warn!(event_id = %event.id, "event bus full, watch event dropped from bus fan-out");
        }

        for subscriber in subscribers.subscribers_for(address_id) {
            self.transport.deliver(&subscriber, &event).await;
            subscribers.mark_delivered(subscriber.id);
        }

        Ok(event)
    }
}

fn event_type_label(event_type: WatchEventType) -> &'static str {
    match event_type {
        WatchEventType::TxFrom => "tx_from",
        WatchEventType::TxTo => "tx_to",
        WatchEventType::Erc20Transfer => "erc20_transfer",
        WatchEventType::Erc721Transfer => "erc721_transfer",
        WatchEventType::Log => "log",
    }
}

fn bump_stats(stats: &mut WatchStats, event_type: WatchEventType) {
    stats.total_events += 1;
    stats.last_event_at = Some(Utc::now());
    match event_type {
        WatchEventType::TxFrom => stats.tx_from_events += 1,
        WatchEventType::TxTo => stats.tx_to_events += 1,
        WatchEventType::Erc20Transfer => stats.erc20_events += 1,
        WatchEventType::Erc721Transfer => stats.erc721_events += 1,
        WatchEventType::Log => stats.log_events += 1,
    }
}
