//! Watchlist entities (spec §3.4).

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-address filter toggles (spec §3.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchFilter {
    pub tx_from: bool,
    pub tx_to: bool,
    pub erc20: bool,
    pub erc721: bool,
    pub logs: bool,
    /// Minimum value (wei) for a `tx_from`/`tx_to` event to be emitted.
    pub min_value: U256,
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self {
            tx_from: true,
            tx_to: true,
            erc20: true,
            erc721: true,
            logs: false,
            min_value: U256::ZERO,
        }
    }
}

/// Per-address lifetime counters, updated on every emitted event
/// (spec §4.4 "Event lifecycle").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WatchStats {
    pub total_events: u64,
    pub tx_from_events: u64,
    pub tx_to_events: u64,
    pub erc20_events: u64,
    pub erc721_events: u64,
    pub log_events: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchedAddress {
    pub id: Uuid,
    pub address: Address,
    pub chain_id: u64,
    pub label: Option<String>,
    pub filter: WatchFilter,
    pub created_at: DateTime<Utc>,
    pub stats: WatchStats,
}

/// Discriminant for `WatchEvent` (spec §3.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchEventType {
    TxFrom,
    TxTo,
    Erc20Transfer,
    Erc721Transfer,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEvent {
    pub id: Uuid,
    pub address_id: Uuid,
    pub chain_id: u64,
    pub event_type: WatchEventType,
    pub block: u64,
    pub tx_hash: B256,
    pub log_index: Option<u64>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    /// Value (native transfer / ERC-20 amount) encoded as a decimal
    /// string so both u256 amounts and token ids round-trip through JSON.
    pub value: Option<String>,
    pub token_id: Option<String>,
    /// Opaque, type-specific payload (e.g. decoded log data) for clients
    /// that want more than the normalized fields above.
    pub typed_data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A live transport registered to receive events for one watched address
/// (spec §3.4). The transport itself (WebSocket, gRPC stream, ...) is an
/// external collaborator; this only tracks the handle used to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    pub id: Uuid,
    pub address_id: Uuid,
    pub transport_handle: String,
    pub created_at: DateTime<Utc>,
    pub last_delivery: Option<DateTime<Utc>>,
}
