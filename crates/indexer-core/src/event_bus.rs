//! The event bus is an external collaborator whose consumers are out of
//! scope (spec §1, §6): `publish` is the only contract the CORE relies on.
//! `Publish` is non-blocking — a full channel returns `false` and the
//! caller logs the drop rather than blocking the pipeline (spec §5).

use crate::consensus_types::ConsensusData;
use crate::types::{ContractCreation, Erc20Transfer, Erc721Transfer, Log, Receipt, Transaction};
use crate::watchlist_types::WatchEvent;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexerEvent {
    BlockProcessed { height: u64 },
    Transaction(Transaction),
    Receipt(Receipt),
    Log(Log),
    ConsensusBlock(ConsensusData),
    ValidatorChange { height: u64, epoch_number: u64 },
    ConsensusError { height: u64, severity: crate::consensus_types::ConsensusSeverity },
    Erc20Transfer(Erc20Transfer),
    Erc721Transfer(Erc721Transfer),
    ContractCreation(ContractCreation),
    ValidatorAdded { height: u64, validator: Address },
    ValidatorRemoved { height: u64, validator: Address },
    Watch(WatchEvent),
}

pub trait EventBus: Send + Sync {
    /// Returns `false` if the bus is full or closed; callers must treat
    /// that as a dropped event, never as a reason to fail the pipeline.
    fn publish(&self, event: IndexerEvent) -> bool;
}

/// A bounded in-process bus backed by a `tokio::sync::broadcast` channel,
/// suitable as the default wiring between the Fetcher and any in-process
/// consumer. Matches the "non-blocking publish, drop on full" contract.
pub struct BroadcastEventBus {
    sender: tokio::sync::broadcast::Sender<IndexerEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<IndexerEvent> {
        self.sender.subscribe()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: IndexerEvent) -> bool {
        // `send` only fails when there are no receivers; a lagging
        // receiver drops old events on its own side, which is the
        // broadcast channel's version of "drop under backpressure".
        self.sender.send(event).is_ok()
    }
}
