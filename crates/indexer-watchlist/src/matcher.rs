//! Watchlist matching pipeline (spec §4.4 "Matching pipeline per block").

use crate::error::WatchlistError;
use crate::events::EventEmitter;
use crate::registry::WatchRegistry;
use crate::subscribers::SubscriberRegistry;
use alloy::primitives::{Address, B256, U256};
use indexer_core::types::{transfer_topic0, Log, Receipt, Transaction};
use indexer_core::watchlist_types::{WatchEvent, WatchEventType};

fn topic_to_address(topic: &B256) -> Address {
    Address::from_slice(&topic.as_slice()[12..32])
}

/// Matches every transaction and log of one block against the watched
/// addresses of `chain_id`, emitting durable events for every hit.
/// Returns immediately if nothing is watched on this chain (spec §4.4
/// step 1: "the common case must be cheap — one map probe").
pub async fn process_block(
    chain_id: u64,
    block_number: u64,
    transactions: &[Transaction],
    receipts: &[Receipt],
    registry: &WatchRegistry,
    subscribers: &SubscriberRegistry,
    emitter: &EventEmitter,
) -> Result<Vec<WatchEvent>, WatchlistError> {
    if !registry.has_any(chain_id) {
        return Ok(vec![]);
    }

    let mut emitted = Vec::new();

    for tx in transactions {
        if let Some(watched) = registry.probe(chain_id, tx.from) {
            if watched.filter.tx_from && tx.value >= watched.filter.min_value {
                let event = WatchEvent {
                    id: uuid::Uuid::nil(),
                    address_id: watched.id,
                    chain_id,
                    event_type: WatchEventType::TxFrom,
                    block: block_number,
                    tx_hash: tx.hash,
                    log_index: None,
                    from: Some(tx.from),
                    to: tx.to,
                    value: Some(tx.value.to_string()),
                    token_id: None,
                    typed_data: None,
                    timestamp: chrono::Utc::now(),
                };
                emitted.push(emitter.emit(registry, subscribers, watched.id, event).await?);
            }
        }

        if let Some(to) = tx.to {
            if let Some(watched) = registry.probe(chain_id, to) {
                if watched.filter.tx_to && tx.value >= watched.filter.min_value {
                    let event = WatchEvent {
                        id: uuid::Uuid::nil(),
                        address_id: watched.id,
                        chain_id,
                        event_type: WatchEventType::TxTo,
                        block: block_number,
                        tx_hash: tx.hash,
                        log_index: None,
                        from: Some(tx.from),
                        to: Some(to),
                        value: Some(tx.value.to_string()),
                        token_id: None,
                        typed_data: None,
                        timestamp: chrono::Utc::now(),
                    };
                    emitted.push(emitter.emit(registry, subscribers, watched.id, event).await?);
                }
            }
        }
    }

    let transfer_sig = transfer_topic0();

    for log in receipts.iter().flat_map(|r| r.logs.iter()) {
        if let Some(watched) = registry.probe(chain_id, log.address) {
            if watched.filter.logs {
                let event = WatchEvent {
                    id: uuid::Uuid::nil(),
                    address_id: watched.id,
                    chain_id,
                    event_type: WatchEventType::Log,
                    block: block_number,
                    tx_hash: log.tx_hash,
                    log_index: Some(log.log_index),
                    from: None,
                    to: None,
                    value: None,
                    token_id: None,
                    typed_data: Some(serde_json::json!({
                        "topics": log.topics.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                        "data": log.data.to_string(),
                    })),
                    timestamp: chrono::Utc::now(),
                };
                emitted.push(emitter.emit(registry, subscribers, watched.id, event).await?);
            }
        }

        if log.topics.first() == Some(&transfer_sig) {
            emitted.extend(
                match_transfer_log(chain_id, block_number, log, registry, subscribers, emitter).await?,
            );
        }
    }

    Ok(emitted)
}

async fn match_transfer_log(
    chain_id: u64,
    block_number: u64,
    log: &Log,
    registry: &WatchRegistry,
    subscribers: &SubscriberRegistry,
    emitter: &EventEmitter,
) -> Result<Vec<WatchEvent>, WatchlistError> {
    if log.topics.len() < 3 {
        return Ok(vec![]);
    }
    let from = topic_to_address(&log.topics[1]);
    let to = topic_to_address(&log.topics[2]);

    let (event_type, value, token_id) = if log.topics.len() == 3 {
        (WatchEventType::Erc20Transfer, Some(U256::from_be_slice(&log.data).to_string()), None)
    } else if log.topics.len() == 4 {
        let token_id = U256::from_be_slice(log.topics[3].as_slice());
        (WatchEventType::Erc721Transfer, None, Some(token_id.to_string()))
    } else {
        return Ok(vec![]);
    };

    let mut emitted = Vec::new();
    for participant in [from, to] {
        if let Some(watched) = registry.probe(chain_id, participant) {
            let filter_enabled = match event_type {
                WatchEventType::Erc20Transfer => watched.filter.erc20,
                WatchEventType::Erc721Transfer => watched.filter.erc721,
                _ => false,
            };
            if !filter_enabled {
                continue;
            }
            let event = WatchEvent {
                id: uuid::Uuid::nil(),
                address_id: watched.id,
                chain_id,
                event_type,
                block: block_number,
                tx_hash: log.tx_hash,
                log_index: Some(log.log_index),
                from: Some(from),
                to: Some(to),
                value: value.clone(),
                token_id: token_id.clone(),
                typed_data: None,
                timestamp: chrono::Utc::now(),
            };
            emitted.push(emitter.emit(registry, subscribers, watched.id, event).await?);
        }
    }
    Ok(emitted)
}
