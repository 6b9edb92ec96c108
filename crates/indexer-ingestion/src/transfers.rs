//! Transfer-log decoding, contract-creation recording, and token
//! metadata indexing (spec §4.1 step 4 a-c, §3.3).

use alloy::primitives::{Address, U256};
use indexer_core::keys;
use indexer_core::rpc::{CallMessage, RpcClient, RpcError};
use indexer_core::storage::{typed, Batch, Storage, StorageError};
use indexer_core::types::{
    transfer_topic0, ContractCreation, Erc20Transfer, Erc721Transfer, Log, Receipt, Transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn topic_to_address(topic: &alloy::primitives::B256) -> Address {
    Address::from_slice(&topic.as_slice()[12..32])
}

/// Decodes a `Transfer(address,address,uint256)` log into an ERC-20 or
/// ERC-721 record based on topic count (spec §3.3, §4.4 step 4: three
/// topics = ERC-20 amount-in-data, four topics = ERC-721
/// tokenId-in-topic).
pub fn decode_transfer_log(log: &Log, block_timestamp: u64) -> Option<TransferRecord> {
    if log.topics.first() != Some(&transfer_topic0()) {
        return None;
    }
    if log.topics.len() == 3 {
        let from = topic_to_address(&log.topics[1]);
        let to = topic_to_address(&log.topics[2]);
        let value = U256::from_be_slice(left_pad32(&log.data).as_slice());
        Some(TransferRecord::Erc20(Erc20Transfer {
            contract: log.address,
            from,
            to,
            value,
            tx_hash: log.tx_hash,
            block: log.block_number,
            log_index: log.log_index,
            timestamp: block_timestamp,
        }))
    } else if log.topics.len() == 4 {
        let from = topic_to_address(&log.topics[1]);
        let to = topic_to_address(&log.topics[2]);
        let token_id = U256::from_be_bytes(log.topics[3].0);
        Some(TransferRecord::Erc721(Erc721Transfer {
            contract: log.address,
            from,
            to,
            token_id,
            tx_hash: log.tx_hash,
            block: log.block_number,
            log_index: log.log_index,
            timestamp: block_timestamp,
        }))
    } else {
        None
    }
}

fn left_pad32(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let len = data.len().min(32);
    out[32 - len..].copy_from_slice(&data[..len]);
    out
}

#[derive(Debug, Clone)]
pub enum TransferRecord {
    Erc20(Erc20Transfer),
    Erc721(Erc721Transfer),
}

pub fn persist_transfer(batch: &mut dyn Batch, record: &TransferRecord) {
    match record {
        TransferRecord::Erc20(t) => {
            batch.put(
                &keys::chain::erc20_transfer(t.block, t.tx_hash, t.log_index),
                serde_json::to_vec(t).unwrap(),
            );
        }
        TransferRecord::Erc721(t) => {
            batch.put(
                &keys::chain::erc721_transfer(t.block, t.tx_hash, t.log_index),
                serde_json::to_vec(t).unwrap(),
            );
        }
    }
}

/// Records a contract-creation event for a `to == nil` transaction whose
/// receipt carries the resulting `contract_address` (spec §4.1 step 4c).
pub fn record_contract_creation(
    batch: &mut dyn Batch,
    tx: &Transaction,
    receipt: &Receipt,
    timestamp: u64,
) -> Option<ContractCreation> {
    let contract_address = receipt.contract_address?;
    let record = ContractCreation {
        contract_address,
        creator: tx.from,
        tx_hash: tx.hash,
        block: tx.block_number,
        timestamp,
    };
    batch.put(&keys::chain::contract_creation(contract_address), serde_json::to_vec(&record).unwrap());
    Some(record)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

const SELECTOR_NAME: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
const SELECTOR_SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const SELECTOR_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

/// Best-effort `name()`/`symbol()`/`decimals()` probe against a freshly
/// created contract. Any individual call failing just leaves that field
/// `None` — a contract that reverts on `decimals()` is still indexed.
pub async fn index_token_metadata(
    storage: &Arc<dyn Storage>,
    rpc: &Arc<dyn RpcClient>,
    contract: Address,
) -> Result<(), StorageError> {
    let name = call_string(rpc, contract, &SELECTOR_NAME).await;
    let symbol = call_string(rpc, contract, &SELECTOR_SYMBOL).await;
    let decimals = call_decimals(rpc, contract).await;

    if name.is_none() && symbol.is_none() && decimals.is_none() {
        debug!(%contract, "no ERC-20/721 metadata surface, skipping");
        return Ok(());
    }

    typed::put_json(storage, &keys::chain::token_metadata(contract), &TokenMetadata { name, symbol, decimals })
        .await
}

async fn call_string(rpc: &Arc<dyn RpcClient>, contract: Address, selector: &[u8; 4]) -> Option<String> {
    let msg = CallMessage {
        from: None,
        to: contract,
        data: selector.to_vec().into(),
        value: U256::ZERO,
        gas: None,
    };
    match rpc.call_contract(msg, None).await {
        Ok(bytes) => decode_abi_string(&bytes),
        Err(RpcError::NotFound) | Err(_) => None,
    }
}

async fn call_decimals(rpc: &Arc<dyn RpcClient>, contract: Address) -> Option<u8> {
    let msg = CallMessage {
        from: None,
        to: contract,
        data: SELECTOR_DECIMALS.to_vec().into(),
        value: U256::ZERO,
        gas: None,
    };
    match rpc.call_contract(msg, None).await {
        Ok(bytes) if bytes.len() >= 32 => Some(bytes[31]),
        _ => None,
    }
}

/// Decodes a dynamic ABI `string` return: 32-byte offset (ignored, always
/// `0x20` for a single return value), 32-byte length, then the UTF-8 bytes.
fn decode_abi_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 64 {
        return None;
    }
    let len = U256::from_be_slice(&bytes[32..64]).to::<usize>();
    let data = bytes.get(64..64 + len)?;
    String::from_utf8(data.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, B256};

    fn make_log(topics: Vec<alloy::primitives::B256>, data: Vec<u8>) -> Log {
        Log {
            address: address!("1111111111111111111111111111111111111111"),
            topics,
            data: data.into(),
            log_index: 0,
            tx_hash: B256::ZERO,
            tx_index: 0,
            block_number: 10,
        }
    }

    #[test]
    fn three_topics_decode_as_erc20() {
        let from = address!("2222222222222222222222222222222222222222");
        let to = address!("3333333333333333333333333333333333333333");
        let mut data = vec![0u8; 31];
        data.push(42);
        let topics = vec![
            transfer_topic0(),
            B256::left_padding_from(from.as_slice()),
            B256::left_padding_from(to.as_slice()),
        ];
        let record = decode_transfer_log(&make_log(topics, data), 1000).unwrap();
        match record {
            TransferRecord::Erc20(t) => {
                assert_eq!(t.from, from);
                assert_eq!(t.to, to);
                assert_eq!(t.value, U256::from(42u64));
            }
            _ => panic!("expected erc20"),
        }
    }

    #[test]
    fn four_topics_decode_as_erc721() {
        let from = address!("2222222222222222222222222222222222222222");
        let to = address!("3333333333333333333333333333333333333333");
        let token_id = B256::from(U256::from(7u64));
        let topics = vec![
            transfer_topic0(),
            B256::left_padding_from(from.as_slice()),
            B256::left_padding_from(to.as_slice()),
            token_id,
        ];
        let record = decode_transfer_log(&make_log(topics, vec![]), 1000).unwrap();
        match record {
            TransferRecord::Erc721(t) => {
                assert_eq!(t.token_id, U256::from(7u64));
            }
            _ => panic!("expected erc721"),
        }
    }

    #[test]
    fn non_transfer_topic_is_ignored() {
        let log = make_log(vec![B256::repeat_byte(0xAB)], vec![]);
        assert!(decode_transfer_log(&log, 0).is_none());
    }
}
