//! Shared `RpcClient` test double for this crate's unit tests.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use indexer_core::rpc::{CallMessage, RpcClient, RpcError};
use indexer_core::types::{Block, Receipt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Returns a fixed balance for every address and an empty block/receipt
/// set otherwise. Good enough for tests that only exercise the balance
/// seeding path.
pub struct StaticRpc {
    balance: U256,
    blocks: Mutex<HashMap<u64, Block>>,
}

impl StaticRpc {
    pub fn with_balance(balance: U256) -> Self {
        Self { balance, blocks: Mutex::new(HashMap::new()) }
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        let map = blocks.into_iter().map(|b| (b.number, b)).collect();
        Self { balance: U256::ZERO, blocks: Mutex::new(map) }
    }
}

#[async_trait]
impl RpcClient for StaticRpc {
    async fn get_block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError> {
        Ok(self.blocks.lock().get(&height).cloned())
    }

    async fn get_block_receipts(&self, _height: u64) -> Result<Vec<Receipt>, RpcError> {
        Ok(vec![])
    }

    async fn transaction_by_hash(&self, _hash: B256) -> Result<Option<Value>, RpcError> {
        Ok(None)
    }

    async fn transaction_receipt(&self, _hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(None)
    }

    async fn balance_at(&self, _address: Address, _block: Option<u64>) -> Result<U256, RpcError> {
        Ok(self.balance)
    }

    async fn code_at(&self, _address: Address, _block: Option<u64>) -> Result<Bytes, RpcError> {
        Ok(Bytes::new())
    }

    async fn call_contract(&self, _msg: CallMessage, _block: Option<u64>) -> Result<Bytes, RpcError> {
        Ok(Bytes::new())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.blocks.lock().keys().max().copied().unwrap_or(0))
    }

    async fn subscribe_pending_transactions(&self) -> Result<tokio::sync::mpsc::Receiver<B256>, RpcError> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }

    async fn call(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }
}
