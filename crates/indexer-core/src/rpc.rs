//! The RPC client transport is an external collaborator (spec §1, §6);
//! this module specifies the operations the CORE calls against it.

use crate::types::{Block, Receipt};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("rate limited")]
    RateLimited,
    #[error("not found")]
    NotFound,
    #[error("decode error: {0}")]
    Decode(String),
}

/// A `callTracer`-shaped call message (spec §4.5 "Internal-tx tracing").
#[derive(Debug, Clone)]
pub struct CallMessage {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<u64>,
}

#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn get_block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError>;
    async fn get_block_receipts(&self, height: u64) -> Result<Vec<Receipt>, RpcError>;
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Value>, RpcError>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;
    async fn balance_at(&self, address: Address, block: Option<u64>) -> Result<U256, RpcError>;
    async fn code_at(&self, address: Address, block: Option<u64>) -> Result<Bytes, RpcError>;
    async fn call_contract(&self, msg: CallMessage, block: Option<u64>) -> Result<Bytes, RpcError>;
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Long-lived: yields one raw pending-transaction payload at a time
    /// until cancelled. Implementations must unsubscribe upstream and
    /// close their error channel on cancellation (spec §9 "Async/cancellation").
    async fn subscribe_pending_transactions(
        &self,
    ) -> Result<tokio::sync::mpsc::Receiver<B256>, RpcError>;

    /// Raw escape hatch for provider-specific methods such as
    /// `debug_traceTransaction`.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}
