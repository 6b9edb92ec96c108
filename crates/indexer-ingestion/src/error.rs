//! Typed failures for the ingestion pipeline (spec §7).

use indexer_core::rpc::RpcError;
use indexer_core::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Consensus(#[from] indexer_consensus::ConsensusError),
    #[error(transparent)]
    Watchlist(#[from] indexer_watchlist::WatchlistError),
    #[error("block {0} exhausted its retry budget")]
    RetryBudgetExhausted(u64),
    #[error("cancelled")]
    Cancelled,
}
