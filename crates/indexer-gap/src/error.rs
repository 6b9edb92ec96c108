use indexer_core::rpc::RpcError;
use indexer_core::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GapError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("gap recovery cancelled")]
    Cancelled,
    #[error("block {0} not found upstream while filling a gap")]
    MissingUpstream(u64),
}
