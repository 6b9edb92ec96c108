//! Typed, user-visible failure codes (spec §7 "User-visible failure
//! behavior").

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProxyError {
    #[error("QUEUE_FULL")]
    QueueFull,
    #[error("CIRCUIT_OPEN")]
    CircuitOpen,
    #[error("RATE_LIMITED")]
    RateLimited,
    #[error("TIMEOUT")]
    Timeout,
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),
    #[error("upstream RPC error: {0}")]
    Upstream(String),
}

impl From<indexer_core::rpc::RpcError> for ProxyError {
    fn from(e: indexer_core::rpc::RpcError) -> Self {
        match e {
            indexer_core::rpc::RpcError::Timeout => ProxyError::Timeout,
            indexer_core::rpc::RpcError::RateLimited => ProxyError::RateLimited,
            other => ProxyError::Upstream(other.to_string()),
        }
    }
}
