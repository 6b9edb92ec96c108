use thiserror::Error;

/// Sentinel values the watchlist API returns (spec §7 "User-visible
/// failure behavior"), not a fatal error taxonomy — callers switch on
/// these rather than treating them as unexpected failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("address not found")]
    AddressNotFound,
    #[error("address already exists")]
    AddressAlreadyExists,
    #[error("invalid address")]
    InvalidAddress,
    #[error("subscriber not found")]
    SubscriberNotFound,
    #[error("service not running")]
    ServiceNotRunning,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<indexer_core::storage::StorageError> for WatchlistError {
    fn from(e: indexer_core::storage::StorageError) -> Self {
        WatchlistError::Storage(e.to_string())
    }
}
