//! Concurrent block ingestion pipeline (spec §4.1): the Fetcher plus the
//! per-concern helpers it drives (balance tracking, transfer/creation
//! indexing, SetCode authorization processing, adaptive optimizer).

pub mod balances;
pub mod error;
pub mod fetcher;
pub mod optimizer;
pub mod setcode;
pub mod transfers;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use error::IngestionError;
pub use fetcher::{ConsensusKind, Fetcher, FetcherConfig};
pub use optimizer::{AdaptiveOptimizer, OptimizerConfig, Sample};
