//! Gap repair (spec §4.3 "Repair contract").

use crate::detect::{detect_block_gaps, detect_receipt_gaps, GapRange, ReceiptGapInfo};
use crate::error::GapError;
use futures::stream::{FuturesUnordered, StreamExt};
use indexer_core::keys;
use indexer_core::rpc::RpcClient;
use indexer_core::storage::{typed, Storage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SEQUENTIAL_THRESHOLD: u64 = 10;

#[derive(Debug, Clone)]
pub struct RepairConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { workers: 4, max_retries: 5, retry_delay: Duration::from_millis(200) }
    }
}

async fn fetch_and_persist_block(
    rpc: &Arc<dyn RpcClient>,
    storage: &Arc<dyn Storage>,
    height: u64,
    config: &RepairConfig,
) -> Result<(), GapError> {
    let mut attempt = 0u32;
    loop {
        let result = async {
            let block = rpc
                .get_block_by_number(height)
                .await?
                .ok_or(GapError::MissingUpstream(height))?;
            let receipts = rpc.get_block_receipts(height).await?;

            let tx_hashes: Vec<_> = receipts.iter().map(|r| r.tx_hash).collect();
            let mut batch = storage.new_batch();
            batch.put(&keys::chain::block(height), serde_json::to_vec(&block).unwrap());
            batch.put(
                &keys::chain::block_tx_hashes(height),
                serde_json::to_vec(&tx_hashes).unwrap(),
            );
            for receipt in &receipts {
                batch.put(&keys::chain::receipt(receipt.tx_hash), serde_json::to_vec(receipt).unwrap());
            }
            batch.commit().await?;
            Ok::<(), GapError>(())
        }
        .await;

        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= config.max_retries {
                    return Err(e);
                }
                warn!(height, attempt, error = %e, "retrying block fetch during gap fill");
                tokio::time::sleep(config.retry_delay * 2u32.pow(attempt.saturating_sub(1))).await;
            }
        }
    }
}

/// Fills `range`: sequential for `<= 10` blocks, concurrent (sharded
/// across `config.workers`) otherwise. All-or-nothing: the first error
/// aborts the whole range.
pub async fn fill_gap(
    range: GapRange,
    rpc: &Arc<dyn RpcClient>,
    storage: &Arc<dyn Storage>,
    config: &RepairConfig,
) -> Result<(), GapError> {
    if range.len() <= SEQUENTIAL_THRESHOLD {
        for height in range.start..=range.end {
            fetch_and_persist_block(rpc, storage, height, config).await?;
        }
        return Ok(());
    }

    let mut tasks = FuturesUnordered::new();
    let mut next = range.start;
    let mut in_flight = 0usize;

    while next <= range.end || in_flight > 0 {
        while in_flight < config.workers && next <= range.end {
            let rpc = rpc.clone();
            let storage = storage.clone();
            let config = config.clone();
            let height = next;
            tasks.push(async move { fetch_and_persist_block(&rpc, &storage, height, &config).await });
            next += 1;
            in_flight += 1;
        }

        if let Some(result) = tasks.next().await {
            in_flight -= 1;
            result?;
        }
    }

    Ok(())
}

/// Refetches the block's entire receipt set (most providers only expose
/// whole-block granularity), then persists only the specifically-missing
/// receipts. Unknown hashes (present in `info.missing_hashes` but absent
/// from the refetched set) are logged, not fatal.
pub async fn fill_receipt_gap(
    info: &ReceiptGapInfo,
    rpc: &Arc<dyn RpcClient>,
    storage: &Arc<dyn Storage>,
) -> Result<(), GapError> {
    let receipts = rpc.get_block_receipts(info.block).await?;
    let by_hash: HashMap<_, _> = receipts.into_iter().map(|r| (r.tx_hash, r)).collect();

    let mut batch = storage.new_batch();
    let mut persisted = 0;
    for hash in &info.missing_hashes {
        match by_hash.get(hash) {
            Some(receipt) => {
                batch.put(&keys::chain::receipt(*hash), serde_json::to_vec(receipt).unwrap());
                persisted += 1;
            }
            None => warn!(block = info.block, %hash, "missing receipt hash not found upstream"),
        }
    }
    batch.commit().await?;
    info!(block = info.block, persisted, "filled receipt gap");
    Ok(())
}

/// On startup, if the persisted latest height exceeds `configured_start`,
/// scans both gap types across `[configured_start, latest]` and fills
/// them. Errors are logged but non-fatal — they retry on the next
/// startup, per the repair contract.
pub async fn run_with_gap_recovery(
    storage: &Arc<dyn Storage>,
    rpc: &Arc<dyn RpcClient>,
    configured_start: u64,
    config: &RepairConfig,
    cancel: &CancellationToken,
) {
    let latest: Option<u64> =
        match typed::get_json(storage, keys::chain::latest_height()).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to read latest height before gap recovery");
                return;
            }
        };

    let Some(latest) = latest else { return };
    if latest <= configured_start {
        return;
    }

    match detect_block_gaps(storage, configured_start, latest, cancel).await {
        Ok(gaps) => {
            for gap in gaps {
                if let Err(e) = fill_gap(gap, rpc, storage, config).await {
                    error!(start = gap.start, end = gap.end, error = %e, "gap fill failed, will retry next startup");
                }
            }
        }
        Err(e) => error!(error = %e, "block gap detection failed"),
    }

    match detect_receipt_gaps(storage, configured_start, latest, cancel).await {
        Ok(infos) => {
            for info in infos {
                if let Err(e) = fill_receipt_gap(&info, rpc, storage).await {
                    error!(block = info.block, error = %e, "receipt gap fill failed, will retry next startup");
                }
            }
        }
        Err(e) => error!(error = %e, "receipt gap detection failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::GapRange;
    use indexer_core::rpc::RpcError;
    use indexer_core::test_support::InMemoryStorage;
    use indexer_core::types::Block;
    use alloy::primitives::{address, Bytes, B256};
    use async_trait::async_trait;
    use indexer_core::types::Receipt;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockRpc {
        fail_until_attempt: AtomicU32,
    }

    #[async_trait]
    impl RpcClient for MockRpc {
        async fn get_block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError> {
            if self.fail_until_attempt.load(Ordering::SeqCst) > 0 {
                self.fail_until_attempt.fetch_sub(1, Ordering::SeqCst);
                return Err(RpcError::Timeout);
            }
            Ok(Some(Block {
                number: height,
                hash: B256::repeat_byte(height as u8),
                parent_hash: B256::ZERO,
                proposer: address!("1111111111111111111111111111111111111111"),
                timestamp: height,
                gas_used: 0,
                gas_limit: 0,
                extra_data: Bytes::new(),
                transactions: vec![],
            }))
        }

        async fn get_block_receipts(&self, _height: u64) -> Result<Vec<Receipt>, RpcError> {
            Ok(vec![])
        }

        async fn transaction_by_hash(&self, _hash: B256) -> Result<Option<serde_json::Value>, RpcError> {
            Ok(None)
        }

        async fn transaction_receipt(&self, _hash: B256) -> Result<Option<Receipt>, RpcError> {
            Ok(None)
        }

        async fn balance_at(&self, _address: alloy::primitives::Address, _block: Option<u64>) -> Result<alloy::primitives::U256, RpcError> {
            Ok(alloy::primitives::U256::ZERO)
        }

        async fn code_at(&self, _address: alloy::primitives::Address, _block: Option<u64>) -> Result<Bytes, RpcError> {
            Ok(Bytes::new())
        }

        async fn call_contract(&self, _msg: indexer_core::rpc::CallMessage, _block: Option<u64>) -> Result<Bytes, RpcError> {
            Ok(Bytes::new())
        }

        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(0)
        }

        async fn subscribe_pending_transactions(&self) -> Result<tokio::sync::mpsc::Receiver<B256>, RpcError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }

        async fn call(&self, _method: &str, _params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn fill_gap_sequential_fills_small_range() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let rpc: Arc<dyn RpcClient> = Arc::new(MockRpc { fail_until_attempt: AtomicU32::new(0) });
        let range = GapRange { start: 4, end: 6 };
        fill_gap(range, &rpc, &storage, &RepairConfig::default()).await.unwrap();

        for h in 4..=6 {
            assert!(storage.has(&keys::chain::block(h)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn fill_gap_concurrent_fills_large_range() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let rpc: Arc<dyn RpcClient> = Arc::new(MockRpc { fail_until_attempt: AtomicU32::new(0) });
        let range = GapRange { start: 1, end: 20 };
        fill_gap(range, &rpc, &storage, &RepairConfig::default()).await.unwrap();

        for h in 1..=20 {
            assert!(storage.has(&keys::chain::block(h)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn fill_gap_retries_transient_failures() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let rpc: Arc<dyn RpcClient> = Arc::new(MockRpc { fail_until_attempt: AtomicU32::new(2) });
        let range = GapRange { start: 1, end: 1 };
        fill_gap(range, &rpc, &storage, &RepairConfig::default()).await.unwrap();
        assert!(storage.has(&keys::chain::block(1)).await.unwrap());
    }
}
