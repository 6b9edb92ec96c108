//! The Fetcher: top of the ingestion pipeline (spec §4.1).
//!
//! Drives `height planner -> worker pool -> per-block processor ->
//! storage writer -> event publisher` in height order, persisting the
//! "latest height" marker only after a block's full pipeline succeeds.

use crate::balances::apply_transaction_delta;
use crate::error::IngestionError;
use crate::optimizer::{AdaptiveOptimizer, OptimizerConfig, Sample};
use crate::setcode;
use crate::transfers::{self, TransferRecord};
use futures::stream::{FuturesUnordered, StreamExt};
use indexer_consensus::{ConsensusConfig, ParsedConsensus, ValidatorSetCache};
use indexer_core::consensus_types::ConsensusSeverity;
use indexer_core::event_bus::{EventBus, IndexerEvent};
use indexer_core::keys;
use indexer_core::metrics::IndexerMetrics;
use indexer_core::rpc::RpcClient;
use indexer_core::storage::{typed, Storage};
use indexer_core::types::{Block, Receipt, TxTypeTag};
use indexer_watchlist::WatchlistService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SEQUENTIAL_THRESHOLD: u64 = 10;

/// Whether the chain this Fetcher is wired to runs WBFT consensus. When
/// `false`, step 3 of the per-block algorithm (spec §4.1) is skipped
/// entirely rather than attempting to decode non-WBFT extra-data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusKind {
    Wbft,
    None,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub chain_id: u64,
    pub consensus: ConsensusKind,
    pub consensus_config: ConsensusConfig,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub optimizer: OptimizerConfig,
    pub initial_workers: usize,
    pub initial_batch_size: usize,
    /// How often `run` samples the optimizer against recent throughput.
    pub optimizer_sample_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            consensus: ConsensusKind::Wbft,
            consensus_config: ConsensusConfig::default(),
            max_retries: 5,
            retry_delay: Duration::from_millis(200),
            optimizer: OptimizerConfig::default(),
            initial_workers: 4,
            initial_batch_size: 50,
            optimizer_sample_interval: Duration::from_secs(30),
        }
    }
}

/// Drives block ingestion in height order (spec §4.1).
pub struct Fetcher {
    rpc: Arc<dyn RpcClient>,
    storage: Arc<dyn Storage>,
    event_bus: Arc<dyn EventBus>,
    watchlist: Arc<WatchlistService>,
    config: FetcherConfig,
    optimizer: AdaptiveOptimizer,
    validator_cache: ValidatorSetCache,
}

impl Fetcher {
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        storage: Arc<dyn Storage>,
        event_bus: Arc<dyn EventBus>,
        watchlist: Arc<WatchlistService>,
        config: FetcherConfig,
    ) -> Self {
        let optimizer = AdaptiveOptimizer::new(
            config.optimizer.clone(),
            config.initial_workers,
            config.initial_batch_size,
        );
        Self {
            rpc,
            storage,
            event_bus,
            watchlist,
            config,
            optimizer,
            validator_cache: ValidatorSetCache::new(),
        }
    }

    /// Reads the persisted "latest height" marker, or `None` if nothing
    /// has been persisted yet.
    pub async fn latest_height(&self) -> Result<Option<u64>, IngestionError> {
        Ok(typed::get_json(&self.storage, keys::chain::latest_height()).await?)
    }

    /// Runs until `cancel` fires. Maintains `next_height`, plans a batch
    /// bounded by the optimizer's current batch size, dispatches it, and
    /// advances. Returns the cancellation error (spec §4.1 `run`).
    pub async fn run(&self, start_height: u64, cancel: CancellationToken) -> IngestionError {
        let mut next_height = match self.latest_height().await {
            Ok(Some(h)) => h + 1,
            Ok(None) => start_height,
            Err(e) => {
                error!(error = %e, "failed to read latest height, starting from configured start");
                start_height
            }
        };
        let mut last_sample = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return IngestionError::Cancelled;
            }

            let tip = match self.rpc.block_number().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, "failed to fetch chain tip, backing off");
                    IndexerMetrics::rpc_error("block_number");
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            };

            if next_height > tip {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }

            let batch_size = self.optimizer.batch_size() as u64;
            let hi = next_height.saturating_add(batch_size.saturating_sub(1)).min(tip);

            let started = Instant::now();
            let blocks_in_range = (hi - next_height + 1).max(1) as u32;
            match self.fetch_range(&cancel, next_height, hi).await {
                Ok(()) => {
                    next_height = hi + 1;
                    if last_sample.elapsed() >= self.config.optimizer_sample_interval {
                        self.optimizer.record_sample(Sample {
                            error_rate: 0.0,
                            avg_latency: started.elapsed() / blocks_in_range,
                            rate_limited: false,
                            consecutive_errors: 0,
                        });
                        IndexerMetrics::set_worker_count(self.optimizer.workers());
                        IndexerMetrics::set_batch_size(self.optimizer.batch_size());
                        last_sample = Instant::now();
                    }
                }
                Err(e) => {
                    error!(lo = next_height, hi, error = %e, "range fetch exhausted retry budget");
                    self.optimizer.record_sample(Sample {
                        error_rate: 1.0,
                        avg_latency: started.elapsed(),
                        rate_limited: false,
                        consecutive_errors: 1,
                    });
                }
            }
        }
    }

    /// Synchronous, inclusive range fetch: sequential for small ranges,
    /// concurrent otherwise (spec §4.1 `fetch_range`).
    pub async fn fetch_range(
        &self,
        cancel: &CancellationToken,
        lo: u64,
        hi: u64,
    ) -> Result<(), IngestionError> {
        if hi < lo {
            return Ok(());
        }
        if hi - lo + 1 <= SEQUENTIAL_THRESHOLD {
            for height in lo..=hi {
                if cancel.is_cancelled() {
                    return Err(IngestionError::Cancelled);
                }
                self.process_height_with_retry(height).await?;
            }
            Ok(())
        } else {
            self.fetch_range_concurrent(cancel, lo, hi).await
        }
    }

    /// Shards `[lo, hi]` across the optimizer's current worker
    /// recommendation (spec §4.1 `fetch_range_concurrent`). A partial
    /// range is never silently abandoned: the first per-block failure
    /// that exhausts its retry budget aborts the whole range.
    pub async fn fetch_range_concurrent(
        &self,
        cancel: &CancellationToken,
        lo: u64,
        hi: u64,
    ) -> Result<(), IngestionError> {
        let workers = self.optimizer.workers().max(1);
        let mut tasks = FuturesUnordered::new();
        let mut next = lo;
        let mut in_flight = 0usize;

        while next <= hi || in_flight > 0 {
            if cancel.is_cancelled() {
                return Err(IngestionError::Cancelled);
            }
            while in_flight < workers && next <= hi {
                let height = next;
                tasks.push(async move { (height, self.process_height_with_retry(height).await) });
                next += 1;
                in_flight += 1;
            }

            if let Some((height, result)) = tasks.next().await {
                in_flight -= 1;
                if let Err(e) = result {
                    error!(height, error = %e, "block exhausted retry budget, aborting range");
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn process_height_with_retry(&self, height: u64) -> Result<(), IngestionError> {
        let mut attempt = 0u32;
        loop {
            match self.process_height(height).await {
                Ok(()) => {
                    IndexerMetrics::block_processed();
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        IndexerMetrics::block_failed();
                        return Err(IngestionError::RetryBudgetExhausted(height));
                    }
                    warn!(height, attempt, error = %e, "retrying block processing");
                    tokio::time::sleep(self.config.retry_delay * 2u32.pow(attempt.saturating_sub(1))).await;
                }
            }
        }
    }

    /// Per-block processing, deterministic ordering (spec §4.1 algorithm).
    async fn process_height(&self, height: u64) -> Result<(), IngestionError> {
        let started = Instant::now();

        let block = self
            .rpc
            .get_block_by_number(height)
            .await?
            .ok_or(indexer_core::rpc::RpcError::NotFound)?;
        let receipts = self.rpc.get_block_receipts(height).await?;
        let receipts_by_hash: HashMap<_, _> =
            receipts.iter().map(|r| (r.tx_hash, r.clone())).collect();

        self.persist_block_and_receipts(&block, &receipts).await?;

        // Step 3: consensus processing (WBFT only).
        if self.config.consensus == ConsensusKind::Wbft {
            self.process_consensus(&block).await?;
        }

        // Steps 4-5: per-transaction address/balance/transfer/SetCode
        // processing, in transaction index order (spec §5 ordering
        // guarantees).
        for tx in &block.transactions {
            let receipt = receipts_by_hash.get(&tx.hash);
            self.process_transaction(&block, tx, receipt).await;
        }

        // Step 6: watchlist matching.
        if let Err(e) = self.watchlist.process_block(self.config.chain_id, height, &block.transactions, &receipts).await {
            warn!(height, error = %e, "watchlist matching failed for block");
        }

        // Step 7: per-tx event already published inline above; publish
        // the block-complete marker last so consumers can rely on it as
        // a watermark.
        self.event_bus.publish(IndexerEvent::BlockProcessed { height });

        // Advance the latest-height marker only after the full pipeline
        // succeeded (spec §4.1 step 2, §5 ordering guarantees).
        typed::put_json(&self.storage, keys::chain::latest_height(), &height).await?;
        IndexerMetrics::set_latest_height(height);
        IndexerMetrics::observe_block_process(started.elapsed());
        debug!(height, txs = block.transactions.len(), "block processed");
        Ok(())
    }

    async fn persist_block_and_receipts(
        &self,
        block: &Block,
        receipts: &[Receipt],
    ) -> Result<(), IngestionError> {
        let tx_hashes: Vec<_> = receipts.iter().map(|r| r.tx_hash).collect();
        let mut batch = self.storage.new_batch();
        batch.put(&keys::chain::block(block.number), serde_json::to_vec(block).unwrap());
        batch.put(&keys::chain::block_hash_index(block.hash), serde_json::to_vec(&block.number).unwrap());
        batch.put(&keys::chain::block_tx_hashes(block.number), serde_json::to_vec(&tx_hashes).unwrap());
        for receipt in receipts {
            batch.put(&keys::chain::receipt(receipt.tx_hash), serde_json::to_vec(receipt).unwrap());
        }
        batch.commit().await?;
        Ok(())
    }

    async fn process_consensus(&self, block: &Block) -> Result<(), IngestionError> {
        let parsed: ParsedConsensus = indexer_consensus::process_block(
            block,
            &self.config.consensus_config,
            &self.validator_cache,
        )?;

        let Some(data) = parsed.data else {
            debug!(height = block.number, error = ?parsed.decode_error, "block carries no WBFT consensus data");
            return Ok(());
        };

        typed::put_json(&self.storage, &keys::chain::consensus(block.number), &data).await?;

        if data.is_epoch_boundary {
            if let Some(epoch_info) = &data.epoch_info {
                let epoch_number = block.number / self.config.consensus_config.epoch_length;
                typed::put_json(&self.storage, &keys::chain::epoch_info(epoch_number), epoch_info).await?;
                self.event_bus.publish(IndexerEvent::ValidatorChange {
                    height: block.number,
                    epoch_number,
                });
            }
        }

        for validator in &data.commit_signers {
            let activity = indexer_core::consensus_types::ValidatorSigningActivity {
                block: block.number,
                validator_address: *validator,
                validator_index: data
                    .validators
                    .iter()
                    .position(|v| v == validator)
                    .unwrap_or(0) as u32,
                signed_prepare: data.prepare_signers.contains(validator),
                signed_commit: true,
                round: data.round,
            };
            typed::put_json(
                &self.storage,
                &keys::chain::validator_activity(block.number, *validator),
                &activity,
            )
            .await?;
        }

        if let Some(severity) = parsed.severity {
            self.event_bus.publish(IndexerEvent::ConsensusError { height: block.number, severity });
            log_consensus_severity(block.number, severity);
        }

        self.event_bus.publish(IndexerEvent::ConsensusBlock(data));
        Ok(())
    }

    async fn process_transaction(&self, block: &Block, tx: &indexer_core::types::Transaction, receipt: Option<&Receipt>) {
        // 4a: reverse indexes for sender/receiver/fee-payer.
        let mut batch = self.storage.new_batch();
        batch.put(&keys::chain::tx_by_address(tx.from, tx.hash), serde_json::to_vec(&tx.hash).unwrap());
        if let Some(to) = tx.to {
            batch.put(&keys::chain::tx_by_address(to, tx.hash), serde_json::to_vec(&tx.hash).unwrap());
        }
        if let Some(fee_payer) = tx.fee_payer {
            batch.put(&keys::chain::tx_by_address(fee_payer, tx.hash), serde_json::to_vec(&tx.hash).unwrap());
        }
        if let Err(e) = batch.commit().await {
            warn!(tx = %tx.hash, error = %e, "failed to persist reverse tx index");
        }

        // 4d: SetCode authorization processing (type 0x04 = EIP-7702).
        if tx.tx_type == TxTypeTag::SetCode {
            let mut batch = self.storage.new_batch();
            if let Err(e) = setcode::apply_setcode_authorizations(batch.as_mut(), tx) {
                warn!(tx = %tx.hash, error = %e, "SetCode authorization processing failed");
            } else if let Err(e) = batch.commit().await {
                warn!(tx = %tx.hash, error = %e, "failed to persist SetCode authorizations");
            }
        }

        if let Some(receipt) = receipt {
            // 4b: Transfer log decoding, ERC-20/721 persistence.
            let mut batch = self.storage.new_batch();
            for log in &receipt.logs {
                if let Some(record) = transfers::decode_transfer_log(log, block.timestamp) {
                    transfers::persist_transfer(batch.as_mut(), &record);
                    self.event_bus.publish(match &record {
                        TransferRecord::Erc20(t) => IndexerEvent::Erc20Transfer(t.clone()),
                        TransferRecord::Erc721(t) => IndexerEvent::Erc721Transfer(t.clone()),
                    });
                }
                self.event_bus.publish(IndexerEvent::Log(log.clone()));
            }
            if let Err(e) = batch.commit().await {
                warn!(tx = %tx.hash, error = %e, "failed to persist decoded transfers");
            }

            // 4c: contract creation + token metadata indexing.
            if tx.is_contract_creation() {
                let mut batch = self.storage.new_batch();
                let created = transfers::record_contract_creation(batch.as_mut(), tx, receipt, block.timestamp);
                if let Err(e) = batch.commit().await {
                    warn!(tx = %tx.hash, error = %e, "failed to persist contract creation");
                } else if let Some(created) = created {
                    self.event_bus.publish(IndexerEvent::ContractCreation(created.clone()));
                    if let Err(e) =
                        transfers::index_token_metadata(&self.storage, &self.rpc, created.contract_address).await
                    {
                        warn!(contract = %created.contract_address, error = %e, "token metadata indexing failed");
                    }
                }
            }

            // Step 5: balance tracking (best-effort).
            apply_transaction_delta(
                &self.storage,
                &self.rpc,
                block.number,
                tx.from,
                tx.to.or(receipt.contract_address),
                tx.value,
                receipt.gas_used,
                receipt.effective_gas_price,
            )
            .await;
        }

        self.event_bus.publish(IndexerEvent::Transaction(tx.clone()));
    }
}

fn log_consensus_severity(height: u64, severity: ConsensusSeverity) {
    match severity {
        ConsensusSeverity::Low => debug!(height, ?severity, "consensus participation below full"),
        ConsensusSeverity::Medium => warn!(height, ?severity, "consensus participation degraded"),
        ConsensusSeverity::High | ConsensusSeverity::Critical => {
            error!(height, ?severity, "consensus participation critically degraded")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticRpc;
    use alloy::primitives::{address, Bytes, B256};
    use indexer_core::event_bus::BroadcastEventBus;
    use indexer_core::test_support::InMemoryStorage;
    use indexer_core::types::{Block, Transaction, TxTypeTag};
    use indexer_watchlist::NullTransport;

    fn sample_block(number: u64) -> Block {
        Block {
            number,
            hash: B256::repeat_byte(number as u8),
            parent_hash: B256::ZERO,
            proposer: address!("1111111111111111111111111111111111111111"),
            timestamp: 1_700_000_000 + number,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            extra_data: Bytes::new(),
            transactions: vec![Transaction {
                hash: B256::repeat_byte(number as u8 + 1),
                tx_type: TxTypeTag::Legacy,
                tx_index: 0,
                block_number: number,
                from: address!("2222222222222222222222222222222222222222"),
                to: Some(address!("3333333333333333333333333333333333333333")),
                value: alloy::primitives::U256::from(1u64),
                gas: 21_000,
                gas_price: 1,
                data: Bytes::new(),
                chain_id: Some(1),
                fee_payer: None,
                authorization_list: vec![],
            }],
        }
    }

    fn build_fetcher(blocks: Vec<Block>) -> Fetcher {
        let storage: Arc<dyn Storage> = InMemoryStorage::new();
        let rpc: Arc<dyn RpcClient> = Arc::new(StaticRpc::with_blocks(blocks));
        let bus: Arc<dyn EventBus> = Arc::new(BroadcastEventBus::new(1024));
        let watchlist = Arc::new(WatchlistService::new(storage.clone(), bus.clone(), Arc::new(NullTransport)));
        let mut config = FetcherConfig::default();
        config.consensus = ConsensusKind::None;
        Fetcher::new(rpc, storage, bus, watchlist, config)
    }

    #[tokio::test]
    async fn fetch_range_sequential_persists_every_block_and_advances_marker() {
        let blocks: Vec<_> = (1..=5).map(sample_block).collect();
        let fetcher = build_fetcher(blocks);
        let cancel = CancellationToken::new();
        fetcher.fetch_range(&cancel, 1, 5).await.unwrap();

        for h in 1..=5 {
            assert!(fetcher.storage.has(&keys::chain::block(h)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn fetch_range_concurrent_persists_every_block() {
        let blocks: Vec<_> = (1..=20).map(sample_block).collect();
        let fetcher = build_fetcher(blocks);
        let cancel = CancellationToken::new();
        fetcher.fetch_range_concurrent(&cancel, 1, 20).await.unwrap();

        for h in 1..=20 {
            assert!(fetcher.storage.has(&keys::chain::block(h)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn process_height_advances_latest_height_marker() {
        let fetcher = build_fetcher(vec![sample_block(1)]);
        fetcher.process_height(1).await.unwrap();
        assert_eq!(fetcher.latest_height().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn process_height_indexes_reverse_tx_lookup() {
        let fetcher = build_fetcher(vec![sample_block(1)]);
        fetcher.process_height(1).await.unwrap();
        let sender = address!("2222222222222222222222222222222222222222");
        assert!(fetcher.storage.has(&keys::chain::tx_by_address(sender, B256::repeat_byte(2))).await.unwrap());
    }

    #[tokio::test]
    async fn missing_block_fails_and_does_not_advance_marker() {
        let fetcher = build_fetcher(vec![]);
        let cancel = CancellationToken::new();
        let result = fetcher.fetch_range(&cancel, 1, 1).await;
        assert!(result.is_err());
        assert_eq!(fetcher.latest_height().await.unwrap(), None);
    }
}
