//! Binary entry point: wires configuration, logging, the RPC adapter,
//! storage, the watchlist service, and the Fetcher, then dispatches the
//! `run` / `detect-gaps` / `fill-gaps` subcommand surface.

mod config;
mod rpc_adapter;

use config::{Command, Config};
use indexer_core::event_bus::BroadcastEventBus;
use indexer_core::metrics::IndexerMetrics;
use indexer_core::test_support::InMemoryStorage;
use indexer_watchlist::{NullTransport, WatchlistService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Config::parse_from_cli()?;
    init_tracing(&config.log_level);
    indexer_consensus::registry::register();

    IndexerMetrics::describe_all();
    if let Err(e) = indexer_core::metrics::run_metrics_server(config.metrics_port) {
        tracing::warn!(error = %e, "metrics server failed to start");
    }

    // Storage is an external collaborator the ingestion pipeline only
    // specifies the trait for; this binary defaults to the in-memory
    // implementation shipped for tests until a durable backend is wired
    // up behind the same `Storage` trait.
    let storage = InMemoryStorage::new();
    let rpc: Arc<dyn indexer_core::rpc::RpcClient> =
        Arc::new(rpc_adapter::HttpRpcClient::new(config.rpc_url.clone()));
    let event_bus = Arc::new(BroadcastEventBus::new(1024));
    let watchlist = Arc::new(WatchlistService::new(
        storage.clone(),
        event_bus.clone(),
        Arc::new(NullTransport),
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    match config.command.clone() {
        Command::Run => run(config, storage, rpc, event_bus, watchlist, cancel).await,
        Command::DetectGaps { lo, hi } => detect_gaps(storage, rpc, lo, hi, &cancel).await,
        Command::FillGaps { lo, hi } => fill_gaps(storage, rpc, lo, hi, &cancel).await,
    }
}

async fn run(
    config: Config,
    storage: Arc<dyn indexer_core::storage::Storage>,
    rpc: Arc<dyn indexer_core::rpc::RpcClient>,
    event_bus: Arc<dyn indexer_core::event_bus::EventBus>,
    watchlist: Arc<WatchlistService>,
    cancel: CancellationToken,
) -> eyre::Result<()> {
    let repair_config = config::default_repair_config();
    indexer_gap::run_with_gap_recovery(&storage, &rpc, config.start_height, &repair_config, &cancel)
        .await;

    let fetcher = indexer_ingestion::Fetcher::new(rpc, storage, event_bus, watchlist, config.fetcher);
    let outcome = fetcher.run(config.start_height, cancel).await;
    tracing::warn!(error = %outcome, "ingestion loop exited");
    Ok(())
}

async fn detect_gaps(
    storage: Arc<dyn indexer_core::storage::Storage>,
    rpc: Arc<dyn indexer_core::rpc::RpcClient>,
    lo: u64,
    hi: u64,
    cancel: &CancellationToken,
) -> eyre::Result<()> {
    let _ = &rpc;
    let block_gaps = indexer_gap::detect_block_gaps(&storage, lo, hi, cancel).await?;
    let receipt_gaps = indexer_gap::detect_receipt_gaps(&storage, lo, hi, cancel).await?;
    for gap in &block_gaps {
        println!("block gap: {}..={} ({} blocks)", gap.start, gap.end, gap.len());
    }
    for gap in &receipt_gaps {
        println!("receipt gap: block {} missing {} receipt(s)", gap.block, gap.missing_hashes.len());
    }
    if block_gaps.is_empty() && receipt_gaps.is_empty() {
        println!("no gaps in [{lo}, {hi}]");
    }
    Ok(())
}

async fn fill_gaps(
    storage: Arc<dyn indexer_core::storage::Storage>,
    rpc: Arc<dyn indexer_core::rpc::RpcClient>,
    lo: u64,
    hi: u64,
    cancel: &CancellationToken,
) -> eyre::Result<()> {
    let repair_config = config::default_repair_config();
    let block_gaps = indexer_gap::detect_block_gaps(&storage, lo, hi, cancel).await?;
    for gap in &block_gaps {
        indexer_gap::fill_gap(gap.clone(), &rpc, &storage, &repair_config).await?;
        indexer_core::metrics::IndexerMetrics::gap_blocks_filled(gap.len());
    }

    let receipt_gaps = indexer_gap::detect_receipt_gaps(&storage, lo, hi, cancel).await?;
    for gap in &receipt_gaps {
        indexer_gap::fill_receipt_gap(gap, &rpc, &storage).await?;
    }

    println!(
        "filled {} block gap(s) and {} receipt gap(s) in [{lo}, {hi}]",
        block_gaps.len(),
        receipt_gaps.len()
    );
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
