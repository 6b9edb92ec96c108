//! Process-wide metric name constants and thin recording helpers, in the
//! shape of the teacher's `ApiMetrics` (grounded on
//! `sidecar/src/metrics/mod.rs`): counters/gauges/histograms are declared
//! once here and every subsystem calls the small free functions below
//! rather than reaching for the `metrics` macros directly.

use eyre::{bail, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

const BLOCKS_PROCESSED: &str = "indexer_blocks_processed_total";
const BLOCKS_FAILED: &str = "indexer_blocks_failed_total";
const RPC_ERRORS: &str = "indexer_rpc_errors_total";
const WATCHLIST_EVENTS: &str = "indexer_watchlist_events_total";
const GAP_BLOCKS_FILLED: &str = "indexer_gap_blocks_filled_total";
const CIRCUIT_BREAKER_TRIPS: &str = "indexer_circuit_breaker_trips_total";
const CACHE_HITS: &str = "indexer_cache_hits_total";
const CACHE_MISSES: &str = "indexer_cache_misses_total";
const QUEUE_DROPPED: &str = "indexer_queue_dropped_total";

const LATEST_HEIGHT: &str = "indexer_latest_height";
const WORKER_COUNT: &str = "indexer_worker_count";
const BATCH_SIZE: &str = "indexer_batch_size";

const BLOCK_PROCESS_SECONDS: &str = "indexer_block_process_duration_seconds";
const RPC_CALL_SECONDS: &str = "indexer_rpc_call_duration_seconds";

pub struct IndexerMetrics;

impl IndexerMetrics {
    pub fn describe_all() {
        describe_counter!(BLOCKS_PROCESSED, "Total blocks fully processed");
        describe_counter!(BLOCKS_FAILED, "Total blocks that exhausted their retry budget");
        describe_counter!(RPC_ERRORS, "Total RPC call failures");
        describe_counter!(WATCHLIST_EVENTS, "Total watchlist events emitted");
        describe_counter!(GAP_BLOCKS_FILLED, "Total blocks backfilled by gap recovery");
        describe_counter!(CIRCUIT_BREAKER_TRIPS, "Total circuit breaker OPEN transitions");
        describe_counter!(CACHE_HITS, "Total RPC proxy cache hits");
        describe_counter!(CACHE_MISSES, "Total RPC proxy cache misses");
        describe_counter!(QUEUE_DROPPED, "Total requests dropped from a full priority queue");

        describe_gauge!(LATEST_HEIGHT, "Latest persisted block height");
        describe_gauge!(WORKER_COUNT, "Current ingestion worker count");
        describe_gauge!(BATCH_SIZE, "Current ingestion batch size");

        describe_histogram!(BLOCK_PROCESS_SECONDS, "Per-block processing duration");
        describe_histogram!(RPC_CALL_SECONDS, "Per-call RPC latency");
    }

    pub fn block_processed() {
        counter!(BLOCKS_PROCESSED).increment(1);
    }

    pub fn block_failed() {
        counter!(BLOCKS_FAILED).increment(1);
    }

    pub fn rpc_error(kind: &'static str) {
        counter!(RPC_ERRORS, &[("kind", kind)]).increment(1);
    }

    pub fn watchlist_event(event_type: &'static str) {
        counter!(WATCHLIST_EVENTS, &[("type", event_type)]).increment(1);
    }

    pub fn gap_blocks_filled(count: u64) {
        counter!(GAP_BLOCKS_FILLED).increment(count);
    }

    pub fn circuit_breaker_trip() {
        counter!(CIRCUIT_BREAKER_TRIPS).increment(1);
    }

    pub fn cache_hit() {
        counter!(CACHE_HITS).increment(1);
    }

    pub fn cache_miss() {
        counter!(CACHE_MISSES).increment(1);
    }

    pub fn queue_dropped() {
        counter!(QUEUE_DROPPED).increment(1);
    }

    pub fn set_latest_height(height: u64) {
        gauge!(LATEST_HEIGHT).set(height as f64);
    }

    pub fn set_worker_count(count: usize) {
        gauge!(WORKER_COUNT).set(count as f64);
    }

    pub fn set_batch_size(size: usize) {
        gauge!(BATCH_SIZE).set(size as f64);
    }

    pub fn observe_block_process(duration: Duration) {
        histogram!(BLOCK_PROCESS_SECONDS).record(duration.as_secs_f64());
    }

    pub fn observe_rpc_call(method: &'static str, duration: Duration) {
        histogram!(RPC_CALL_SECONDS, &[("method", method)]).record(duration.as_secs_f64());
    }
}

/// Starts the Prometheus HTTP listener and registers every metric
/// description. Mirrors `sidecar::metrics::run_metrics_server`.
pub fn run_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    if let Err(e) = builder.install() {
        bail!("failed to install prometheus exporter: {e:?}");
    }
    info!("metrics server listening on http://{addr}");

    IndexerMetrics::describe_all();
    Ok(())
}
