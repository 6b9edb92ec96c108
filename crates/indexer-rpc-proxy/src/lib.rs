//! RPC proxy layer (spec §4.5): a bounded priority queue feeding a
//! worker pool, fronted by a circuit breaker, a rate limiter, and an
//! LRU+TTL cache.

pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod priority_queue;
pub mod rate_limiter;
pub mod trace;
pub mod worker_pool;

pub use cache::{TtlCache, TtlPolicy};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use error::ProxyError;
pub use priority_queue::{Priority, PriorityQueue};
pub use rate_limiter::RateLimiter;
pub use trace::{decode_call_trace, InternalTransaction, TraceError};
pub use worker_pool::{QueuedRequest, WorkerPoolConfig};

use indexer_core::metrics::IndexerMetrics;
use indexer_core::rpc::RpcClient;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct RpcProxyConfig {
    pub queue_capacity: usize,
    pub cache_size: usize,
    pub requests_per_second: f64,
    pub burst_size: f64,
    pub per_ip_rate: Option<f64>,
    pub max_failures: u32,
    pub reset_timeout: Duration,
    pub half_open_requests: u32,
    pub pool: WorkerPoolConfig,
}

impl Default for RpcProxyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            cache_size: 10_000,
            requests_per_second: 50.0,
            burst_size: 100.0,
            per_ip_rate: None,
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_requests: 3,
            pool: WorkerPoolConfig::default(),
        }
    }
}

/// Orchestrates the full request-dispatch contract: rate-limit check,
/// circuit-breaker check, cache probe, queued dispatch on miss, and
/// result recording.
pub struct RpcProxyService {
    queue: Arc<PriorityQueue<QueuedRequest>>,
    cache: TtlCache<Value>,
    breaker: Arc<CircuitBreaker>,
    limiter: RateLimiter,
    workers: Vec<tokio::task::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RpcProxyService {
    pub fn new(rpc: Arc<dyn RpcClient>, config: RpcProxyConfig) -> Self {
        let queue = PriorityQueue::new(config.queue_capacity);
        let cancel = CancellationToken::new();
        let workers = worker_pool::spawn(queue.clone(), rpc, config.pool, cancel.clone());
        Self {
            queue,
            cache: TtlCache::new(config.cache_size),
            breaker: Arc::new(CircuitBreaker::new(
                config.max_failures,
                config.reset_timeout,
                config.half_open_requests,
            )),
            limiter: RateLimiter::new(config.requests_per_second, config.burst_size, config.per_ip_rate),
            workers,
            cancel,
        }
    }

    /// Dispatches a JSON-RPC call through the full proxy pipeline. When
    /// `ttl` is `Some`, a cache hit short-circuits the queue entirely;
    /// a miss is cached under that policy once the call succeeds.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        priority: Priority,
        ttl: Option<TtlPolicy>,
        ip: Option<IpAddr>,
    ) -> Result<Value, ProxyError> {
        if !self.limiter.allow(ip) {
            return Err(ProxyError::RateLimited);
        }
        if !self.breaker.allow() {
            return Err(ProxyError::CircuitOpen);
        }

        let cache_key = ttl.map(|_| cache_key(method, &params));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                IndexerMetrics::cache_hit();
                self.breaker.record_success();
                return Ok(cached);
            }
            IndexerMetrics::cache_miss();
        }

        let started = Instant::now();
        let result = self.dispatch(method, params, priority).await;
        let _elapsed = started.elapsed();

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }

        if let (Ok(value), Some(key), Some(policy)) = (&result, &cache_key, ttl) {
            self.cache.set(key.clone(), value.clone(), policy.duration());
        }
        result
    }

    async fn dispatch(&self, method: &str, params: Value, priority: Priority) -> Result<Value, ProxyError> {
        let (tx, rx) = oneshot::channel();
        let enqueued = self.queue.enqueue(
            priority,
            QueuedRequest { method: method.to_string(), params, response: tx },
        );
        if !enqueued {
            IndexerMetrics::queue_dropped();
            return Err(ProxyError::QueueFull);
        }
        match rx.await {
            Ok(result) => result.map_err(ProxyError::from),
            Err(_) => Err(ProxyError::Upstream("worker dropped response channel".into())),
        }
    }

    /// Removes every expired cache entry. Intended to run on a
    /// per-minute interval (spec §4.5 "Cleanup goroutine").
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn queue_dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.queue.close();
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!("worker task panicked during shutdown: {e}");
            }
        }
    }
}

fn cache_key(method: &str, params: &Value) -> String {
    format!("{method}:{params}")
}
