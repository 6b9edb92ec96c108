//! Fixed-size worker pool draining the priority queue (spec §4.5
//! "Worker pool").

use crate::priority_queue::PriorityQueue;
use indexer_core::rpc::{RpcClient, RpcError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Queued unit of work: a raw JSON-RPC call plus the channel its
/// caller is waiting on.
pub struct QueuedRequest {
    pub method: String,
    pub params: Value,
    pub response: oneshot::Sender<Result<Value, RpcError>>,
}

pub struct WorkerPoolConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(250),
        }
    }
}

/// Spawns `config.workers` tasks, each pulling from `queue` and
/// dispatching through `rpc`. Retries non-timeout failures with
/// exponential backoff; a request that only ever times out is reported
/// as a timeout to its caller.
pub fn spawn(
    queue: Arc<PriorityQueue<QueuedRequest>>,
    rpc: Arc<dyn RpcClient>,
    config: WorkerPoolConfig,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..config.workers)
        .map(|id| {
            let queue = queue.clone();
            let rpc = rpc.clone();
            let cancel = cancel.clone();
            let retry_delay = config.retry_delay;
            let max_retries = config.max_retries;
            let request_timeout = config.request_timeout;
            let poll_timeout = config.poll_timeout;
            tokio::spawn(async move {
                loop {
                    let request = tokio::select! {
                        _ = cancel.cancelled() => break,
                        res = tokio::time::timeout(poll_timeout, queue.dequeue()) => match res {
                            Ok(req) => req,
                            Err(_elapsed) => continue,
                        },
                    };
                    let Some(request) = request else { break };
                    let result = dispatch_with_retry(
                        rpc.as_ref(),
                        &request.method,
                        request.params.clone(),
                        max_retries,
                        retry_delay,
                        request_timeout,
                    )
                    .await;
                    if request.response.send(result).is_err() {
                        warn!(worker = id, "caller dropped before response delivered");
                    }
                }
            })
        })
        .collect()
}

async fn dispatch_with_retry(
    rpc: &dyn RpcClient,
    method: &str,
    params: Value,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
) -> Result<Value, RpcError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let call = rpc.call(method, params.clone());
        let outcome = tokio::time::timeout(request_timeout, call).await;
        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(RpcError::RateLimited)) | Ok(Err(RpcError::NotFound)) => {
                return outcome.unwrap();
            }
            Ok(Err(_)) if attempt <= max_retries => {
                tokio::time::sleep(retry_delay * 2u32.pow(attempt - 1)).await;
            }
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) if attempt <= max_retries => {
                tokio::time::sleep(retry_delay * 2u32.pow(attempt - 1)).await;
            }
            Err(_elapsed) => return Err(RpcError::Timeout),
        }
    }
}
