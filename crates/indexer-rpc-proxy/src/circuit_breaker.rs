//! Circuit breaker (spec §4.5 "Circuit breaker").

use indexer_core::metrics::IndexerMetrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    last_state_change: Instant,
    half_open_in_flight: u32,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failures: AtomicU32,
    half_open_successes: AtomicU32,
    max_failures: u32,
    reset_timeout: Duration,
    half_open_requests: u32,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration, half_open_requests: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                last_state_change: Instant::now(),
                half_open_in_flight: 0,
            }),
            failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            max_failures,
            reset_timeout,
            half_open_requests,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a new request may proceed. OPEN transitions to HALF_OPEN
    /// once `reset_timeout` has elapsed; only `half_open_requests`
    /// concurrent probes are allowed in HALF_OPEN.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if inner.last_state_change.elapsed() >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.last_state_change = Instant::now();
                    inner.half_open_in_flight = 1;
                    self.half_open_successes.store(0, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight < self.half_open_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                self.failures.store(0, Ordering::Relaxed);
            }
            BreakerState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.half_open_requests {
                    inner.state = BreakerState::Closed;
                    inner.last_state_change = Instant::now();
                    self.failures.store(0, Ordering::Relaxed);
                    self.half_open_successes.store(0, Ordering::Relaxed);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.max_failures {
                    inner.state = BreakerState::Open;
                    inner.last_state_change = Instant::now();
                    IndexerMetrics::circuit_breaker_trip();
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.last_state_change = Instant::now();
                inner.half_open_in_flight = 0;
                self.half_open_successes.store(0, Ordering::Relaxed);
                IndexerMetrics::circuit_breaker_trip();
            }
            BreakerState::Open => {}
        }
    }
}
