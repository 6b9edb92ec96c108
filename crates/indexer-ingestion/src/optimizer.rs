//! Adaptive worker/batch-size optimizer (spec §4.1 "Adaptive optimizer").

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub worker_increase_factor: f64,
    pub worker_decrease_factor: f64,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub batch_increase_factor: f64,
    pub batch_decrease_factor: f64,
    pub max_error_rate: f64,
    pub target_error_rate: f64,
    pub target_response_time: Duration,
    pub consecutive_error_threshold: u32,
    pub adjustment_interval: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 32,
            worker_increase_factor: 1.5,
            worker_decrease_factor: 0.5,
            min_batch_size: 1,
            max_batch_size: 500,
            batch_increase_factor: 1.5,
            batch_decrease_factor: 0.5,
            max_error_rate: 0.1,
            target_error_rate: 0.01,
            target_response_time: Duration::from_millis(500),
            consecutive_error_threshold: 5,
            adjustment_interval: Duration::from_secs(30),
        }
    }
}

/// Rolling window of recent RPC call outcomes the optimizer reads from
/// (spec §4.1: "reads live RPC metrics").
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    pub error_rate: f64,
    pub avg_latency: Duration,
    pub rate_limited: bool,
    pub consecutive_errors: u32,
}

struct State {
    workers: usize,
    batch_size: usize,
    last_adjustment: Option<Instant>,
}

/// Adjusts worker count and batch size within configured bounds based on
/// the latest `Sample`. Never acts twice within `adjustment_interval`.
pub struct AdaptiveOptimizer {
    config: OptimizerConfig,
    state: Mutex<State>,
}

impl AdaptiveOptimizer {
    pub fn new(config: OptimizerConfig, initial_workers: usize, initial_batch_size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                workers: initial_workers.clamp(config.min_workers, config.max_workers),
                batch_size: initial_batch_size.clamp(config.min_batch_size, config.max_batch_size),
                last_adjustment: None,
            }),
            config,
        }
    }

    pub fn workers(&self) -> usize {
        self.state.lock().workers
    }

    pub fn batch_size(&self) -> usize {
        self.state.lock().batch_size
    }

    /// Applies the spec's adjustment rules in order; at most one rule
    /// fires per call, and only if `adjustment_interval` has elapsed
    /// since the last adjustment.
    pub fn record_sample(&self, sample: Sample) {
        let mut state = self.state.lock();
        if let Some(last) = state.last_adjustment {
            if last.elapsed() < self.config.adjustment_interval {
                return;
            }
        }

        let cfg = &self.config;
        let degraded = sample.rate_limited || sample.consecutive_errors >= cfg.consecutive_error_threshold;

        let new_workers = if degraded {
            scale(state.workers, cfg.worker_decrease_factor, cfg.min_workers, cfg.max_workers)
        } else if sample.error_rate > cfg.max_error_rate {
            scale(state.workers, cfg.worker_decrease_factor, cfg.min_workers, cfg.max_workers)
        } else if sample.error_rate < cfg.target_error_rate && sample.avg_latency < cfg.target_response_time {
            scale(state.workers, cfg.worker_increase_factor, cfg.min_workers, cfg.max_workers)
        } else if sample.avg_latency > cfg.target_response_time * 2 {
            scale(state.workers, cfg.worker_decrease_factor, cfg.min_workers, cfg.max_workers)
        } else {
            state.workers
        };

        let new_batch = if degraded || sample.error_rate > cfg.max_error_rate {
            scale(state.batch_size, cfg.batch_decrease_factor, cfg.min_batch_size, cfg.max_batch_size)
        } else if sample.error_rate < cfg.target_error_rate && sample.avg_latency < cfg.target_response_time {
            scale(state.batch_size, cfg.batch_increase_factor, cfg.min_batch_size, cfg.max_batch_size)
        } else if sample.avg_latency > cfg.target_response_time * 2 {
            scale(state.batch_size, cfg.batch_decrease_factor, cfg.min_batch_size, cfg.max_batch_size)
        } else {
            state.batch_size
        };

        if new_workers != state.workers || new_batch != state.batch_size {
            state.workers = new_workers;
            state.batch_size = new_batch;
            state.last_adjustment = Some(Instant::now());
        }
    }
}

fn scale(current: usize, factor: f64, min: usize, max: usize) -> usize {
    let scaled = ((current as f64) * factor).round() as i64;
    scaled.clamp(min as i64, max as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_interval(interval: Duration) -> OptimizerConfig {
        OptimizerConfig { adjustment_interval: interval, ..OptimizerConfig::default() }
    }

    #[test]
    fn rate_limited_sample_decreases_workers() {
        let optimizer = AdaptiveOptimizer::new(config_with_interval(Duration::ZERO), 10, 50);
        optimizer.record_sample(Sample { rate_limited: true, ..Default::default() });
        assert_eq!(optimizer.workers(), 5);
    }

    #[test]
    fn healthy_sample_increases_workers() {
        let optimizer = AdaptiveOptimizer::new(config_with_interval(Duration::ZERO), 10, 50);
        optimizer.record_sample(Sample {
            error_rate: 0.0,
            avg_latency: Duration::from_millis(10),
            ..Default::default()
        });
        assert_eq!(optimizer.workers(), 15);
    }

    #[test]
    fn high_error_rate_decreases_workers() {
        let optimizer = AdaptiveOptimizer::new(config_with_interval(Duration::ZERO), 10, 50);
        optimizer.record_sample(Sample { error_rate: 0.5, ..Default::default() });
        assert_eq!(optimizer.workers(), 5);
    }

    #[test]
    fn within_interval_no_adjustment_happens() {
        let optimizer = AdaptiveOptimizer::new(config_with_interval(Duration::from_secs(3600)), 10, 50);
        optimizer.record_sample(Sample { rate_limited: true, ..Default::default() });
        assert_eq!(optimizer.workers(), 5);
        optimizer.record_sample(Sample {
            error_rate: 0.0,
            avg_latency: Duration::from_millis(1),
            ..Default::default()
        });
        assert_eq!(optimizer.workers(), 5);
    }

    #[test]
    fn workers_never_exceed_configured_bounds() {
        let optimizer = AdaptiveOptimizer::new(config_with_interval(Duration::ZERO), 30, 50);
        for _ in 0..5 {
            optimizer.record_sample(Sample {
                error_rate: 0.0,
                avg_latency: Duration::from_millis(1),
                ..Default::default()
            });
        }
        assert!(optimizer.workers() <= 32);
    }
}
