//! Token-bucket rate limiting (spec §4.5 "Rate limiter").

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self { tokens: capacity, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A global token bucket plus an optional per-IP bucket, each
/// independently enforced (spec §4.5: "requests must pass both the
/// global and the per-IP bucket").
pub struct RateLimiter {
    global: Mutex<Bucket>,
    per_ip_rate: Option<f64>,
    burst_size: f64,
    ip_buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst_size: f64, per_ip_rate: Option<f64>) -> Self {
        Self {
            global: Mutex::new(Bucket::new(burst_size, requests_per_second)),
            per_ip_rate,
            burst_size,
            ip_buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the request is admitted. `ip` is only
    /// consulted when per-IP limiting is configured.
    pub fn allow(&self, ip: Option<IpAddr>) -> bool {
        if !self.global.lock().try_take() {
            return false;
        }
        let Some(rate) = self.per_ip_rate else { return true };
        let Some(ip) = ip else { return true };
        let mut buckets = self.ip_buckets.lock();
        let bucket = buckets
            .entry(ip)
            .or_insert_with(|| Bucket::new(self.burst_size / 10.0, rate));
        bucket.try_take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_admitted_then_exhausted() {
        let limiter = RateLimiter::new(1.0, 3.0, None);
        assert!(limiter.allow(None));
        assert!(limiter.allow(None));
        assert!(limiter.allow(None));
        assert!(!limiter.allow(None));
    }

    #[test]
    fn per_ip_bucket_is_independent_of_other_ips() {
        let limiter = RateLimiter::new(100.0, 100.0, Some(1.0));
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.allow(Some(a)));
        assert!(!limiter.allow(Some(a)));
        assert!(limiter.allow(Some(b)));
    }

    #[tokio::test]
    async fn bucket_refills_over_time() {
        let limiter = RateLimiter::new(50.0, 1.0, None);
        assert!(limiter.allow(None));
        assert!(!limiter.allow(None));
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(limiter.allow(None));
    }
}
