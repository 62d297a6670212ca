//! Per-provider request pacing.
//!
//! This is strict pacing, not a token bucket: one request to a provider
//! strictly after another, separated by at least the provider's configured
//! minimum interval. No burst allowance.

use std::collections::HashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Enforces a minimum inter-request interval per provider.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Uniform floor from `--delay`, in seconds.
    delay_floor: Option<f64>,
    last_request: tokio::sync::Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, delay_floor: Option<f64>) -> Self {
        Self {
            config,
            delay_floor,
            last_request: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Suspend until a request to `provider` is allowed, then claim the slot.
    ///
    /// The map lock is held across the sleep: the timestamp is recorded
    /// atomically with the end of the suspension, so overlapping callers
    /// cannot both proceed inside the same interval.
    pub async fn acquire(&self, provider: &str) {
        let interval = self.config.interval_for(provider, self.delay_floor);
        let mut last_request = self.last_request.lock().await;

        if let Some(last) = last_request.get(provider) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                tracing::trace!(provider, wait_ms = wait.as_millis() as u64, "pacing");
                tokio::time::sleep(wait).await;
            }
        }

        last_request.insert(provider.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter_with(provider: &str, secs: f64) -> RateLimiter {
        let mut config = RateLimitConfig::default();
        config.intervals.insert(provider.to_string(), secs);
        RateLimiter::new(config, None)
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_acquires_are_spaced_by_interval() {
        let limiter = limiter_with("wiley", 2.0);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire("wiley").await;
        }
        // 4 calls -> at least 3 full intervals.
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let limiter = limiter_with("crossref", 2.0);
        let start = Instant::now();
        limiter.acquire("crossref").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn providers_are_paced_independently() {
        let limiter = limiter_with("wiley", 5.0);
        limiter.acquire("wiley").await;
        let start = Instant::now();
        limiter.acquire("openalex").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
