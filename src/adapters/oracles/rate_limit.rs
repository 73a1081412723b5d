//! Per-oracle request throttling.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::domain::models::RateLimitConfig;

/// Token bucket in front of one oracle.
pub struct OracleRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl OracleRateLimiter {
    /// Build from configuration. Returns `None` when the rate is not positive.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !(config.requests_per_second.is_finite() && config.requests_per_second > 0.0) {
            return None;
        }
        let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
        let burst = NonZeroU32::new(config.burst_size.max(1))?;
        let quota = Quota::with_period(period)?.allow_burst(burst);
        Some(Self {
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_rate_disables_limiter() {
        let config = RateLimitConfig {
            requests_per_second: 0.0,
            burst_size: 5,
        };
        assert!(OracleRateLimiter::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_burst_is_available_immediately() {
        let limiter = OracleRateLimiter::from_config(&RateLimitConfig {
            requests_per_second: 1.0,
            burst_size: 3,
        })
        .unwrap();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
