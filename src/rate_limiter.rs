//! Rate Limiter Client - a thin token-bucket-per-window gate in front of the
//! externally-owned Redis counter, consulted by `ResilientStrategy` before
//! each provider call (SPEC_FULL §4.7).

use async_trait::async_trait;
use tracing::warn;

use crate::backend::CacheBackend;
use crate::config::RateLimiterConfig;

/// Object-safe gate `ResilientStrategy` consults before each provider call,
/// so the strategy driver doesn't need to be generic over a backend type
/// just to hold an optional rate limiter.
#[async_trait]
pub trait RateGate: Send + Sync {
    async fn allow(&self, provider: &str) -> bool;
}

/// Keyed by provider name; one Redis counter key per provider per window.
pub struct RateLimiterClient<B: CacheBackend> {
    backend: std::sync::Arc<B>,
    config: RateLimiterConfig,
    key_prefix: String,
}

impl<B: CacheBackend> RateLimiterClient<B> {
    pub fn new(backend: std::sync::Arc<B>, config: RateLimiterConfig, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            config,
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl<B: CacheBackend> RateGate for RateLimiterClient<B> {
    /// `true` if `provider` is still within its window budget. Fails open:
    /// any backend error is logged and treated as allowed, matching the
    /// fail-open posture the lock variant takes on Redis errors.
    async fn allow(&self, provider: &str) -> bool {
        let key = format!("{}{provider}", self.key_prefix);
        match self
            .backend
            .incr_with_window(&key, self.config.window.as_secs())
            .await
        {
            Ok(count) => count <= self.config.requests_per_window as i64,
            Err(e) => {
                warn!(error = %e, provider, "rate limiter backend error, failing open");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::rate_limiter::RateGate as _;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn allows_up_to_the_window_limit() {
        let backend = Arc::new(FakeBackend::new());
        let limiter = RateLimiterClient::new(
            backend,
            RateLimiterConfig {
                requests_per_window: 2,
                window: Duration::from_secs(60),
            },
            "rl:",
        );
        assert!(limiter.allow("viacep").await);
        assert!(limiter.allow("viacep").await);
        assert!(!limiter.allow("viacep").await);
    }

    #[tokio::test]
    async fn counters_are_isolated_per_provider() {
        let backend = Arc::new(FakeBackend::new());
        let limiter = RateLimiterClient::new(
            backend,
            RateLimiterConfig {
                requests_per_window: 1,
                window: Duration::from_secs(60),
            },
            "rl:",
        );
        assert!(limiter.allow("viacep").await);
        assert!(limiter.allow("nominatim").await);
        assert!(!limiter.allow("viacep").await);
    }
}
