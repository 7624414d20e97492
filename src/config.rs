//! Configuration for `ResilientCache` and `ResilientStrategy`.
//!
//! Loaded directly from environment variables: each field is parsed with
//! `env::var(..).ok().and_then(..).unwrap_or(default)`. There is no dedicated
//! config-file format here, the core is a library and the process embedding
//! it is free to populate those variables however it likes (including from a
//! `.env` file, before this crate is ever touched).

use std::env;
use std::time::Duration;

/// Tuning knobs for one `ResilientCache` instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default (positive-result) TTL in seconds.
    pub ttl_default_secs: i64,
    /// Negative-result (cached failure) TTL in seconds. `<= 0` disables
    /// negative caching entirely.
    pub ttl_negative_secs: i64,
    /// Symmetric jitter fraction applied to both TTLs.
    pub jitter_fraction: f64,
    /// Maximum number of concurrently in-flight fetches.
    pub max_pending: usize,
    /// Per-fetch timeout.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_default_secs: 3600,
            ttl_negative_secs: 60,
            jitter_fraction: 0.1,
            max_pending: 256,
            fetch_timeout: Duration::from_millis(5_000),
        }
    }
}

impl CacheConfig {
    /// Load overrides from the environment, falling back to [`Default`] for
    /// anything unset or unparsable. Variables are namespaced by `prefix`
    /// (e.g. `CEP_CACHE_` or `GEOCODING_CACHE_`) so sibling caches can be
    /// tuned independently, matching spec.md's "each logical cache owns its
    /// own instance" design note.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            ttl_default_secs: env_parse(prefix, "TTL_DEFAULT_SECS", defaults.ttl_default_secs),
            ttl_negative_secs: env_parse(prefix, "TTL_NEGATIVE_SECS", defaults.ttl_negative_secs),
            jitter_fraction: env_parse(prefix, "JITTER_FRACTION", defaults.jitter_fraction),
            max_pending: env_parse(prefix, "MAX_PENDING", defaults.max_pending),
            fetch_timeout: Duration::from_millis(env_parse(
                prefix,
                "FETCH_TIMEOUT_MS",
                defaults.fetch_timeout.as_millis() as u64,
            )),
        }
    }
}

/// Settings for the optional distributed-lock fill variant (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct DistributedLockConfig {
    pub lock_ttl: Duration,
    pub max_wait: Duration,
}

impl Default for DistributedLockConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            max_wait: Duration::from_secs(3),
        }
    }
}

impl DistributedLockConfig {
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            lock_ttl: Duration::from_millis(env_parse(
                prefix,
                "LOCK_TTL_MS",
                defaults.lock_ttl.as_millis() as u64,
            )),
            max_wait: Duration::from_millis(env_parse(
                prefix,
                "MAX_WAIT_TIME_MS",
                defaults.max_wait.as_millis() as u64,
            )),
        }
    }
}

/// Settings for the Redis-backed rate limiter client (SPEC_FULL §4.7).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimiterConfig {
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            requests_per_window: env_parse(
                prefix,
                "RATE_LIMIT_PER_WINDOW",
                defaults.requests_per_window,
            ),
            window: Duration::from_millis(env_parse(
                prefix,
                "RATE_LIMIT_WINDOW_MS",
                defaults.window.as_millis() as u64,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(prefix: &str, suffix: &str, default: T) -> T {
    env::var(format!("{prefix}{suffix}"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
