//! Distributed-Lock variant (spec §4.6), a decorator around the fill step
//! of `ResilientCache::get_or_fetch`, used when multiple *processes* (not
//! just one process's single-flight table) must be kept from concurrently
//! filling the same key. Selected per `ResilientCache` instance via
//! `LockMode`, never forking the cache type (spec §9, "lock variant as
//! decorator").

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::backend::{CacheBackend, LockNotifier};
use crate::config::DistributedLockConfig;
use crate::error::CoreError;

/// Selects whether a `ResilientCache` instance uses the process-local
/// single-flight table only, or additionally coordinates fills across
/// processes via a Redis lock. Kept as an enum on `ResilientCache::new`
/// rather than a second cache type, so `get_or_fetch`'s signature and the
/// admission/single-flight contracts are identical in both modes.
pub enum LockMode<N: LockNotifier> {
    None,
    Distributed {
        notifier: Arc<N>,
        config: DistributedLockConfig,
    },
}

impl<N: LockNotifier> Clone for LockMode<N> {
    fn clone(&self) -> Self {
        match self {
            LockMode::None => LockMode::None,
            LockMode::Distributed { notifier, config } => LockMode::Distributed {
                notifier: notifier.clone(),
                config: config.clone(),
            },
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Run `fetch` under the distributed lock for `cache_key`. On acquisition,
/// runs `fetch` then releases (and publishes) the lock. On contention, waits
/// (Pub/Sub message or heartbeat poll) for the holder to release and signals
/// the caller to re-read the cache; if the wait times out, falls back to
/// running `fetch` directly in degraded mode (no lock held).
///
/// Lock errors are fail-open: any backend error during acquire/release
/// degrades to running `fetch` directly rather than failing the request.
pub async fn run_with_lock<B, N, Fut>(
    backend: &B,
    notifier: &N,
    cache_key: &str,
    config: &DistributedLockConfig,
    should_reread_cache: bool,
    fetch: impl FnOnce() -> Fut,
) -> Outcome
where
    B: CacheBackend,
    N: LockNotifier,
    Fut: Future<Output = Result<serde_json::Value, CoreError>>,
{
    let lock_key = format!("{cache_key}:lock");
    let channel = format!("{cache_key}:lock:released");
    let token = random_token();

    let acquired = match backend
        .set_nx_px(&lock_key, &token, config.lock_ttl.as_millis() as u64)
        .await
    {
        Ok(acquired) => acquired,
        Err(e) => {
            warn!(error = %e, cache_key, "lock acquisition failed, proceeding without lock");
            return Outcome::RunDirect(fetch().await);
        }
    };

    if acquired {
        let result = fetch().await;
        if let Err(e) = backend
            .release_lock_and_publish(&lock_key, &token, &channel, "released")
            .await
        {
            warn!(error = %e, cache_key, "lock release failed, relying on PX expiry");
        }
        return Outcome::RunDirect(result);
    }

    if should_reread_cache {
        if wait_for_release(backend, notifier, &lock_key, &channel, config.max_wait).await {
            return Outcome::ReReadCache;
        }
    }

    // MAX_WAIT_TIME_MS elapsed without a release signal: degrade to a direct
    // fetch rather than blocking the caller further.
    Outcome::RunDirect(fetch().await)
}

pub enum Outcome {
    /// The holder released in time; the caller should re-read the cache.
    ReReadCache,
    /// Either this caller held the lock, or the wait degraded. The fetch
    /// already ran; this is its result.
    RunDirect(Result<serde_json::Value, CoreError>),
}

async fn wait_for_release<B: CacheBackend, N: LockNotifier>(
    backend: &B,
    notifier: &N,
    lock_key: &str,
    channel: &str,
    max_wait: Duration,
) -> bool {
    let poll_interval = Duration::from_millis(100).min(max_wait);
    let deadline = tokio::time::Instant::now() + max_wait;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        let wait_slice = remaining.min(poll_interval);

        if notifier.wait_for_release(channel, wait_slice).await {
            return true;
        }

        match backend.exists(lock_key).await {
            Ok(false) => return true,
            Ok(true) => continue,
            Err(e) => {
                warn!(error = %e, lock_key, "heartbeat poll failed, continuing to wait");
            }
        }
    }
}
