//! ResilientCache - Redis-backed read-through cache with in-process
//! single-flight, bounded admission, fetch-timeout coordination, and
//! positive/negative envelopes with TTL jitter (spec §4.4).

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{CacheBackend, LockNotifier};
use crate::cancel::EffectiveCancel;
use crate::config::CacheConfig;
use crate::envelope::{self, Envelope, ErrorMeta};
use crate::error::CoreError;
use crate::lock::{self, LockMode, Outcome as LockOutcome};
use crate::single_flight::SingleFlightTable;
use crate::ttl;

/// Optional classifier: maps a system error raised by the fetcher into
/// cacheable failure metadata. Returning `None` leaves the error as a
/// system error, surfaced without writing.
pub type ErrorMapper = dyn Fn(&CoreError) -> Option<ErrorMeta> + Send + Sync;

pub struct ResilientCache<B: CacheBackend, N: LockNotifier = crate::backend::fake::FakeBackend> {
    backend: Arc<B>,
    table: Arc<SingleFlightTable>,
    config: CacheConfig,
    lock_mode: LockMode<N>,
}

impl<B: CacheBackend + 'static> ResilientCache<B, crate::backend::fake::FakeBackend> {
    /// Construct a cache with no distributed-lock coordination, the common
    /// case (spec §9: "each logical cache owns its own instance").
    pub fn new(backend: Arc<B>, config: CacheConfig) -> Self {
        info!(max_pending = config.max_pending, "resilient cache constructed");
        Self {
            backend,
            table: Arc::new(SingleFlightTable::new(config.max_pending)),
            config,
            lock_mode: LockMode::None,
        }
    }
}

impl<B: CacheBackend + 'static, N: LockNotifier + 'static> ResilientCache<B, N> {
    /// Construct a cache that coordinates fills across processes via a
    /// Redis lock (spec §4.6), in addition to the in-process single-flight
    /// table.
    pub fn with_lock(backend: Arc<B>, config: CacheConfig, lock_mode: LockMode<N>) -> Self {
        info!(max_pending = config.max_pending, "resilient cache constructed with distributed lock");
        Self {
            backend,
            table: Arc::new(SingleFlightTable::new(config.max_pending)),
            config,
            lock_mode,
        }
    }

    /// The full algorithm in spec §4.4, steps 1-8.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        error_mapper: Option<Arc<ErrorMapper>>,
        parent_cancel: Option<CancellationToken>,
    ) -> Result<Arc<Value>, CoreError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        // Step 1: admission, before any I/O.
        self.table.check_admission()?;

        // Step 2: dedup fast path.
        if let Some(existing) = self.table.get(key) {
            debug!(key, "single-flight dedup fast path, joining");
            return existing.await;
        }

        // Step 3: read path.
        match self.read_through(key).await {
            ReadOutcome::Hit(result) => return result,
            ReadOutcome::Miss => {}
        }

        // Step 4+5: double-check dedup and install, atomically.
        let key_owned = key.to_string();
        let backend = self.backend.clone();
        let config = self.config.clone();
        let lock_mode = self.lock_mode.clone();
        let table_for_finish = self.table.clone();
        let key_for_finish = key_owned.clone();

        let (shared, guard) = self.table.install_or_join(key, move || {
            let fut: BoxFuture<'static, Result<Arc<Value>, CoreError>> = Box::pin(async move {
                let result = run_fill(
                    &key_owned,
                    backend,
                    &config,
                    &lock_mode,
                    fetcher,
                    error_mapper,
                    parent_cancel,
                )
                .await;
                // Step 8: unconditional removal, exactly once, by the
                // installer (this future), regardless of outcome.
                table_for_finish.finish(&key_for_finish);
                result
            });
            fut.shared()
        });

        if guard.is_none() {
            debug!(key, "double-check dedup found a concurrent installer, joining");
        }

        shared.await
    }

    async fn read_through(&self, key: &str) -> ReadOutcome {
        match self.backend.get(key).await {
            Ok(Some(bytes)) => match envelope::decode(&bytes) {
                envelope::Decoded::Ok(Envelope::Success(v)) => {
                    debug!(key, "cache hit (success)");
                    ReadOutcome::Hit(Ok(Arc::new(v)))
                }
                envelope::Decoded::Ok(Envelope::Failure(meta)) => {
                    debug!(key, error_type = %meta.error_type, "cache hit (cached failure)");
                    ReadOutcome::Hit(Err(envelope::failure_to_error(meta)))
                }
                envelope::Decoded::MissingValue => {
                    error!(key, "corrupted success envelope (missing value), not invoking fetcher");
                    ReadOutcome::Hit(Err(CoreError::CorruptedCache))
                }
                envelope::Decoded::Corrupt => {
                    warn!(key, "malformed envelope bytes, treating as miss");
                    ReadOutcome::Miss
                }
            },
            Ok(None) => {
                debug!(key, "cache miss");
                ReadOutcome::Miss
            }
            Err(e) => {
                warn!(key, error = %e, "redis read failed, treating as miss");
                ReadOutcome::Miss
            }
        }
    }
}

enum ReadOutcome {
    Hit(Result<Arc<Value>, CoreError>),
    Miss,
}

/// Steps 6-7: fetch execution and outcome handling, run exactly once per
/// installed single-flight entry.
async fn run_fill<B, N, F, Fut>(
    key: &str,
    backend: Arc<B>,
    config: &CacheConfig,
    lock_mode: &LockMode<N>,
    fetcher: F,
    error_mapper: Option<Arc<ErrorMapper>>,
    parent_cancel: Option<CancellationToken>,
) -> Result<Arc<Value>, CoreError>
where
    B: CacheBackend,
    N: LockNotifier,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
{
    let effective = EffectiveCancel::new(config.fetch_timeout, parent_cancel);

    if effective.is_cancelled() {
        return Err(effective.reason());
    }

    let fetch_token = effective.token();
    let outcome = match lock_mode {
        LockMode::None => fetcher(fetch_token).await,
        LockMode::Distributed { notifier, config: lock_cfg } => {
            match lock::run_with_lock(
                backend.as_ref(),
                notifier.as_ref(),
                key,
                lock_cfg,
                true,
                move || fetcher(fetch_token),
            )
            .await
            {
                LockOutcome::ReReadCache => {
                    // Another process already wrote the cache; re-read
                    // directly rather than going through `get_or_fetch`
                    // again (which would re-enter single-flight for a key
                    // this future already owns).
                    return match backend.get(key).await {
                        Ok(Some(bytes)) => match envelope::decode(&bytes) {
                            envelope::Decoded::Ok(Envelope::Success(v)) => Ok(Arc::new(v)),
                            envelope::Decoded::Ok(Envelope::Failure(meta)) => {
                                Err(envelope::failure_to_error(meta))
                            }
                            envelope::Decoded::MissingValue => Err(CoreError::CorruptedCache),
                            envelope::Decoded::Corrupt => Err(CoreError::System(
                                "lock holder released but left no readable cache entry".to_string(),
                            )),
                        },
                        Ok(None) => Err(CoreError::System(
                            "lock holder released but cache entry was absent".to_string(),
                        )),
                        Err(e) => Err(e),
                    };
                }
                LockOutcome::RunDirect(result) => result,
            }
        }
    };

    // Defensive re-check: the fetcher is required to honor the token, but a
    // fetcher that raced past it must still have its result discarded.
    if effective.is_cancelled() {
        return Err(effective.reason());
    }

    match outcome {
        Ok(value) => {
            if let Some(ttl_secs) = ttl::pick_ttl(
                false,
                config.ttl_default_secs,
                config.ttl_negative_secs,
                config.jitter_fraction,
            ) {
                let encoded = envelope::encode(&Envelope::Success(value.clone()));
                if let Err(e) = backend.set_ex(key, &encoded, ttl_secs).await {
                    warn!(key, error = %e, "failed to write success envelope, returning value anyway");
                }
            }
            Ok(Arc::new(value))
        }
        Err(err) => {
            if let Some(mapper) = &error_mapper {
                if let Some(meta) = mapper(&err) {
                    if let Some(ttl_secs) = ttl::pick_ttl(
                        true,
                        config.ttl_default_secs,
                        config.ttl_negative_secs,
                        config.jitter_fraction,
                    ) {
                        let encoded = envelope::encode(&Envelope::Failure(meta.clone()));
                        if let Err(e) = backend.set_ex(key, &encoded, ttl_secs).await {
                            warn!(key, error = %e, "failed to write failure envelope");
                        }
                    }
                    return Err(envelope::failure_to_error(meta));
                }
            }
            Err(err)
        }
    }
}
