//! The seam between `ResilientCache` and the backing store. Kept as a trait
//! (rather than a concrete `redis::Client` field) so the cache core can be
//! exercised in tests without a live Redis instance, the same
//! ports-and-adapters shape the retrieval pack's `nova-cache` crate uses for
//! its `CacheOperations` trait.

pub mod fake;
pub mod redis_backend;

use async_trait::async_trait;

use crate::error::CoreError;

/// Key/value operations `ResilientCache` needs from the backing store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `GET key`. `Ok(None)` on a clean miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    /// `SET key value EX ttl_secs`.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CoreError>;

    /// `DEL key`.
    async fn del(&self, key: &str) -> Result<(), CoreError>;

    /// `SET key value PX ttl_ms NX`, lock acquisition. Returns `true` if the
    /// lock was acquired.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, CoreError>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> Result<bool, CoreError>;

    /// Atomically: if the value at `lock_key` equals `token`, delete it and
    /// publish `message` on `channel`. Returns `true` if the release (and
    /// publish) happened, `false` if the token didn't match (someone else
    /// already owns or released the lock).
    async fn release_lock_and_publish(
        &self,
        lock_key: &str,
        token: &str,
        channel: &str,
        message: &str,
    ) -> Result<bool, CoreError>;

    /// `INCR key` with a window expiry set only on the first increment of
    /// the window (`key` doesn't already have a TTL). Returns the
    /// post-increment count.
    async fn incr_with_window(&self, key: &str, window_secs: u64) -> Result<i64, CoreError>;
}

/// Pub/Sub half of the distributed-lock wait path, kept separate from
/// [`CacheBackend`] because most `ResilientCache` users never construct the
/// lock variant and shouldn't have to implement subscribe semantics.
#[async_trait]
pub trait LockNotifier: Send + Sync {
    /// Block (up to `timeout`) for a single message on `channel`. Returns
    /// `true` if a message arrived before the timeout.
    async fn wait_for_release(&self, channel: &str, timeout: std::time::Duration) -> bool;
}
