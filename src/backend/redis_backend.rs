//! Redis-backed implementation of [`CacheBackend`] and [`LockNotifier`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{CacheBackend, LockNotifier};
use crate::error::CoreError;

/// Lua script for atomic "release lock if token matches, then publish". Two
/// keys (`lock_key`, unused second slot kept for `redis::Script` key-count
/// bookkeeping), two args (`token`, `message`) plus the release channel
/// derived from `lock_key` at call time.
const RELEASE_AND_PUBLISH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("DEL", KEYS[1])
    redis.call("PUBLISH", KEYS[2], ARGV[2])
    return 1
else
    return 0
end
"#;

pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            CoreError::System(format!("failed to open redis client: {e}"))
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CoreError::System(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| CoreError::System(format!("redis GET failed: {e}")))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| CoreError::System(format!("redis SET EX failed: {e}")))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CoreError::System(format!("redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, CoreError> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::System(format!("redis SET NX PX failed: {e}")))?;
        Ok(acquired.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CoreError> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| CoreError::System(format!("redis EXISTS failed: {e}")))
    }

    async fn release_lock_and_publish(
        &self,
        lock_key: &str,
        token: &str,
        channel: &str,
        message: &str,
    ) -> Result<bool, CoreError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_AND_PUBLISH_SCRIPT);
        let released: i64 = script
            .key(lock_key)
            .key(channel)
            .arg(token)
            .arg(message)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(error = %e, lock_key, "failed to release lock via EVAL, will auto-expire");
                CoreError::System(format!("redis EVAL release failed: {e}"))
            })?;
        Ok(released == 1)
    }

    async fn incr_with_window(&self, key: &str, window_secs: u64) -> Result<i64, CoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| CoreError::System(format!("redis INCR failed: {e}")))?;
        if count == 1 {
            let _: bool = conn
                .expire(key, window_secs as i64)
                .await
                .map_err(|e| CoreError::System(format!("redis EXPIRE failed: {e}")))?;
        }
        Ok(count)
    }
}

pub struct RedisLockNotifier {
    client: redis::Client,
}

impl RedisLockNotifier {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LockNotifier for RedisLockNotifier {
    async fn wait_for_release(&self, channel: &str, timeout: Duration) -> bool {
        use futures::StreamExt;

        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, channel, "failed to open pubsub connection, falling back to poll");
                return false;
            }
        };
        if let Err(e) = pubsub.subscribe(channel).await {
            warn!(error = %e, channel, "failed to subscribe to release channel");
            return false;
        }

        let next_message = pubsub.on_message().next();
        matches!(tokio::time::timeout(timeout, next_message).await, Ok(Some(_)))
    }
}
