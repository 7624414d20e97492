//! In-memory [`CacheBackend`]/[`LockNotifier`] pair used by this crate's own
//! tests and available to downstream consumers who want to exercise
//! `ResilientCache` without a live Redis instance.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{CacheBackend, LockNotifier};
use crate::error::CoreError;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(t) => Instant::now() < t,
            None => true,
        }
    }
}

/// `parking_lot::Mutex<HashMap<..>>`, same shape the teacher uses for its
/// in-process caches, just standing in for Redis here.
#[derive(Default)]
pub struct FakeBackend {
    store: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock();
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }
}

#[async_trait]
impl CacheBackend for FakeBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut store = self.store.lock();
        if let Some(entry) = store.get(key) {
            if entry.is_live() {
                return Ok(Some(entry.value.clone()));
            }
            store.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CoreError> {
        self.store.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CoreError> {
        self.store.lock().remove(key);
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, CoreError> {
        let mut store = self.store.lock();
        if let Some(entry) = store.get(key) {
            if entry.is_live() {
                return Ok(false);
            }
        }
        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_millis(ttl_ms)),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn release_lock_and_publish(
        &self,
        lock_key: &str,
        token: &str,
        channel: &str,
        message: &str,
    ) -> Result<bool, CoreError> {
        let matched = {
            let mut store = self.store.lock();
            match store.get(lock_key) {
                Some(entry) if entry.is_live() && entry.value == token => {
                    store.remove(lock_key);
                    true
                }
                _ => false,
            }
        };
        if matched {
            // No subscribers is not an error, matches a real Redis PUBLISH
            // with zero listeners.
            let _ = self.channel(channel).send(message.to_string());
        }
        Ok(matched)
    }

    async fn incr_with_window(&self, key: &str, window_secs: u64) -> Result<i64, CoreError> {
        let mut store = self.store.lock();
        let count = match store.get(key) {
            Some(entry) if entry.is_live() => {
                let next: i64 = entry.value.parse().unwrap_or(0) + 1;
                entry_update(&mut store, key, next);
                next
            }
            _ => {
                store.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Some(Instant::now() + Duration::from_secs(window_secs)),
                    },
                );
                1
            }
        };
        Ok(count)
    }
}

fn entry_update(store: &mut HashMap<String, Entry>, key: &str, new_value: i64) {
    if let Some(entry) = store.get_mut(key) {
        entry.value = new_value.to_string();
    }
}

#[async_trait]
impl LockNotifier for FakeBackend {
    async fn wait_for_release(&self, channel: &str, timeout: Duration) -> bool {
        let mut rx = self.channel(channel).subscribe();
        matches!(tokio::time::timeout(timeout, rx.recv()).await, Ok(Ok(_)))
    }
}
