//! Single-flight table - the process-local map from cache key to a joinable
//! future, plus the admission counter gating concurrently executing
//! fetchers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::CoreError;

pub type FetchResult = Result<Arc<Value>, CoreError>;
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Releases one admission slot when dropped. Installed alongside the
/// in-flight future so every exit path (settled outcome or a panic
/// unwinding through the fetcher) frees the slot exactly once.
pub struct AdmissionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SingleFlightTable {
    inflight: DashMap<String, SharedFetch>,
    admitted: Arc<AtomicUsize>,
    max_pending: usize,
}

impl SingleFlightTable {
    pub fn new(max_pending: usize) -> Self {
        Self {
            inflight: DashMap::new(),
            admitted: Arc::new(AtomicUsize::new(0)),
            max_pending,
        }
    }

    /// Step 1: synchronous admission gate, checked before any I/O.
    pub fn check_admission(&self) -> Result<(), CoreError> {
        if self.admitted.load(Ordering::Acquire) >= self.max_pending {
            return Err(CoreError::ServiceOverload);
        }
        Ok(())
    }

    /// Steps 2 / 4: dedup fast path / double-check, look up without
    /// installing.
    pub fn get(&self, key: &str) -> Option<SharedFetch> {
        self.inflight.get(key).map(|entry| entry.clone())
    }

    /// Steps 4+5 combined into one atomic critical section on the table's
    /// shard lock: if another caller already installed a promise for `key`,
    /// join it (no new admission slot is granted). Otherwise build and
    /// install a fresh one, granting an admission slot. The check and the
    /// install happen under the same shard lock, so no third caller can
    /// slip in between them.
    pub fn install_or_join(
        &self,
        key: &str,
        build: impl FnOnce() -> SharedFetch,
    ) -> (SharedFetch, Option<AdmissionGuard>) {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                self.admitted.fetch_add(1, Ordering::AcqRel);
                let fut = build();
                entry.insert(fut.clone());
                (
                    fut,
                    Some(AdmissionGuard {
                        counter: self.admitted.clone(),
                    }),
                )
            }
        }
    }

    /// Step 8: unconditional removal. Only the installing caller (the one
    /// whose `build` ran) should call this, exactly once, after its future
    /// settles.
    pub fn finish(&self, key: &str) {
        self.inflight.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn ready_fetch(v: i64) -> SharedFetch {
        let fut: BoxFuture<'static, FetchResult> =
            Box::pin(async move { Ok(Arc::new(Value::from(v))) });
        fut.shared()
    }

    #[test]
    fn admission_rejects_past_max_pending() {
        let table = SingleFlightTable::new(1);
        let (_fut, _guard) = table.install_or_join("a", || ready_fetch(1));
        assert!(table.check_admission().is_err());
    }

    #[test]
    fn second_install_for_same_key_joins_without_new_slot() {
        let table = SingleFlightTable::new(4);
        let (_f1, g1) = table.install_or_join("k", || ready_fetch(1));
        assert!(g1.is_some());
        let (_f2, g2) = table.install_or_join("k", || ready_fetch(2));
        assert!(g2.is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn finish_removes_entry_and_drop_releases_slot() {
        let table = SingleFlightTable::new(1);
        {
            let (_fut, _guard) = table.install_or_join("k", || ready_fetch(1));
            assert!(table.check_admission().is_err());
        }
        assert!(table.check_admission().is_ok());
        table.finish("k");
        assert!(table.is_empty());
    }
}
