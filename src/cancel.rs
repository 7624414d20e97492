//! Cancellation - composes a caller-supplied token with an internal
//! fetch-timeout token into the single effective token a fetcher observes,
//! per the "any-of" composition rule in spec §4.4/§9.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// The effective cancel token handed to a fetcher, plus enough state to
/// normalize which side fired once the fetcher returns or is abandoned.
pub struct EffectiveCancel {
    combined: CancellationToken,
    parent: Option<CancellationToken>,
    _driver: tokio::task::JoinHandle<()>,
}

impl EffectiveCancel {
    /// Spawns a background task that cancels `combined` on the earliest of
    /// the local fetch timeout or `parent_cancel` firing.
    pub fn new(fetch_timeout: Duration, parent_cancel: Option<CancellationToken>) -> Self {
        let combined = CancellationToken::new();
        let timeout_token = CancellationToken::new();

        let timeout_driver = timeout_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(fetch_timeout).await;
            timeout_driver.cancel();
        });

        let combined_trigger = combined.clone();
        let parent_for_task = parent_cancel.clone();
        let timeout_for_task = timeout_token;
        let driver = tokio::spawn(async move {
            match parent_for_task {
                Some(parent) => {
                    tokio::select! {
                        _ = timeout_for_task.cancelled() => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => timeout_for_task.cancelled().await,
            }
            combined_trigger.cancel();
        });

        Self {
            combined,
            parent: parent_cancel,
            _driver: driver,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.combined.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.combined.is_cancelled()
    }

    /// Normalize which side fired into the known error to raise, per the
    /// rule: the caller's reason wins if the caller's token fired, otherwise
    /// it was the local fetch timeout.
    pub fn reason(&self) -> CoreError {
        if let Some(parent) = &self.parent {
            if parent.is_cancelled() {
                return normalize_caller_reason();
            }
        }
        CoreError::FetchTimeout
    }
}

/// A caller-fired token carries no typed payload in this crate's
/// cancellation transport, so it normalizes to `OperationAborted`, the
/// "anything else" branch of the spec's normalization rule. A fetcher that
/// wants to surface a more specific caller-abort error can still raise its
/// own `CoreError` directly instead of relying on token cancellation.
fn normalize_caller_reason() -> CoreError {
    CoreError::OperationAborted
}
