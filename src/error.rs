//! Closed error taxonomy for the core. Every failure the cache or the strategy
//! driver can raise is a variant here, callers pattern-match on it instead of
//! downcasting an opaque error type.

use serde_json::Value;
use thiserror::Error;

/// The closed set of errors `ResilientCache` and `ResilientStrategy` can raise.
///
/// `Clone` is required so that joined single-flight callers can each receive
/// their own copy of a failure without an `Arc` wrapper leaking into the
/// public API.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A previously-cached business failure, replayed from a failure envelope.
    #[error("{error_type}: {message}")]
    CachedFailure {
        error_type: String,
        message: String,
        data: Option<Value>,
    },

    /// The fetch did not complete before `FETCH_TIMEOUT_MS` elapsed.
    #[error("fetch timed out")]
    FetchTimeout,

    /// The caller-supplied cancellation fired before the fetch completed.
    #[error("operation aborted by caller")]
    OperationAborted,

    /// The single-flight table was already at `MAX_PENDING`.
    #[error("service overloaded: too many pending fetches")]
    ServiceOverload,

    /// Every provider failed and at least one failure was a system error.
    #[error("provider failure: {inner}")]
    ProviderFailure { inner: Box<CoreError> },

    /// Every provider returned a not-found signal.
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// A success envelope was read from the backend without a `v` field.
    #[error("corrupted cache entry (missing value)")]
    CorruptedCache,

    /// An uncategorized system error raised by a fetcher or provider and
    /// propagated as-is (never cached).
    #[error("{0}")]
    System(String),
}

impl CoreError {
    /// The HTTP status a consumer layer would attach to this error, per the
    /// mapping documented in the core's error-handling design. This is plain
    /// data on the error, no HTTP framework dependency is introduced here.
    pub fn status_hint(&self) -> u16 {
        match self {
            CoreError::NotFound { .. } => 404,
            CoreError::CachedFailure { .. } => 404,
            CoreError::ServiceOverload | CoreError::ProviderFailure { .. } => 503,
            CoreError::FetchTimeout => 504,
            CoreError::OperationAborted | CoreError::CorruptedCache | CoreError::System(_) => 500,
        }
    }

    /// True if this error represents a business-level not-found outcome
    /// (either fresh from the strategy driver, or replayed from a cached
    /// failure envelope tagged as such).
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}
