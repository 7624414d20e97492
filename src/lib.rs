//! Resilient request-deduplicating cache with cascaded provider failover.
//!
//! Two subsystems, specified to be used together but independently testable:
//! [`cache::ResilientCache`] (a Redis-backed read-through cache with
//! in-process single-flight, bounded admission, fetch-timeout coordination,
//! and an optional distributed-lock variant) and [`strategy`]'s
//! `execute_strategy` (an ordered provider fan-through driver distinguishing
//! business not-found outcomes from system failures).
//!
//! Everything that surrounds these two subsystems - HTTP routing, request
//! validation, per-provider HTTP clients and their retry loops, database
//! repositories - is an external collaborator this crate does not implement;
//! it consumes a *fetcher* closure and produces a closed [`error::CoreError`]
//! taxonomy a consumer layer can pattern-match on.

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod key;
pub mod lock;
pub mod rate_limiter;
pub mod single_flight;
pub mod strategy;
pub mod ttl;

pub use backend::{CacheBackend, LockNotifier};
pub use cache::{ErrorMapper, ResilientCache};
pub use config::{CacheConfig, DistributedLockConfig, RateLimiterConfig};
pub use envelope::{Envelope, ErrorMeta};
pub use error::CoreError;
pub use key::{generate_key, ParamValue};
pub use lock::LockMode;
pub use rate_limiter::{RateGate, RateLimiterClient};
pub use strategy::{
    execute_strategy, AddressData, AddressProvider, Coordinates, GeocodingProvider,
    GeocodingProviderHandle, Precision, ProviderName,
};
