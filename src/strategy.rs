//! ResilientStrategy - ordered provider fan-through with not-found/system-error
//! classification (spec §4.5). Composed into a `ResilientCache` fetcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::rate_limiter::RateGate;

/// Positional precision of a geocoding result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Precision {
    Rooftop,
    Neighborhood,
    City,
    NoCertainty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    pub precision: Precision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressData {
    pub localidade: String,
    pub uf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logradouro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bairro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<Precision>,
}

/// A postal-code → address lookup provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressProvider: Send + Sync {
    /// Distinct name used for rate-limiter bucketing and error attribution.
    fn name(&self) -> &str;

    async fn fetch_address(
        &self,
        cep: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AddressData>, CoreError>;
}

/// A free-text / structured geocoding provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Coordinates>, CoreError>;

    async fn search_structured(
        &self,
        street: Option<&str>,
        city: &str,
        state: &str,
        country: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Coordinates>, CoreError>;
}

/// Generalizes §4.5's fan-through loop over any provider operation that
/// yields `Ok(Some(value))`, `Ok(None)` (not-found), `Err(NotFound)`, or
/// `Err(system error)`, so the same driver serves `AddressProvider` and
/// `GeocodingProvider` without duplicating the loop (SPEC_FULL §4.5).
pub async fn execute_strategy<T, P, F, Fut>(
    providers: &[P],
    cancel_token: &CancellationToken,
    rate_limiter: Option<&dyn RateGate>,
    call: F,
) -> Result<T, CoreError>
where
    P: ProviderName,
    F: Fn(&P, CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, CoreError>>,
{
    let mut not_found_count = 0usize;
    let mut has_system_error = false;
    let mut last_error: Option<(String, CoreError)> = None;

    for provider in providers {
        if cancel_token.is_cancelled() {
            return Err(CoreError::FetchTimeout);
        }

        if let Some(limiter) = rate_limiter {
            if !limiter.allow(provider.name()).await {
                debug!(provider = provider.name(), "rate limiter blocked provider, skipping");
                has_system_error = true;
                last_error = Some((
                    provider.name().to_string(),
                    CoreError::System("rate limit exceeded".to_string()),
                ));
                continue;
            }
        }

        match call(provider, cancel_token.clone()).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                not_found_count += 1;
                continue;
            }
            Err(CoreError::NotFound { .. }) => {
                not_found_count += 1;
                continue;
            }
            Err(CoreError::FetchTimeout) => return Err(CoreError::FetchTimeout),
            Err(other) => {
                warn!(provider = provider.name(), error = %other, "provider raised a system error");
                has_system_error = true;
                last_error = Some((provider.name().to_string(), other));
            }
        }
    }

    if has_system_error {
        let inner = last_error
            .map(|(_, e)| e)
            .unwrap_or_else(|| CoreError::System("unknown provider failure".to_string()));
        return Err(CoreError::ProviderFailure {
            inner: Box::new(inner),
        });
    }

    if not_found_count == providers.len() {
        return Err(CoreError::NotFound {
            reason: "all providers exhausted".to_string(),
        });
    }

    // Unreachable in practice (every branch above either returns or
    // contributes to not_found_count/has_system_error); kept as a safety net
    // per spec §4.5.
    Err(CoreError::ProviderFailure {
        inner: Box::new(CoreError::System("strategy exhausted with no classification".to_string())),
    })
}

/// Minimal capability every provider passed to [`execute_strategy`] needs:
/// a stable name for rate-limiter keys and error attribution.
pub trait ProviderName {
    fn name(&self) -> &str;
}

impl<T: AddressProvider + ?Sized> ProviderName for std::sync::Arc<T> {
    fn name(&self) -> &str {
        AddressProvider::name(self.as_ref())
    }
}

/// Thin wrapper passed to [`execute_strategy`] for geocoding providers,
/// instead of a bare `Arc<dyn GeocodingProvider>`.
pub struct GeocodingProviderHandle<T: ?Sized>(pub std::sync::Arc<T>);

impl<T: GeocodingProvider + ?Sized> ProviderName for GeocodingProviderHandle<T> {
    fn name(&self) -> &str {
        GeocodingProvider::name(self.0.as_ref())
    }
}

impl<T: GeocodingProvider + ?Sized> std::ops::Deref for GeocodingProviderHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.0.as_ref()
    }
}
