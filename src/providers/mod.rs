//! Provider clients for the supported air-quality sources.
//!
//! Each client:
//! - builds authenticated requests for its API (`apikey` header for Airly,
//!   `token` query parameter for AQICN, nothing for GIOŚ)
//! - translates the provider's station IDs into canonical `{provider}-{rawId}` IDs
//! - reads through the shared [`TtlCache`] on every call

pub mod airly;
pub mod aqicn;
pub mod gios;
pub mod http;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::cache::TtlCache;
use crate::error::FetchResult;
use crate::models::{ProviderKind, Region, Station};

pub use airly::AirlyClient;
pub use aqicn::AqicnClient;
pub use gios::GiosClient;

/// Provider-specific snapshot, validated at the client boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "payload")]
pub enum RawMeasurement {
    Airly(airly::AirlyMeasurements),
    Aqicn(aqicn::AqicnFeed),
    Gios(gios::GiosReadings),
}

impl RawMeasurement {
    pub fn provider(&self) -> ProviderKind {
        match self {
            RawMeasurement::Airly(_) => ProviderKind::Airly,
            RawMeasurement::Aqicn(_) => ProviderKind::Aqicn,
            RawMeasurement::Gios(_) => ProviderKind::Gios,
        }
    }
}

/// A source of stations and current readings.
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Directory of monitoring points in `region`.
    async fn list_stations(&self, region: &Region) -> FetchResult<Vec<Station>>;

    /// Latest snapshot for one station, by provider raw ID.
    async fn fetch_current(&self, raw_id: &str) -> FetchResult<RawMeasurement>;

    /// Metadata for one station, by provider raw ID.
    async fn station(&self, raw_id: &str) -> FetchResult<Station>;
}

/// Run `fetch` through the cache under `key`.
///
/// 1. A fresh entry is returned without touching the network.
/// 2. A successful fetch is stored with the standard lifetime.
/// 3. On a rate-limit response an existing entry is revived with the long
///    lifetime and returned, so the provider is not asked again right away.
/// 4. On any other failure an existing entry is returned as is.
/// 5. Without an entry the error is passed on.
pub async fn read_through<T, F, Fut>(cache: &TtlCache, key: &str, fetch: F) -> FetchResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    if let Some(hit) = cache.get::<T>(key).await {
        log::debug!("Cache hit: {}", key);
        return Ok(hit);
    }

    let error = match fetch().await {
        Ok(value) => {
            cache.set_default(key, &value).await;
            return Ok(value);
        }
        Err(error) => error,
    };

    let Some(stale) = cache.get_stale::<T>(key).await else {
        return Err(error);
    };

    if error.is_rate_limited() {
        cache.revive(key, cache.long_ttl()).await;
        log::warn!(
            "{}; serving cached {} for another {}s",
            error,
            key,
            cache.long_ttl().as_secs()
        );
    } else {
        log::warn!("{}; serving stale {}", error, key);
    }
    Ok(stale)
}

/// Fetch every ID with `fetch_one`, keeping the successes.
///
/// Fails only when nothing succeeded and at least one call failed.
pub(crate) async fn collect_each<T, F, Fut>(ids: &[String], fetch_one: F) -> FetchResult<Vec<T>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let results = futures::future::join_all(ids.iter().cloned().map(&fetch_one)).await;

    let mut items = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(item) => items.push(item),
            Err(error) => {
                log::warn!("Skipping station {}: {}", id, error);
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) if items.is_empty() => Err(error),
        _ => Ok(items),
    }
}
