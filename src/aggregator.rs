//! Aggregation facade.
//!
//! Lists stations from every configured provider and region, dedupes them by
//! canonical ID, then fetches and normalizes current readings through the
//! batch orchestrator. Failures only ever shrink the result; nothing here
//! returns an error to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchOrchestrator, NoProgress, ProgressObserver};
use crate::cache::TtlCache;
use crate::error::{FetchError, FetchResult, Result};
use crate::models::{
    AirQualityData, BatchConfig, Config, ProviderKind, Region, Station, parse_canonical_id,
};
use crate::normalize::normalize;
use crate::providers::http::create_client;
use crate::providers::{AirQualityProvider, AirlyClient, AqicnClient, GiosClient};

/// A provider together with the regions it is queried for.
#[derive(Clone)]
pub struct ProviderSource {
    pub provider: Arc<dyn AirQualityProvider>,
    pub regions: Vec<Region>,
}

impl ProviderSource {
    pub fn new(provider: Arc<dyn AirQualityProvider>, regions: Vec<Region>) -> Self {
        Self { provider, regions }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }
}

pub struct Aggregator {
    sources: Vec<ProviderSource>,
    cache: TtlCache,
    orchestrator: BatchOrchestrator,
    /// Stations seen in the last listing, by canonical ID
    directory: Mutex<HashMap<String, Station>>,
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    /// Build providers from configuration; see [`AggregatorBuilder::from_config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(AggregatorBuilder::from_config(config)?.build())
    }

    /// Providers in query order.
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.sources.iter().map(ProviderSource::kind).collect()
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Current readings for every station of every configured region.
    pub async fn fetch_all_stations(&self) -> Vec<AirQualityData> {
        self.fetch_all_stations_with(&NoProgress, &CancellationToken::new())
            .await
    }

    /// Like [`fetch_all_stations`](Self::fetch_all_stations), with progress
    /// reporting and cooperative cancellation.
    pub async fn fetch_all_stations_with(
        &self,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Vec<AirQualityData> {
        let stations = self.list_all_stations().await;
        if stations.is_empty() {
            log::warn!("No stations listed by any provider");
            return Vec::new();
        }

        let outcome = self
            .orchestrator
            .run(
                stations,
                |station: Station| async move { self.fetch_record(&station).await.map(Some) },
                observer,
                cancel,
            )
            .await;

        log::info!(
            "Fetched {}/{} stations ({} skipped{})",
            outcome.items.len(),
            outcome.total,
            outcome.failed,
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        outcome.items
    }

    /// Directory of all configured regions, deduped by canonical ID.
    ///
    /// Later listings overwrite earlier ones in place. The result also
    /// refreshes the directory used by [`fetch_station`](Self::fetch_station).
    pub async fn list_all_stations(&self) -> Vec<Station> {
        let requests = self.sources.iter().flat_map(|source| {
            source.regions.iter().map(move |region| async move {
                let result = source.provider.list_stations(region).await;
                (source.kind(), region, result)
            })
        });

        let mut stations: Vec<Station> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (kind, region, result) in join_all(requests).await {
            let listed = match result {
                Ok(listed) => listed,
                Err(e) => {
                    log::warn!("{} listing failed for {:?}: {}", kind, region, e);
                    continue;
                }
            };
            log::debug!("{} listed {} stations for {:?}", kind, listed.len(), region);

            for station in listed {
                match positions.get(&station.id) {
                    Some(&index) => stations[index] = station,
                    None => {
                        positions.insert(station.id.clone(), stations.len());
                        stations.push(station);
                    }
                }
            }
        }

        if let Ok(mut directory) = self.directory.lock() {
            for station in &stations {
                directory.insert(station.id.clone(), station.clone());
            }
        }
        stations
    }

    /// Current reading for one station by canonical ID (`airly-12345`).
    pub async fn fetch_station(&self, id: &str) -> Option<AirQualityData> {
        let Some((kind, raw_id)) = parse_canonical_id(id) else {
            log::warn!("Invalid station ID: {}", id);
            return None;
        };
        let Some(source) = self.source(kind) else {
            log::warn!("Provider {} is not configured", kind);
            return None;
        };

        let known = self
            .directory
            .lock()
            .ok()
            .and_then(|directory| directory.get(id).cloned());
        let station = match known {
            Some(station) => station,
            None => match source.provider.station(raw_id).await {
                Ok(station) => {
                    if let Ok(mut directory) = self.directory.lock() {
                        directory.insert(station.id.clone(), station.clone());
                    }
                    station
                }
                Err(e) => {
                    log::warn!("Station lookup failed for {}: {}", id, e);
                    return None;
                }
            },
        };

        match self.fetch_record(&station).await {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Fetch failed for {}: {}", id, e);
                None
            }
        }
    }

    /// Delete cached responses whose keys start with any of `prefixes`.
    ///
    /// An empty list clears every provider's entries.
    pub async fn clear_cache(&self, prefixes: &[String]) -> usize {
        if prefixes.is_empty() {
            let all: Vec<String> = ProviderKind::ALL
                .iter()
                .map(|kind| format!("{}-", kind.prefix()))
                .collect();
            return self.cache.clear(&all).await;
        }
        self.cache.clear(prefixes).await
    }

    fn source(&self, kind: ProviderKind) -> Option<&ProviderSource> {
        self.sources.iter().find(|source| source.kind() == kind)
    }

    async fn fetch_record(&self, station: &Station) -> FetchResult<AirQualityData> {
        let Some(source) = self.source(station.provider) else {
            return Err(FetchError::provider(
                station.provider,
                0,
                "provider not configured",
            ));
        };
        let raw = source.provider.fetch_current(&station.raw_id).await?;
        normalize(station, &raw, self.cache.now())
    }
}

/// Assembles an [`Aggregator`] from parts.
#[derive(Default)]
pub struct AggregatorBuilder {
    sources: Vec<ProviderSource>,
    cache: Option<TtlCache>,
    batch: BatchConfig,
}

impl AggregatorBuilder {
    /// Build provider clients for every enabled provider.
    ///
    /// Providers that need an API key and have none are skipped with a
    /// warning, so a keyless setup still serves GIOŚ data.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = create_client(&config.http)?;
        let cache = TtlCache::from_config(&config.cache);

        let mut builder = Self::default()
            .cache(cache.clone())
            .batch(config.batch.clone());

        for kind in ProviderKind::ALL {
            let settings = config.provider(kind);
            if !settings.enabled {
                log::debug!("{} disabled", kind);
                continue;
            }
            let has_key = settings
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty());
            if requires_key(kind) && !has_key {
                log::warn!("{} has no API key configured, skipping", kind);
                continue;
            }

            let provider: Arc<dyn AirQualityProvider> = match kind {
                ProviderKind::Airly => Arc::new(AirlyClient::from_config(
                    client.clone(),
                    cache.clone(),
                    settings,
                )?),
                ProviderKind::Aqicn => Arc::new(AqicnClient::from_config(
                    client.clone(),
                    cache.clone(),
                    settings,
                )?),
                ProviderKind::Gios => Arc::new(GiosClient::from_config(
                    client.clone(),
                    cache.clone(),
                    settings,
                )?),
            };
            builder = builder.source(provider, settings.regions.clone());
        }

        if builder.sources.is_empty() {
            log::warn!("No provider could be configured");
        }
        Ok(builder)
    }

    pub fn source(mut self, provider: Arc<dyn AirQualityProvider>, regions: Vec<Region>) -> Self {
        self.sources.push(ProviderSource::new(provider, regions));
        self
    }

    pub fn cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn build(self) -> Aggregator {
        Aggregator {
            sources: self.sources,
            cache: self.cache.unwrap_or_else(TtlCache::in_memory),
            orchestrator: BatchOrchestrator::new(&self.batch),
            directory: Mutex::new(HashMap::new()),
        }
    }
}

fn requires_key(kind: ProviderKind) -> bool {
    matches!(kind, ProviderKind::Airly | ProviderKind::Aqicn)
}
