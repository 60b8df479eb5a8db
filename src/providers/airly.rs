// src/providers/airly.rs

//! Airly client (`https://airapi.airly.eu/v2`).
//!
//! Installations are identified by numeric IDs. The API key travels in the
//! `apikey` header.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::{AppError, FetchError, FetchResult, Result};
use crate::models::{Address, Location, ProviderConfig, ProviderKind, Region, Station};
use crate::providers::http::{endpoint, get_json};
use crate::providers::{AirQualityProvider, RawMeasurement, collect_each, read_through};

pub const DEFAULT_BASE_URL: &str = "https://airapi.airly.eu/v2";

const KIND: ProviderKind = ProviderKind::Airly;

/// Results requested when a bounding box is emulated with a radius query.
const BOUNDS_MAX_RESULTS: usize = 100;

// --- Response schemas ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirlyLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirlyAddress {
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub display_address1: Option<String>,
    pub display_address2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirlyInstallation {
    pub id: i64,
    pub location: Option<AirlyLocation>,
    #[serde(default)]
    pub address: Option<AirlyAddress>,
    #[serde(default)]
    pub elevation: Option<f64>,
}

/// A named measured value (`PM25`, `TEMPERATURE`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirlyValue {
    pub name: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirlyIndex {
    pub name: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirlyReading {
    pub from_date_time: Option<String>,
    pub till_date_time: Option<String>,
    #[serde(default)]
    pub values: Vec<AirlyValue>,
    #[serde(default)]
    pub indexes: Vec<AirlyIndex>,
}

impl AirlyReading {
    /// Value of a named measurement, if reported.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .and_then(|v| v.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirlyMeasurements {
    pub current: AirlyReading,
    #[serde(default)]
    pub history: Vec<AirlyReading>,
}

impl AirlyInstallation {
    /// Convert to a canonical station; installations without coordinates are rejected.
    pub fn into_station(self) -> FetchResult<Station> {
        let raw_id = self.id.to_string();
        let location = self
            .location
            .map(|l| Location::new(l.latitude, l.longitude))
            .filter(Location::is_valid)
            .ok_or_else(|| {
                FetchError::malformed(KIND, format!("installation {raw_id} has no valid location"))
            })?;

        let address = self.address.unwrap_or_default();
        let street = match (&address.street, &address.number) {
            (Some(street), Some(number)) => Some(format!("{street} {number}")),
            (Some(street), None) => Some(street.clone()),
            _ => None,
        };
        let display = match (&address.display_address1, &address.display_address2) {
            (Some(a), Some(b)) => Some(format!("{a}, {b}")),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let name = display
            .clone()
            .or_else(|| street.clone())
            .or_else(|| address.city.clone())
            .unwrap_or_else(|| format!("Airly #{raw_id}"));

        Ok(Station::new(KIND, raw_id, name, location).with_address(Address {
            street,
            city: address.city,
            region: None,
            country: address.country,
            display,
        }))
    }
}

// --- Client ---

/// Airly API client.
pub struct AirlyClient {
    client: Client,
    cache: TtlCache,
    api_key: String,
    base_url: String,
}

impl AirlyClient {
    pub fn new(client: Client, cache: TtlCache, api_key: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Build from provider configuration; an API key is required.
    pub fn from_config(client: Client, cache: TtlCache, config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::config("airly.api_key is required"))?;
        let mut airly = Self::new(client, cache, api_key);
        if let Some(base_url) = &config.base_url {
            url::Url::parse(base_url)?;
            airly.base_url = base_url.clone();
        }
        Ok(airly)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        let url = endpoint(KIND, &self.base_url, path, query)?;
        log::debug!("GET {}", url);
        let request = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Accept", "application/json");
        get_json(KIND, request).await
    }

    async fn nearest(
        &self,
        center: Location,
        max_distance_km: f64,
        max_results: usize,
    ) -> FetchResult<Vec<Station>> {
        let installations: Vec<AirlyInstallation> = self
            .get(
                "/installations/nearest",
                &[
                    ("lat", center.latitude.to_string()),
                    ("lng", center.longitude.to_string()),
                    ("maxDistanceKM", max_distance_km.to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;

        Ok(installations
            .into_iter()
            .filter_map(|installation| match installation.into_station() {
                Ok(station) => Some(station),
                Err(e) => {
                    log::warn!("Dropping Airly installation: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl AirQualityProvider for AirlyClient {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn list_stations(&self, region: &Region) -> FetchResult<Vec<Station>> {
        if let Region::Stations { ids } = region {
            return collect_each(ids, |id| async move { self.station(&id).await }).await;
        }

        let key = KIND.cache_key("installations", &region.cache_params());
        read_through(&self.cache, &key, || async {
            match region {
                Region::Nearest {
                    latitude,
                    longitude,
                    max_distance_km,
                    max_results,
                } => {
                    self.nearest(
                        Location::new(*latitude, *longitude),
                        *max_distance_km,
                        *max_results,
                    )
                    .await
                }
                Region::Bounds(bbox) => {
                    let stations = self
                        .nearest(bbox.center(), bbox.radius_km(), BOUNDS_MAX_RESULTS)
                        .await?;
                    Ok(region.select(stations))
                }
                Region::Stations { .. } => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn fetch_current(&self, raw_id: &str) -> FetchResult<RawMeasurement> {
        let key = KIND.cache_key("measurements", raw_id);
        let measurements: AirlyMeasurements = read_through(&self.cache, &key, || async {
            self.get(
                "/measurements/installation",
                &[("installationId", raw_id.to_string())],
            )
            .await
        })
        .await?;
        Ok(RawMeasurement::Airly(measurements))
    }

    async fn station(&self, raw_id: &str) -> FetchResult<Station> {
        let key = KIND.cache_key("installation", raw_id);
        read_through(&self.cache, &key, || async {
            let installation: AirlyInstallation =
                self.get(&format!("/installations/{raw_id}"), &[]).await?;
            installation.into_station()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpConfig;
    use crate::providers::http::create_client;
    use crate::providers::testing::StubServer;

    const INSTALLATIONS: &str = r#"[
        {
            "id": 12345,
            "location": {"latitude": 54.352, "longitude": 18.646},
            "address": {
                "country": "Poland", "city": "Gdańsk", "street": "Długa", "number": "1",
                "displayAddress1": "Gdańsk", "displayAddress2": "Długa"
            },
            "elevation": 10.0,
            "airly": true,
            "sponsor": {"id": 1, "name": "Airly"}
        },
        {"id": 999, "location": null, "address": null}
    ]"#;

    const MEASUREMENTS: &str = r##"{
        "current": {
            "fromDateTime": "2026-10-16T10:00:00.000Z",
            "tillDateTime": "2026-10-16T11:00:00.000Z",
            "values": [
                {"name": "PM1", "value": 8.1},
                {"name": "PM25", "value": 12.4},
                {"name": "PM10", "value": 20.0},
                {"name": "TEMPERATURE", "value": 11.5},
                {"name": "WIND_SPEED", "value": 18.0}
            ],
            "indexes": [
                {"name": "AIRLY_CAQI", "value": 24.8, "level": "VERY_LOW",
                 "description": "Great air here today!", "advice": "Go for a walk",
                 "color": "#6BC926"}
            ],
            "standards": []
        },
        "history": [],
        "forecast": []
    }"##;

    fn client(server: &StubServer) -> AirlyClient {
        let http = create_client(&HttpConfig::default()).unwrap();
        AirlyClient::new(http, TtlCache::in_memory(), "key").with_base_url(server.base_url())
    }

    #[test]
    fn test_installation_into_station() {
        let installations: Vec<AirlyInstallation> = serde_json::from_str(INSTALLATIONS).unwrap();
        let mut iter = installations.into_iter();

        let station = iter.next().unwrap().into_station().unwrap();
        assert_eq!(station.id, "airly-12345");
        assert_eq!(station.name, "Gdańsk, Długa");
        let address = station.address.unwrap();
        assert_eq!(address.street.as_deref(), Some("Długa 1"));
        assert_eq!(address.city.as_deref(), Some("Gdańsk"));

        let err = iter.next().unwrap().into_station().unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_reading_value_lookup() {
        let measurements: AirlyMeasurements = serde_json::from_str(MEASUREMENTS).unwrap();
        assert_eq!(measurements.current.value("pm25"), Some(12.4));
        assert_eq!(measurements.current.value("NO2"), None);

        let index = &measurements.current.indexes[0];
        assert_eq!(index.color.as_deref(), Some("#6BC926"));
        assert_eq!(index.level.as_deref(), Some("VERY_LOW"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let http = create_client(&HttpConfig::default()).unwrap();
        let config = ProviderConfig {
            enabled: true,
            api_key: None,
            base_url: None,
            regions: Vec::new(),
        };
        assert!(AirlyClient::from_config(http, TtlCache::in_memory(), &config).is_err());
    }

    #[tokio::test]
    async fn test_list_nearest_drops_installations_without_location() {
        let server = StubServer::start().await;
        server.route("/installations/nearest", 200, INSTALLATIONS);

        let airly = client(&server);
        let region = Region::Nearest {
            latitude: 54.35,
            longitude: 18.65,
            max_distance_km: 10.0,
            max_results: 5,
        };
        let stations = airly.list_stations(&region).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].raw_id, "12345");

        // Second call is served from cache
        airly.list_stations(&region).await.unwrap();
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_fetch_current_rate_limited_serves_cached_value() {
        let server = StubServer::start().await;
        server.route("/measurements/installation", 200, MEASUREMENTS);

        let clock = std::sync::Arc::new(crate::cache::ManualClock::new(chrono::Utc::now()));
        let cache = TtlCache::in_memory().with_clock(clock.clone());
        let http = create_client(&HttpConfig::default()).unwrap();
        let airly = AirlyClient::new(http, cache.clone(), "key").with_base_url(server.base_url());

        let first = airly.fetch_current("12345").await.unwrap();

        clock.advance(TtlCache::DEFAULT_TTL + std::time::Duration::from_secs(1));
        server.route("/measurements/installation", 429, "");

        let second = airly.fetch_current("12345").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(server.hits(), 2);

        // Entry now lives for the long lifetime
        let key = KIND.cache_key("measurements", "12345");
        clock.advance(std::time::Duration::from_secs(20 * 60));
        assert!(cache.get::<AirlyMeasurements>(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_fetch_current_rate_limited_without_cache_fails() {
        let server = StubServer::start().await;
        server.route("/measurements/installation", 429, "");

        let err = client(&server).fetch_current("1").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_list_fixed_stations() {
        let server = StubServer::start().await;
        server.route(
            "/installations/12345",
            200,
            r#"{"id": 12345, "location": {"latitude": 54.35, "longitude": 18.64}}"#,
        );

        let region = Region::Stations {
            ids: vec!["12345".into(), "404404".into()],
        };
        let stations = client(&server).list_stations(&region).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "Airly #12345");
    }
}
