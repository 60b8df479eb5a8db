// src/providers/aqicn.rs

//! AQICN / World Air Quality Index client (`https://api.waqi.info`).
//!
//! Stations are identified by `@`-prefixed UIDs (`@62983`). The token travels
//! as the `token` query parameter. Errors are reported in-band with HTTP 200
//! and `{"status": "error", "data": "<message>"}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::{AppError, FetchError, FetchResult, Result};
use crate::models::{
    Address, BoundingBox, Location, ProviderConfig, ProviderKind, Region, Station,
};
use crate::providers::http::{endpoint, get_json};
use crate::providers::{AirQualityProvider, RawMeasurement, collect_each, read_through};

pub const DEFAULT_BASE_URL: &str = "https://api.waqi.info";

const KIND: ProviderKind = ProviderKind::Aqicn;

// --- Response schemas ---

/// AQI as reported: a number, a numeric string, or `"-"` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AqiValue {
    Number(f64),
    Text(String),
}

impl AqiValue {
    pub fn as_f64(&self) -> Option<f64> {
        let value: Option<f64> = match self {
            AqiValue::Number(n) => Some(*n),
            AqiValue::Text(s) => s.trim().parse().ok(),
        };
        value.filter(|n| n.is_finite() && *n >= 0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    status: String,
    data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnStationInfo {
    pub name: String,
    #[serde(default)]
    pub time: Option<String>,
}

/// Entry of `/map/bounds/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnBoundsStation {
    pub lat: f64,
    pub lon: f64,
    pub uid: i64,
    pub aqi: AqiValue,
    pub station: AqicnStationInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnCity {
    #[serde(default)]
    pub geo: Vec<f64>,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Individual (per-pollutant) reading: `{"v": 12}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnIaqi {
    pub v: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnTime {
    #[serde(default)]
    pub s: Option<String>,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub iso: Option<String>,
    #[serde(default)]
    pub v: Option<i64>,
}

/// Payload of `/feed/@{uid}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqicnFeed {
    pub aqi: AqiValue,
    pub idx: i64,
    pub city: AqicnCity,
    #[serde(default)]
    pub dominentpol: Option<String>,
    #[serde(default)]
    pub iaqi: BTreeMap<String, AqicnIaqi>,
    #[serde(default)]
    pub time: Option<AqicnTime>,
}

impl AqicnFeed {
    /// Individual reading for a pollutant or weather key (`pm25`, `t`, `w`).
    pub fn iaqi(&self, key: &str) -> Option<f64> {
        self.iaqi.get(key).map(|i| i.v).filter(|v| v.is_finite())
    }

    /// Station metadata carried by the feed.
    pub fn station(&self) -> FetchResult<Station> {
        let location = match self.city.geo.as_slice() {
            [lat, lon, ..] => Location::new(*lat, *lon),
            _ => {
                return Err(FetchError::malformed(
                    KIND,
                    format!("feed @{} has no coordinates", self.idx),
                ));
            }
        };
        if !location.is_valid() {
            return Err(FetchError::malformed(
                KIND,
                format!("feed @{} has invalid coordinates", self.idx),
            ));
        }
        Ok(
            Station::new(KIND, format!("@{}", self.idx), &self.city.name, location).with_address(
                Address {
                    display: Some(self.city.name.clone()),
                    ..Address::default()
                },
            ),
        )
    }
}

impl AqicnBoundsStation {
    pub fn into_station(self) -> FetchResult<Station> {
        let location = Location::new(self.lat, self.lon);
        if !location.is_valid() {
            return Err(FetchError::malformed(
                KIND,
                format!("station @{} has invalid coordinates", self.uid),
            ));
        }
        Ok(Station::new(
            KIND,
            format!("@{}", self.uid),
            self.station.name,
            location,
        ))
    }
}

/// Map an in-band error message to the error taxonomy.
fn in_band_error(message: &str) -> FetchError {
    let lower = message.to_lowercase();
    let throttled = ["over quota", "quota exceeded", "rate limit", "too many requests"];
    if throttled.iter().any(|phrase| lower.contains(phrase)) {
        FetchError::RateLimited {
            provider: KIND,
            retry_after: None,
        }
    } else if lower.contains("invalid key") {
        FetchError::provider(KIND, 401, message)
    } else if lower.contains("unknown station") {
        FetchError::provider(KIND, 404, message)
    } else {
        FetchError::provider(KIND, 200, message)
    }
}

/// Unwrap the `{status, data}` envelope.
pub fn unwrap_envelope<T: DeserializeOwned>(body: serde_json::Value) -> FetchResult<T> {
    let envelope: Envelope =
        serde_json::from_value(body).map_err(|e| FetchError::malformed(KIND, e))?;
    if envelope.status != "ok" {
        let message = match &envelope.data {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(in_band_error(&message));
    }
    serde_json::from_value(envelope.data).map_err(|e| FetchError::malformed(KIND, e))
}

/// Accept `@62983` as well as a bare `62983`.
fn uid(raw_id: &str) -> String {
    if raw_id.starts_with('@') {
        raw_id.to_string()
    } else {
        format!("@{raw_id}")
    }
}

// --- Client ---

/// AQICN API client.
pub struct AqicnClient {
    client: Client,
    cache: TtlCache,
    token: String,
    base_url: String,
}

impl AqicnClient {
    pub fn new(client: Client, cache: TtlCache, token: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Build from provider configuration; a token is required.
    pub fn from_config(client: Client, cache: TtlCache, config: &ProviderConfig) -> Result<Self> {
        let token = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::config("aqicn.api_key (token) is required"))?;
        let mut aqicn = Self::new(client, cache, token);
        if let Some(base_url) = &config.base_url {
            url::Url::parse(base_url)?;
            aqicn.base_url = base_url.clone();
        }
        Ok(aqicn)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        let mut params = query.to_vec();
        params.push(("token", self.token.clone()));
        let url = endpoint(KIND, &self.base_url, path, &params)?;
        log::debug!("GET {}{}", self.base_url, path);
        let body: serde_json::Value = get_json(KIND, self.client.get(url)).await?;
        unwrap_envelope(body)
    }

    async fn bounds(&self, bbox: &BoundingBox) -> FetchResult<Vec<Station>> {
        let latlng = format!("{},{},{},{}", bbox.south, bbox.west, bbox.north, bbox.east);
        let entries: Vec<AqicnBoundsStation> =
            self.get("/map/bounds/", &[("latlng", latlng)]).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry.into_station() {
                Ok(station) => Some(station),
                Err(e) => {
                    log::warn!("Dropping AQICN station: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn feed(&self, raw_id: &str) -> FetchResult<AqicnFeed> {
        let uid = uid(raw_id);
        let key = KIND.cache_key("measurements", &uid);
        read_through(&self.cache, &key, || async {
            self.get(&format!("/feed/{uid}/"), &[]).await
        })
        .await
    }
}

#[async_trait]
impl AirQualityProvider for AqicnClient {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn list_stations(&self, region: &Region) -> FetchResult<Vec<Station>> {
        if let Region::Stations { ids } = region {
            return collect_each(ids, |id| async move { self.station(&id).await }).await;
        }

        let key = KIND.cache_key("stations", &region.cache_params());
        read_through(&self.cache, &key, || async {
            match region {
                Region::Bounds(bbox) => self.bounds(bbox).await,
                Region::Nearest {
                    latitude,
                    longitude,
                    max_distance_km,
                    ..
                } => {
                    let bbox =
                        BoundingBox::around(Location::new(*latitude, *longitude), *max_distance_km);
                    let stations = self.bounds(&bbox).await?;
                    Ok(region.select(stations))
                }
                Region::Stations { .. } => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn fetch_current(&self, raw_id: &str) -> FetchResult<RawMeasurement> {
        self.feed(raw_id).await.map(RawMeasurement::Aqicn)
    }

    async fn station(&self, raw_id: &str) -> FetchResult<Station> {
        self.feed(raw_id).await?.station()
    }
}
