// src/providers/gios.rs

//! GIOŚ (Polish Chief Inspectorate of Environmental Protection) client.
//!
//! Public API rooted at `https://api.gios.gov.pl/pjp-api/rest`, no key.
//! A station's current snapshot is assembled from several calls:
//! the sensor list, one data series per sensor, and the station index.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::{FetchError, FetchResult, Result};
use crate::models::{Address, Location, ProviderConfig, ProviderKind, Region, Station};
use crate::providers::http::{endpoint, get_json};
use crate::providers::{AirQualityProvider, RawMeasurement, read_through};

pub const DEFAULT_BASE_URL: &str = "https://api.gios.gov.pl/pjp-api/rest";

const KIND: ProviderKind = ProviderKind::Gios;

/// Sensor series requested at once for one station.
const SENSOR_CONCURRENCY: usize = 2;

// --- Response schemas ---

/// Coordinates arrive as strings (`"54.380279"`) in older payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Coordinate::Number(n) => Some(*n),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosCommune {
    pub commune_name: Option<String>,
    pub district_name: Option<String>,
    pub province_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiosCity {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub commune: Option<GiosCommune>,
}

/// Entry of `/station/findAll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosStation {
    pub id: i64,
    pub station_name: String,
    pub gegr_lat: Option<Coordinate>,
    pub gegr_lon: Option<Coordinate>,
    #[serde(default)]
    pub city: Option<GiosCity>,
    #[serde(default)]
    pub address_street: Option<String>,
}

impl GiosStation {
    pub fn into_station(self) -> FetchResult<Station> {
        let lat = self.gegr_lat.as_ref().and_then(Coordinate::as_f64);
        let lon = self.gegr_lon.as_ref().and_then(Coordinate::as_f64);
        let location = match (lat, lon) {
            (Some(lat), Some(lon)) => Location::new(lat, lon),
            _ => {
                return Err(FetchError::malformed(
                    KIND,
                    format!("station {} has no coordinates", self.id),
                ));
            }
        };
        if !location.is_valid() {
            return Err(FetchError::malformed(
                KIND,
                format!("station {} has invalid coordinates", self.id),
            ));
        }

        let city = self.city.as_ref().map(|c| c.name.clone());
        let region = self
            .city
            .as_ref()
            .and_then(|c| c.commune.as_ref())
            .and_then(|c| c.province_name.clone());

        Ok(
            Station::new(KIND, self.id.to_string(), self.station_name.clone(), location)
                .with_address(Address {
                    street: self.address_street,
                    city,
                    region,
                    country: Some("Polska".to_string()),
                    display: Some(self.station_name),
                }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosParam {
    pub param_name: String,
    pub param_formula: String,
    pub param_code: String,
    pub id_param: i64,
}

/// Entry of `/station/sensors/{stationId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosSensor {
    pub id: i64,
    pub station_id: i64,
    pub param: GiosParam,
}

/// One point of a sensor series; `value` is null until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiosValue {
    pub date: String,
    pub value: Option<f64>,
}

/// Payload of `/data/getData/{sensorId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiosSeries {
    pub key: String,
    #[serde(default)]
    pub values: Vec<GiosValue>,
}

impl GiosSeries {
    /// Most recent non-null point. Series are ordered newest first.
    pub fn latest(&self) -> Option<&GiosValue> {
        self.values.iter().find(|v| v.value.is_some_and(f64::is_finite))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosIndexLevel {
    pub id: i64,
    pub index_level_name: String,
}

/// Payload of `/aqindex/getIndex/{stationId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosIndex {
    pub id: i64,
    #[serde(default)]
    pub st_calc_date: Option<String>,
    #[serde(default)]
    pub st_index_level: Option<GiosIndexLevel>,
    #[serde(default)]
    pub st_source_data_date: Option<String>,
}

/// Assembled snapshot for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosReadings {
    pub station_id: i64,
    pub series: Vec<GiosSeries>,
    #[serde(default)]
    pub index: Option<GiosIndex>,
}

// --- Client ---

/// GIOŚ API client.
pub struct GiosClient {
    client: Client,
    cache: TtlCache,
    base_url: String,
}

impl GiosClient {
    pub fn new(client: Client, cache: TtlCache) -> Self {
        Self {
            client,
            cache,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_config(client: Client, cache: TtlCache, config: &ProviderConfig) -> Result<Self> {
        let mut gios = Self::new(client, cache);
        if let Some(base_url) = &config.base_url {
            url::Url::parse(base_url)?;
            gios.base_url = base_url.clone();
        }
        Ok(gios)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> FetchResult<T> {
        let url = endpoint(KIND, &self.base_url, path, &[])?;
        log::debug!("GET {}", url);
        get_json(KIND, self.client.get(url)).await
    }

    /// Full station directory; GIOŚ has no geographic query.
    async fn all_stations(&self) -> FetchResult<Vec<Station>> {
        let key = KIND.cache_key("stations", "all");
        read_through(&self.cache, &key, || async {
            let stations: Vec<GiosStation> = self.get("/station/findAll").await?;
            Ok(stations
                .into_iter()
                .filter_map(|station| match station.into_station() {
                    Ok(station) => Some(station),
                    Err(e) => {
                        log::warn!("Dropping GIOŚ station: {}", e);
                        None
                    }
                })
                .collect::<Vec<_>>())
        })
        .await
    }

    /// Sensor list, data series and index for one station.
    ///
    /// Individual series may fail; the snapshot fails when none arrived, so a
    /// cached reading is served instead of an empty one.
    async fn readings(&self, station_id: i64) -> FetchResult<GiosReadings> {
        let sensors: Vec<GiosSensor> = self.get(&format!("/station/sensors/{station_id}")).await?;
        if sensors.is_empty() {
            return Err(FetchError::malformed(
                KIND,
                format!("station {station_id} has no sensors"),
            ));
        }

        let series_futures: Vec<_> = sensors
            .iter()
            .map(|sensor| async move {
                let result: FetchResult<GiosSeries> =
                    self.get(&format!("/data/getData/{}", sensor.id)).await;
                result
                    .map(|mut series| {
                        // Prefer the parameter code over the free-form key
                        series.key = sensor.param.param_code.clone();
                        series
                    })
                    .map_err(|e| (sensor.id, e))
            })
            .collect();
        let series_results: Vec<_> = stream::iter(series_futures)
            .buffered(SENSOR_CONCURRENCY)
            .collect()
            .await;

        let mut series = Vec::with_capacity(series_results.len());
        let mut first_error = None;
        for result in series_results {
            match result {
                Ok(s) => series.push(s),
                Err((_, e)) if e.is_rate_limited() => return Err(e),
                Err((sensor_id, e)) => {
                    log::warn!("GIOŚ sensor {} skipped: {}", sensor_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(error) = first_error.filter(|_| series.is_empty()) {
            return Err(error);
        }

        let index = match self.get::<GiosIndex>(&format!("/aqindex/getIndex/{station_id}")).await {
            Ok(index) => Some(index),
            Err(e) => {
                log::debug!("GIOŚ index for station {} unavailable: {}", station_id, e);
                None
            }
        };

        Ok(GiosReadings {
            station_id,
            series,
            index,
        })
    }
}

fn parse_station_id(raw_id: &str) -> FetchResult<i64> {
    raw_id
        .parse()
        .map_err(|_| FetchError::provider(KIND, 404, format!("invalid station id {raw_id:?}")))
}

#[async_trait]
impl AirQualityProvider for GiosClient {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn list_stations(&self, region: &Region) -> FetchResult<Vec<Station>> {
        Ok(region.select(self.all_stations().await?))
    }

    async fn fetch_current(&self, raw_id: &str) -> FetchResult<RawMeasurement> {
        let station_id = parse_station_id(raw_id)?;
        let key = KIND.cache_key("measurements", raw_id);
        let readings = read_through(&self.cache, &key, || self.readings(station_id)).await?;
        Ok(RawMeasurement::Gios(readings))
    }

    async fn station(&self, raw_id: &str) -> FetchResult<Station> {
        parse_station_id(raw_id)?;
        self.all_stations()
            .await?
            .into_iter()
            .find(|s| s.raw_id == raw_id)
            .ok_or_else(|| FetchError::provider(KIND, 404, format!("unknown station {raw_id}")))
    }
}
