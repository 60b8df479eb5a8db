//! Normalizer: provider payloads → canonical [`AirQualityData`].
//!
//! Pure and deterministic. `fetched_at` is only used when the provider
//! reports no observation time.

pub mod aqi;
pub mod epa;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{FetchError, FetchResult};
use crate::models::{
    AirQualityData, HistoricalPoint, IndexEntry, Measurement, Pollutants, ProviderKind, Station,
};
use crate::providers::RawMeasurement;
use crate::providers::airly::{AirlyIndex, AirlyMeasurements, AirlyReading};
use crate::providers::aqicn::AqicnFeed;
use crate::providers::gios::{GiosIndex, GiosReadings};

pub use aqi::{AQI_BANDS, AqiBand, classify, index_entry};
pub use epa::{Pollutant, aqi_from_concentration, concentration_from_aqi};

/// Most recent GIOŚ hours kept as history.
pub const GIOS_HISTORY_POINTS: usize = 24;

const KMH_PER_MS: f64 = 3.6;

// GIOŚ index level id → map color
const GIOS_LEVEL_COLORS: [&str; 6] = [
    "#57B108", "#B0DD10", "#FFD911", "#E58100", "#E50000", "#990000",
];

/// Turn one provider snapshot into the canonical record for `station`.
pub fn normalize(
    station: &Station,
    raw: &RawMeasurement,
    fetched_at: DateTime<Utc>,
) -> FetchResult<AirQualityData> {
    let provider = raw.provider();
    if station.provider != provider {
        return Err(FetchError::malformed(
            provider,
            format!("payload does not belong to station {}", station.id),
        ));
    }
    if !station.location.is_valid() {
        return Err(FetchError::malformed(
            provider,
            format!(
                "station {} has invalid coordinates ({}, {})",
                station.id, station.location.latitude, station.location.longitude
            ),
        ));
    }

    let fallback = fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let (current, historical_data) = match raw {
        RawMeasurement::Airly(payload) => from_airly(payload, &fallback),
        RawMeasurement::Aqicn(feed) => (from_aqicn(feed, &fallback), None),
        RawMeasurement::Gios(readings) => from_gios(readings, &fallback),
    };

    Ok(AirQualityData {
        source: station.clone(),
        current,
        historical_data,
    })
}

// ---------------------------------------------------------------------------
// Airly
// ---------------------------------------------------------------------------

fn from_airly(
    payload: &AirlyMeasurements,
    fallback: &str,
) -> (Measurement, Option<Vec<HistoricalPoint>>) {
    let reading = &payload.current;
    let current = Measurement {
        timestamp: airly_timestamp(reading).unwrap_or_else(|| fallback.to_string()),
        pollutants: airly_pollutants(reading),
        temperature: reading.value("TEMPERATURE"),
        humidity: reading.value("HUMIDITY"),
        pressure: reading.value("PRESSURE"),
        wind_speed: reading
            .value("WIND_SPEED")
            .map(|kmh| round_to(kmh / KMH_PER_MS, 2)),
        indexes: reading.indexes.iter().filter_map(airly_index).collect(),
        provider: ProviderKind::Airly,
    };

    let history: Vec<HistoricalPoint> = payload
        .history
        .iter()
        .filter_map(|reading| {
            let pollutants = airly_pollutants(reading);
            if pollutants.is_empty() {
                return None;
            }
            Some(HistoricalPoint {
                timestamp: airly_timestamp(reading)?,
                pollutants,
            })
        })
        .collect();

    (current, non_empty(history))
}

fn airly_timestamp(reading: &AirlyReading) -> Option<String> {
    reading
        .till_date_time
        .clone()
        .or_else(|| reading.from_date_time.clone())
}

fn airly_pollutants(reading: &AirlyReading) -> Pollutants {
    let concentration = |name: &str| reading.value(name).filter(|v| *v >= 0.0);
    Pollutants {
        pm1: concentration("PM1"),
        pm25: concentration("PM25"),
        pm10: concentration("PM10"),
        no2: concentration("NO2"),
        so2: concentration("SO2"),
        o3: concentration("O3"),
        co: concentration("CO"),
    }
}

/// Keep provider wording when present, otherwise classify the raw value.
fn airly_index(index: &AirlyIndex) -> Option<IndexEntry> {
    let value = index.value.filter(|v| v.is_finite())?;
    let band = classify(value)?;

    // Airly reports "UNKNOWN" when it could not compute the level
    let level = index
        .level
        .as_ref()
        .filter(|l| !l.eq_ignore_ascii_case("unknown"))
        .cloned();

    match level {
        Some(level) => Some(IndexEntry {
            name: index.name.clone(),
            value: Some(value),
            level,
            description: text_or(index.description.as_deref(), band.description),
            advice: text_or(index.advice.as_deref(), band.advice),
            color: text_or(index.color.as_deref(), band.color),
        }),
        None => index_entry(&index.name, value),
    }
}

// ---------------------------------------------------------------------------
// AQICN
// ---------------------------------------------------------------------------

fn from_aqicn(feed: &AqicnFeed, fallback: &str) -> Measurement {
    let concentration = |key: &str, pollutant: Pollutant| {
        feed.iaqi(key)
            .and_then(|aqi| concentration_from_aqi(pollutant, aqi))
    };

    let timestamp = feed.time.as_ref().and_then(|time| {
        time.iso
            .clone()
            .or_else(|| time.s.as_deref().and_then(naive_iso))
    });

    Measurement {
        timestamp: timestamp.unwrap_or_else(|| fallback.to_string()),
        pollutants: Pollutants {
            pm1: None,
            pm25: concentration("pm25", Pollutant::Pm25),
            pm10: concentration("pm10", Pollutant::Pm10),
            no2: concentration("no2", Pollutant::No2),
            so2: concentration("so2", Pollutant::So2),
            o3: concentration("o3", Pollutant::O3),
            co: concentration("co", Pollutant::Co),
        },
        temperature: feed.iaqi("t"),
        humidity: feed.iaqi("h"),
        pressure: feed.iaqi("p"),
        wind_speed: feed.iaqi("w"),
        indexes: feed
            .aqi
            .as_f64()
            .and_then(|aqi| index_entry("AQI", aqi))
            .into_iter()
            .collect(),
        provider: ProviderKind::Aqicn,
    }
}

// ---------------------------------------------------------------------------
// GIOŚ
// ---------------------------------------------------------------------------

fn from_gios(
    readings: &GiosReadings,
    fallback: &str,
) -> (Measurement, Option<Vec<HistoricalPoint>>) {
    let mut pollutants = Pollutants::default();
    let mut observed: Option<&str> = None;

    for series in &readings.series {
        let Some(latest) = series.latest() else {
            continue;
        };
        let Some(value) = latest.value else {
            continue;
        };
        if set_pollutant(&mut pollutants, &series.key, value) {
            // "YYYY-MM-DD HH:MM:SS" sorts lexically
            if observed.is_none_or(|seen| latest.date.as_str() > seen) {
                observed = Some(latest.date.as_str());
            }
        }
    }

    let timestamp = observed
        .and_then(naive_iso)
        .or_else(|| {
            readings
                .index
                .as_ref()
                .and_then(|index| index.st_source_data_date.as_deref())
                .and_then(naive_iso)
        })
        .unwrap_or_else(|| fallback.to_string());

    let mut indexes = Vec::new();
    if let Some(primary) = gios_aqi(&pollutants).and_then(|aqi| index_entry("AQI", aqi)) {
        indexes.push(primary);
        // categorical only; never the primary entry
        if let Some(level) = readings.index.as_ref().and_then(gios_level) {
            indexes.push(level);
        }
    }

    let current = Measurement {
        timestamp,
        pollutants,
        temperature: None,
        humidity: None,
        pressure: None,
        wind_speed: None,
        indexes,
        provider: ProviderKind::Gios,
    };

    (current, non_empty(gios_history(readings)))
}

/// Store a GIOŚ series value; false for parameters outside the canonical set.
fn set_pollutant(pollutants: &mut Pollutants, code: &str, value: f64) -> bool {
    if !value.is_finite() || value < 0.0 {
        return false;
    }
    let slot = match code.to_ascii_uppercase().as_str() {
        "PM1" => &mut pollutants.pm1,
        "PM2.5" | "PM25" => &mut pollutants.pm25,
        "PM10" => &mut pollutants.pm10,
        "NO2" => &mut pollutants.no2,
        "SO2" => &mut pollutants.so2,
        "O3" => &mut pollutants.o3,
        "CO" => &mut pollutants.co,
        _ => return false,
    };
    *slot = Some(value);
    true
}

/// Highest EPA sub-index over the measured pollutants.
fn gios_aqi(pollutants: &Pollutants) -> Option<f64> {
    [
        (Pollutant::Pm25, pollutants.pm25),
        (Pollutant::Pm10, pollutants.pm10),
        (Pollutant::O3, pollutants.o3),
        (Pollutant::No2, pollutants.no2),
        (Pollutant::So2, pollutants.so2),
        (Pollutant::Co, pollutants.co),
    ]
    .into_iter()
    .filter_map(|(pollutant, value)| aqi_from_concentration(pollutant, value?))
    .reduce(f64::max)
}

fn gios_level(index: &GiosIndex) -> Option<IndexEntry> {
    let level = index.st_index_level.as_ref()?;
    let color = usize::try_from(level.id)
        .ok()
        .and_then(|id| GIOS_LEVEL_COLORS.get(id))?;
    Some(IndexEntry {
        name: "GIOS".to_string(),
        value: None,
        level: level.index_level_name.clone(),
        description: level.index_level_name.clone(),
        advice: String::new(),
        color: color.to_string(),
    })
}

fn gios_history(readings: &GiosReadings) -> Vec<HistoricalPoint> {
    let mut by_date: BTreeMap<&str, Pollutants> = BTreeMap::new();
    for series in &readings.series {
        for point in &series.values {
            let Some(value) = point.value else { continue };
            let mut pollutants = by_date.get(point.date.as_str()).cloned().unwrap_or_default();
            if set_pollutant(&mut pollutants, &series.key, value) {
                by_date.insert(point.date.as_str(), pollutants);
            }
        }
    }

    by_date
        .into_iter()
        .rev()
        .take(GIOS_HISTORY_POINTS)
        .filter_map(|(date, pollutants)| {
            Some(HistoricalPoint {
                timestamp: naive_iso(date)?,
                pollutants,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// "YYYY-MM-DD HH:MM:SS" (local, no offset) → "YYYY-MM-DDTHH:MM:SS".
fn naive_iso(value: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn text_or(text: Option<&str>, default: &str) -> String {
    match text {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::TimeZone;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn airly_station() -> Station {
        Station::new(ProviderKind::Airly, "12345", "Gdańsk", Location::new(54.35, 18.64))
    }

    fn aqicn_station() -> Station {
        Station::new(ProviderKind::Aqicn, "@62983", "Gdynia", Location::new(54.52, 18.53))
    }

    fn gios_station() -> Station {
        Station::new(ProviderKind::Gios, "731", "Gdańsk Leczkowa", Location::new(54.38, 18.62))
    }

    fn airly_raw() -> RawMeasurement {
        let payload: AirlyMeasurements = serde_json::from_value(serde_json::json!({
            "current": {
                "fromDateTime": "2026-03-01T10:00:00.000Z",
                "tillDateTime": "2026-03-01T11:00:00.000Z",
                "values": [
                    {"name": "PM25", "value": 45.2},
                    {"name": "PM10", "value": 60.1},
                    {"name": "TEMPERATURE", "value": -2.5},
                    {"name": "WIND_SPEED", "value": 18.0}
                ],
                "indexes": [{"name": "AIRLY_CAQI", "value": 120.0}]
            },
            "history": [
                {
                    "fromDateTime": "2026-03-01T09:00:00.000Z",
                    "tillDateTime": "2026-03-01T10:00:00.000Z",
                    "values": [{"name": "PM25", "value": 40.0}],
                    "indexes": []
                },
                {
                    "fromDateTime": "2026-03-01T08:00:00.000Z",
                    "tillDateTime": "2026-03-01T09:00:00.000Z",
                    "values": [],
                    "indexes": []
                }
            ]
        }))
        .unwrap();
        RawMeasurement::Airly(payload)
    }

    fn aqicn_raw(aqi: serde_json::Value) -> RawMeasurement {
        let feed: AqicnFeed = serde_json::from_value(serde_json::json!({
            "aqi": aqi,
            "idx": 62983,
            "city": {"geo": [54.52, 18.53], "name": "Gdynia"},
            "dominentpol": "pm25",
            "iaqi": {
                "pm25": {"v": 42},
                "no2": {"v": 50},
                "t": {"v": 4.5},
                "w": {"v": 3.1}
            },
            "time": {"s": "2026-03-01 11:00:00", "tz": "+01:00", "iso": "2026-03-01T11:00:00+01:00"}
        }))
        .unwrap();
        RawMeasurement::Aqicn(feed)
    }

    fn gios_raw() -> RawMeasurement {
        let readings: GiosReadings = serde_json::from_value(serde_json::json!({
            "stationId": 731,
            "series": [
                {"key": "PM10", "values": [
                    {"date": "2026-03-01 11:00:00", "value": null},
                    {"date": "2026-03-01 10:00:00", "value": 30.0},
                    {"date": "2026-03-01 09:00:00", "value": 28.0}
                ]},
                {"key": "NO2", "values": [
                    {"date": "2026-03-01 11:00:00", "value": 20.0},
                    {"date": "2026-03-01 10:00:00", "value": 18.0}
                ]},
                {"key": "C6H6", "values": [
                    {"date": "2026-03-01 11:00:00", "value": 1.2}
                ]}
            ],
            "index": {
                "id": 731,
                "stCalcDate": "2026-03-01 11:20:00",
                "stIndexLevel": {"id": 1, "indexLevelName": "Dobry"},
                "stSourceDataDate": "2026-03-01 11:00:00"
            }
        }))
        .unwrap();
        RawMeasurement::Gios(readings)
    }

    #[test]
    fn test_normalize_is_deterministic() {
        for (station, raw) in [
            (airly_station(), airly_raw()),
            (aqicn_station(), aqicn_raw(serde_json::json!(42))),
            (gios_station(), gios_raw()),
        ] {
            let first = normalize(&station, &raw, fetched_at()).unwrap();
            let second = normalize(&station, &raw, fetched_at()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_airly_unclassified_index_uses_shared_table() {
        let record = normalize(&airly_station(), &airly_raw(), fetched_at()).unwrap();
        let primary = record.current.primary_index().unwrap();
        assert_eq!(primary.name, "AIRLY_CAQI");
        assert_eq!(primary.value, Some(120.0));
        assert_eq!(primary.description, "Umiarkowana");
        assert_eq!(record.current.provider, ProviderKind::Airly);
        assert_eq!(record.current.timestamp, "2026-03-01T11:00:00.000Z");
    }

    #[test]
    fn test_airly_units_and_missing_values() {
        let record = normalize(&airly_station(), &airly_raw(), fetched_at()).unwrap();
        let current = &record.current;
        assert_eq!(current.pollutants.pm25, Some(45.2));
        assert_eq!(current.temperature, Some(-2.5));
        // 18 km/h
        assert_eq!(current.wind_speed, Some(5.0));
        assert_eq!(current.pollutants.no2, None);
        assert_eq!(current.humidity, None);

        let history = record.historical_data.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, "2026-03-01T10:00:00.000Z");
        assert_eq!(history[0].pollutants.pm25, Some(40.0));
    }

    #[test]
    fn test_airly_provider_wording_is_kept() {
        let index = AirlyIndex {
            name: "AIRLY_CAQI".into(),
            value: Some(30.0),
            level: Some("LOW".into()),
            description: Some("Air is quite good.".into()),
            advice: None,
            color: Some("#D1CF1E".into()),
        };
        let entry = airly_index(&index).unwrap();
        assert_eq!(entry.level, "LOW");
        assert_eq!(entry.description, "Air is quite good.");
        assert_eq!(entry.color, "#D1CF1E");
        assert_eq!(entry.advice, AQI_BANDS[0].advice);

        let unknown = AirlyIndex {
            level: Some("UNKNOWN".into()),
            value: None,
            ..index
        };
        assert!(airly_index(&unknown).is_none());
    }

    #[test]
    fn test_aqicn_subindices_become_concentrations() {
        let record = normalize(&aqicn_station(), &aqicn_raw(serde_json::json!(42)), fetched_at())
            .unwrap();
        let current = &record.current;

        let primary = current.primary_index().unwrap();
        assert_eq!(primary.value, Some(42.0));
        assert_eq!(primary.description, "Bardzo dobra");

        // sub-index 42 → 42 * 12.0 / 50
        assert_eq!(current.pollutants.pm25, Some(10.1));
        assert!(current.pollutants.no2.is_some_and(|c| (c - 99.7).abs() < 0.1));
        assert_eq!(current.pollutants.pm10, None);
        assert_eq!(current.temperature, Some(4.5));
        assert_eq!(current.wind_speed, Some(3.1));
        assert_eq!(current.timestamp, "2026-03-01T11:00:00+01:00");
        assert!(record.historical_data.is_none());
    }

    #[test]
    fn test_aqicn_without_numeric_aqi_has_no_index() {
        let record =
            normalize(&aqicn_station(), &aqicn_raw(serde_json::json!("-")), fetched_at()).unwrap();
        assert!(record.current.indexes.is_empty());
    }

    #[test]
    fn test_gios_derives_primary_aqi() {
        let record = normalize(&gios_station(), &gios_raw(), fetched_at()).unwrap();
        let current = &record.current;

        assert_eq!(current.pollutants.pm10, Some(30.0));
        assert_eq!(current.pollutants.no2, Some(20.0));
        assert_eq!(current.pollutants.pm25, None);
        assert_eq!(current.timestamp, "2026-03-01T11:00:00");

        // PM10 30 µg/m³ → 30 * 50 / 54 ≈ 28
        let primary = current.primary_index().unwrap();
        assert_eq!(primary.name, "AQI");
        assert_eq!(primary.value, Some(28.0));
        assert_eq!(primary.description, "Bardzo dobra");

        let level = &current.indexes[1];
        assert_eq!(level.name, "GIOS");
        assert_eq!(level.value, None);
        assert_eq!(level.level, "Dobry");
    }

    #[test]
    fn test_gios_history_groups_by_date() {
        let record = normalize(&gios_station(), &gios_raw(), fetched_at()).unwrap();
        let history = record.historical_data.unwrap();

        let stamps: Vec<&str> = history.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            ["2026-03-01T11:00:00", "2026-03-01T10:00:00", "2026-03-01T09:00:00"]
        );
        assert_eq!(history[1].pollutants.pm10, Some(30.0));
        assert_eq!(history[1].pollutants.no2, Some(18.0));
        assert_eq!(history[2].pollutants.no2, None);
    }

    #[test]
    fn test_gios_without_readings_is_unknown() {
        let readings = GiosReadings {
            station_id: 731,
            series: Vec::new(),
            index: None,
        };
        let record =
            normalize(&gios_station(), &RawMeasurement::Gios(readings), fetched_at()).unwrap();
        assert!(record.current.indexes.is_empty());
        assert!(record.current.pollutants.is_empty());
        assert_eq!(record.current.timestamp, "2026-03-01T12:00:00Z");
        assert!(record.historical_data.is_none());
    }

    #[test]
    fn test_invalid_station_is_malformed() {
        let mut station = airly_station();
        station.location = Location::new(f64::NAN, 18.0);
        let err = normalize(&station, &airly_raw(), fetched_at()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));

        station.location = Location::new(95.0, 18.0);
        assert!(normalize(&station, &airly_raw(), fetched_at()).is_err());
    }

    #[test]
    fn test_mismatched_provider_is_malformed() {
        let err = normalize(&aqicn_station(), &airly_raw(), fetched_at()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }
}
