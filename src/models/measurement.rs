//! Canonical measurement records returned to consumers.

use serde::{Deserialize, Serialize};

use super::station::{ProviderKind, Station};

/// One air-quality index entry (AQI, CAQI, provider-specific levels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,

    /// Numeric index value; `None` for purely categorical indexes
    pub value: Option<f64>,

    pub level: String,
    pub description: String,
    pub advice: String,
    pub color: String,
}

/// Pollutant concentrations, all in µg/m³ (CO included).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<f64>,
}

impl Pollutants {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Provider-agnostic current-conditions snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// ISO-8601 observation time
    pub timestamp: String,

    #[serde(flatten)]
    pub pollutants: Pollutants,

    /// °C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// %
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// hPa
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,

    /// Primary index first; empty means "unknown"
    pub indexes: Vec<IndexEntry>,

    pub provider: ProviderKind,
}

impl Measurement {
    pub fn primary_index(&self) -> Option<&IndexEntry> {
        self.indexes.first()
    }
}

/// A past reading attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub timestamp: String,
    #[serde(flatten)]
    pub pollutants: Pollutants,
}

/// The unit returned by the aggregation facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualityData {
    pub source: Station,
    pub current: Measurement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<Vec<HistoricalPoint>>,
}
