//! Monitoring station data structures.

use std::fmt;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Air-quality data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "Airly")]
    Airly,
    #[serde(rename = "AQICN")]
    Aqicn,
    #[serde(rename = "GIOŚ")]
    Gios,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Airly,
        ProviderKind::Aqicn,
        ProviderKind::Gios,
    ];

    /// Prefix used in canonical station IDs and cache keys.
    pub fn prefix(&self) -> &'static str {
        match self {
            ProviderKind::Airly => "airly",
            ProviderKind::Aqicn => "aqicn",
            ProviderKind::Gios => "gios",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    /// Build a cache key scoped to this provider.
    pub fn cache_key(&self, kind: &str, params: &str) -> String {
        format!("{}-{}-{}", self.prefix(), kind, params)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Airly => "Airly",
            ProviderKind::Aqicn => "AQICN",
            ProviderKind::Gios => "GIOŚ",
        };
        f.write_str(name)
    }
}

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether the coordinates are finite and inside WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Location) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Free-text address fields, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.city.is_none()
            && self.region.is_none()
            && self.country.is_none()
            && self.display.is_none()
    }
}

/// A physical monitoring point operated by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Provider-qualified unique ID, e.g. `aqicn-@62983`
    pub id: String,

    /// Human-readable label
    pub name: String,

    pub location: Location,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    pub provider: ProviderKind,

    /// ID as the provider knows it (`@62983`, `12345`)
    pub raw_id: String,
}

impl Station {
    pub fn new(
        provider: ProviderKind,
        raw_id: impl Into<String>,
        name: impl Into<String>,
        location: Location,
    ) -> Self {
        let raw_id = raw_id.into();
        Self {
            id: canonical_id(provider, &raw_id),
            name: name.into(),
            location,
            address: None,
            provider,
            raw_id,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = if address.is_empty() {
            None
        } else {
            Some(address)
        };
        self
    }
}

/// Build the canonical `{provider}-{rawId}` station ID.
pub fn canonical_id(provider: ProviderKind, raw_id: &str) -> String {
    format!("{}-{}", provider.prefix(), raw_id)
}

/// Split a canonical station ID into provider and raw ID.
pub fn parse_canonical_id(id: &str) -> Option<(ProviderKind, &str)> {
    let (prefix, raw) = id.split_once('-')?;
    if raw.is_empty() {
        return None;
    }
    ProviderKind::from_prefix(prefix).map(|kind| (kind, raw))
}
