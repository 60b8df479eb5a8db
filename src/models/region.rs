//! Geographic scopes used to query station directories.

use serde::{Deserialize, Serialize};

use super::station::{Location, Station};

/// Kilometres per degree of latitude.
const KM_PER_DEGREE: f64 = 111.32;

/// A latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Approximate box enclosing a circle of `radius_km` around `center`.
    pub fn around(center: Location, radius_km: f64) -> Self {
        let dlat = radius_km / KM_PER_DEGREE;
        let cos = center.latitude.to_radians().cos().abs().max(0.01);
        let dlon = radius_km / (KM_PER_DEGREE * cos);
        Self {
            south: (center.latitude - dlat).max(-90.0),
            west: (center.longitude - dlon).max(-180.0),
            north: (center.latitude + dlat).min(90.0),
            east: (center.longitude + dlon).min(180.0),
        }
    }

    pub fn center(&self) -> Location {
        Location::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Radius of the smallest circle around the center covering the box.
    pub fn radius_km(&self) -> f64 {
        self.center()
            .distance_km(&Location::new(self.north, self.east))
    }

    pub fn contains(&self, location: &Location) -> bool {
        (self.south..=self.north).contains(&location.latitude)
            && (self.west..=self.east).contains(&location.longitude)
    }
}

/// Scope of a `list_stations` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    /// Stations within `max_distance_km` of a point
    Nearest {
        latitude: f64,
        longitude: f64,
        #[serde(default = "default_max_distance_km")]
        max_distance_km: f64,
        #[serde(default = "default_max_results")]
        max_results: usize,
    },
    /// Stations inside a rectangle
    Bounds(BoundingBox),
    /// A fixed list of provider raw IDs
    Stations { ids: Vec<String> },
}

fn default_max_distance_km() -> f64 {
    25.0
}

fn default_max_results() -> usize {
    50
}

impl Region {
    /// Cache key fragment identifying this region.
    pub fn cache_params(&self) -> String {
        match self {
            Region::Nearest {
                latitude,
                longitude,
                max_distance_km,
                max_results,
            } => format!("{latitude}-{longitude}-{max_distance_km}-{max_results}"),
            Region::Bounds(b) => format!("{}-{}-{}-{}", b.south, b.west, b.north, b.east),
            Region::Stations { ids } => ids.join(","),
        }
    }

    /// Filter a full station directory down to this region.
    ///
    /// Nearest results are sorted by distance and truncated to `max_results`.
    pub fn select(&self, stations: Vec<Station>) -> Vec<Station> {
        match self {
            Region::Nearest {
                latitude,
                longitude,
                max_distance_km,
                max_results,
            } => {
                let center = Location::new(*latitude, *longitude);
                let mut within: Vec<(f64, Station)> = stations
                    .into_iter()
                    .map(|s| (center.distance_km(&s.location), s))
                    .filter(|(d, _)| *d <= *max_distance_km)
                    .collect();
                within.sort_by(|a, b| a.0.total_cmp(&b.0));
                within
                    .into_iter()
                    .take(*max_results)
                    .map(|(_, s)| s)
                    .collect()
            }
            Region::Bounds(b) => stations
                .into_iter()
                .filter(|s| b.contains(&s.location))
                .collect(),
            Region::Stations { ids } => stations
                .into_iter()
                .filter(|s| ids.iter().any(|id| *id == s.raw_id))
                .collect(),
        }
    }
}
