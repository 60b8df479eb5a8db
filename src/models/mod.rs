// src/models/mod.rs

//! Domain models for the aggregation layer.
//!
//! This module contains all data structures shared between providers,
//! the normalizer and the aggregation facade.

mod config;
mod measurement;
mod region;
mod station;

// Re-export all public types
pub use config::{BatchConfig, CacheConfig, Config, HttpConfig, MAX_BATCH_SIZE, ProviderConfig};
pub use measurement::{AirQualityData, HistoricalPoint, IndexEntry, Measurement, Pollutants};
pub use region::{BoundingBox, Region};
pub use station::{Address, Location, ProviderKind, Station, canonical_id, parse_canonical_id};
