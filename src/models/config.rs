//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{BoundingBox, ProviderKind, Region};

/// Upper bound for the number of requests in flight per batch.
pub const MAX_BATCH_SIZE: usize = 10;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Cache lifetimes and persistence
    #[serde(default)]
    pub cache: CacheConfig,

    /// Batch fetching behavior
    #[serde(default)]
    pub batch: BatchConfig,

    /// Provider tables; an empty `regions` list keeps the built-in regions
    #[serde(default = "defaults::airly", deserialize_with = "defaults::airly_table")]
    pub airly: ProviderConfig,

    #[serde(default = "defaults::aqicn", deserialize_with = "defaults::aqicn_table")]
    pub aqicn: ProviderConfig,

    #[serde(default = "defaults::gios", deserialize_with = "defaults::gios_table")]
    pub gios: ProviderConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Settings for one provider.
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Airly => &self.airly,
            ProviderKind::Aqicn => &self.aqicn,
            ProviderKind::Gios => &self.gios,
        }
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Airly => &mut self.airly,
            ProviderKind::Aqicn => &mut self.aqicn,
            ProviderKind::Gios => &mut self.gios,
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(AppError::validation("cache.ttl_secs must be > 0"));
        }
        if self.cache.long_ttl_secs < self.cache.ttl_secs {
            return Err(AppError::validation(
                "cache.long_ttl_secs must be >= cache.ttl_secs",
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch.size) {
            return Err(AppError::validation(format!(
                "batch.size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.batch.item_timeout_secs == 0 {
            return Err(AppError::validation("batch.item_timeout_secs must be > 0"));
        }

        let mut any_enabled = false;
        for kind in ProviderKind::ALL {
            let provider = self.provider(kind);
            if !provider.enabled {
                continue;
            }
            any_enabled = true;
            if provider.regions.is_empty() {
                return Err(AppError::validation(format!(
                    "{} is enabled but has no regions",
                    kind.prefix()
                )));
            }
        }
        if !any_enabled {
            return Err(AppError::validation("No providers enabled"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            airly: defaults::airly(),
            aqicn: defaults::aqicn(),
            gios: defaults::gios(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Cache lifetimes and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Standard entry lifetime
    #[serde(default = "defaults::ttl")]
    pub ttl_secs: u64,

    /// Lifetime given to stale entries revived after a rate-limit response
    #[serde(default = "defaults::long_ttl")]
    pub long_ttl_secs: u64,

    /// Directory for the file-backed cache; in-memory when unset
    #[serde(default)]
    pub directory: Option<String>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.long_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: defaults::ttl(),
            long_ttl_secs: defaults::long_ttl(),
            directory: None,
        }
    }
}

/// Batch fetching behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Requests issued concurrently per batch
    #[serde(default = "defaults::batch_size")]
    pub size: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "defaults::batch_delay")]
    pub delay_ms: u64,

    /// Upper bound for one station fetch, all its requests included
    #[serde(default = "defaults::item_timeout")]
    pub item_timeout_secs: u64,
}

impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: defaults::batch_size(),
            delay_ms: defaults::batch_delay(),
            item_timeout_secs: defaults::item_timeout(),
        }
    }
}

/// Settings for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// API key (`apikey` header for Airly, `token` query for AQICN)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the provider's API root
    #[serde(default)]
    pub base_url: Option<String>,

    /// Regions queried on every full fetch
    #[serde(default)]
    pub regions: Vec<Region>,
}

mod defaults {
    use serde::{Deserialize, Deserializer};

    use super::{BoundingBox, ProviderConfig, Region};

    // Tricity (Gdańsk, Gdynia, Sopot)
    const CENTER_LAT: f64 = 54.4416;
    const CENTER_LON: f64 = 18.5601;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; aqhub/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }

    // Cache defaults
    pub fn ttl() -> u64 {
        5 * 60
    }
    pub fn long_ttl() -> u64 {
        30 * 60
    }

    // Batch defaults
    pub fn batch_size() -> usize {
        3
    }
    pub fn batch_delay() -> u64 {
        750
    }
    pub fn item_timeout() -> u64 {
        15
    }

    // Provider defaults
    pub fn enabled() -> bool {
        true
    }

    pub fn airly() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            api_key: None,
            base_url: None,
            regions: vec![Region::Nearest {
                latitude: CENTER_LAT,
                longitude: CENTER_LON,
                max_distance_km: 20.0,
                max_results: 20,
            }],
        }
    }

    pub fn aqicn() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            api_key: None,
            base_url: None,
            regions: vec![Region::Bounds(BoundingBox {
                south: 54.30,
                west: 18.40,
                north: 54.60,
                east: 18.80,
            })],
        }
    }

    fn table_or<'de, D>(
        deserializer: D,
        fallback: fn() -> ProviderConfig,
    ) -> Result<ProviderConfig, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut config = ProviderConfig::deserialize(deserializer)?;
        if config.regions.is_empty() {
            config.regions = fallback().regions;
        }
        Ok(config)
    }

    pub fn airly_table<'de, D: Deserializer<'de>>(d: D) -> Result<ProviderConfig, D::Error> {
        table_or(d, airly)
    }

    pub fn aqicn_table<'de, D: Deserializer<'de>>(d: D) -> Result<ProviderConfig, D::Error> {
        table_or(d, aqicn)
    }

    pub fn gios_table<'de, D: Deserializer<'de>>(d: D) -> Result<ProviderConfig, D::Error> {
        table_or(d, gios)
    }

    pub fn gios() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            api_key: None,
            base_url: None,
            regions: vec![Region::Nearest {
                latitude: CENTER_LAT,
                longitude: CENTER_LON,
                max_distance_km: 30.0,
                max_results: 20,
            }],
        }
    }
}
