// src/error.rs

//! Unified error handling for the aggregation layer.
//!
//! Two levels exist:
//! - [`FetchError`]: what a single provider call can fail with. These are
//!   absorbed by the orchestrator and facade and never reach UI callers.
//! - [`AppError`]: application-level failures (config, I/O) surfaced by the
//!   CLI and configuration loaders.

use std::fmt;

use thiserror::Error;

use crate::models::ProviderKind;

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for provider calls.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Failure of a single provider request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Request could not complete (offline, DNS, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered HTTP 429 (or its in-band quota equivalent)
    #[error("{provider} rate limit exceeded")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<u64>,
    },

    /// Any other non-2xx answer or in-band error status
    #[error("{provider} error (status {status}): {message}")]
    Provider {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// Body could not be parsed or lacks required fields
    #[error("malformed {provider} response: {message}")]
    Malformed {
        provider: ProviderKind,
        message: String,
    },
}

impl FetchError {
    /// Create a network error.
    pub fn network(message: impl fmt::Display) -> Self {
        Self::Network(message.to_string())
    }

    /// Create a provider status error.
    pub fn provider(provider: ProviderKind, status: u16, message: impl fmt::Display) -> Self {
        Self::Provider {
            provider,
            status,
            message: message.to_string(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(provider: ProviderKind, message: impl fmt::Display) -> Self {
        Self::Malformed {
            provider,
            message: message.to_string(),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(provider: ProviderKind, err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            return Self::malformed(provider, err);
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return Self::RateLimited {
                    provider,
                    retry_after: None,
                };
            }
            return Self::provider(provider, status.as_u16(), err);
        }
        Self::network(err)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Provider request failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
