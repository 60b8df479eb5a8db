// src/providers/http.rs

//! HTTP client utilities shared by the provider clients.

use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{FetchError, FetchResult, Result};
use crate::models::{HttpConfig, ProviderKind};

/// Longest error body excerpt kept in a `FetchError::Provider` message.
const MAX_ERROR_BODY: usize = 200;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Build an endpoint URL from an API root, a path and query parameters.
pub fn endpoint(
    provider: ProviderKind,
    base_url: &str,
    path: &str,
    query: &[(&str, String)],
) -> FetchResult<Url> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
    let url = if query.is_empty() {
        Url::parse(&raw)
    } else {
        Url::parse_with_params(&raw, query.iter().map(|(k, v)| (*k, v.as_str())))
    };
    url.map_err(|e| FetchError::provider(provider, 0, format!("invalid URL {raw}: {e}")))
}

/// Send a request and decode a JSON body.
///
/// HTTP 429 becomes [`FetchError::RateLimited`] (with `Retry-After` seconds
/// when the provider sends them), other non-2xx answers become
/// [`FetchError::Provider`], undecodable bodies [`FetchError::Malformed`].
pub async fn get_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> FetchResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(provider, e))?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        return Err(FetchError::RateLimited {
            provider,
            retry_after,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::from_reqwest(provider, e))?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(FetchError::provider(provider, status.as_u16(), message));
    }

    parse_json(provider, &bytes)
}

/// Decode a JSON body, mapping failures to [`FetchError::Malformed`].
pub fn parse_json<T: DeserializeOwned>(provider: ProviderKind, bytes: &[u8]) -> FetchResult<T> {
    serde_json::from_slice(bytes).map_err(|e| FetchError::malformed(provider, e))
}
