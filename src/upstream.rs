//! Client for the community platform's HTTP API
//!
//! Every method is a GET to `{base}/{method}` with the access token and API
//! version appended to the query string. The API answers HTTP 200 even for
//! failed calls, so the body is checked for an `error` envelope:
//!
//! ```json
//! { "error": { "error_code": 5, "error_msg": "User authorization failed" } }
//! ```
//!
//! Requests are spaced to stay within the platform's limit of three calls per
//! second per token.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{instrument, trace};

use crate::util::{api_base_url, get_api_domain};

/// Calls allowed per second per access token
const REQUESTS_PER_SECOND: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query interface used by pollers
///
/// Implemented by [`VkApi`]; tests substitute their own implementation.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Call `method` with `params` and return the decoded JSON body
    async fn query(&self, method: &str, params: &[(&str, &str)]) -> Result<serde_json::Value>;
}

/// Error reported by the API inside a successful HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub method: String,
    pub code: i64,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api error in {} (code {}): {}",
            self.method, self.code, self.message
        )
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: i64,
    #[serde(alias = "error_message", default)]
    error_msg: String,
}

/// Spaces calls so at most `per_second` start in any second
struct RateLimiter {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(per_second: u32) -> Self {
        Self {
            spacing: Duration::from_secs(1) / per_second.max(1),
            next_slot: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.spacing);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

/// API client bound to one access token
pub struct VkApi {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    version: String,
    limiter: RateLimiter,
}

impl VkApi {
    /// Create a client for the domain from `VK_API_DOMAIN` (default `api.vk.com`)
    pub fn with_token(access_token: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_base_url(&get_api_domain()), access_token, version)
    }

    /// Create a client against an explicit base URL (`https://host/method`)
    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            version: version.into(),
            limiter: RateLimiter::new(REQUESTS_PER_SECOND),
        })
    }
}

#[async_trait]
impl UpstreamApi for VkApi {
    #[instrument(skip(self, params))]
    async fn query(&self, method: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        self.limiter.acquire().await;

        let url = format!("{}/{}", self.base_url, method);
        trace!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("v", self.version.as_str()),
            ])
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        let value: serde_json::Value =
            serde_json::from_str(&body).context("failed to parse response JSON")?;

        if value.get("error").is_some() {
            let envelope: ErrorEnvelope =
                serde_json::from_value(value).context("failed to parse error envelope")?;
            return Err(ApiError {
                method: method.to_string(),
                code: envelope.error.error_code,
                message: envelope.error.error_msg,
            }
            .into());
        }

        Ok(value)
    }
}
