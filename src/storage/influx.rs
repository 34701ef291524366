//! InfluxDB v2 storage backend
//!
//! Writes batches through the HTTP write API as line protocol:
//!
//! ```text
//! POST {url}/api/v2/write?org={org}&bucket={bucket}&precision={precision}
//! Authorization: Token {token}
//! ```
//!
//! The client carries its own request timeout; the point buffer applies a
//! second, outer timeout around every write.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::point::{MetricPoint, encode_batch};
use crate::config::InfluxConfig;

/// HTTP request timeout for a single write
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// InfluxDB v2 backend
#[derive(Debug)]
pub struct InfluxBackend {
    client: reqwest::Client,
    write_url: String,
    health_url: String,
    config: InfluxConfig,
}

impl InfluxBackend {
    /// Create a new backend from configuration
    ///
    /// No request is made here; use `health_check` to verify connectivity.
    pub fn new(config: InfluxConfig) -> StorageResult<Self> {
        if config.url.is_empty() {
            return Err(StorageError::InvalidConfig("influxdb url is empty".to_string()));
        }
        if config.bucket.is_empty() {
            return Err(StorageError::InvalidConfig(
                "influxdb bucket is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base = config.url.trim_end_matches('/');
        let write_url = format!("{base}/api/v2/write");
        let health_url = format!("{base}/health");

        debug!("influxdb backend writing to {write_url} (bucket {})", config.bucket);

        Ok(Self {
            client,
            write_url,
            health_url,
            config,
        })
    }
}

#[async_trait]
impl StorageBackend for InfluxBackend {
    #[instrument(skip(self, points), fields(points = points.len()))]
    async fn write_batch(&self, points: Vec<MetricPoint>) -> StorageResult<()> {
        let body = encode_batch(&points, self.config.precision);

        trace!("writing {} bytes of line protocol", body.len());

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", self.config.precision.as_str()),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);

        if !self.config.token.is_empty() {
            request = request.header("Authorization", format!("Token {}", self.config.token));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::WriteRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let response = self.client.get(&self.health_url).send().await?;
        let status = response.status();

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("no message")
            .to_string();

        let mut metadata = HashMap::new();
        if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
            metadata.insert("version".to_string(), version.to_string());
        }

        if !status.is_success() {
            return Err(StorageError::UnhealthyBackend(format!("{status}: {message}")));
        }

        Ok(HealthStatus {
            healthy: true,
            message,
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "influxdb"
    }
}
