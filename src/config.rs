use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::storage::Precision;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Address the Callback API endpoint listens on
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    pub vk: VkConfig,

    /// InfluxDB configuration (optional - omitting it selects the in-memory backend)
    pub influxdb: Option<InfluxConfig>,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Log level for this crate (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct VkConfig {
    /// String returned for `confirmation` callbacks
    pub confirmation: String,

    /// Shared secret expected in every callback (empty disables the check)
    #[serde(default)]
    pub secret: String,

    /// Community access token for API requests
    pub token: String,

    pub group_id: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    #[serde(default)]
    pub org: String,
    pub bucket: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub precision: Precision,
}

/// Point buffer tuning
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Flush as soon as this many points are pending
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            max_batch_size: default_max_batch_size(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

/// Round granularities of the scheduled tasks
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_messages_secs")]
    pub messages_secs: u64,

    #[serde(default = "default_unread_secs")]
    pub unread_secs: u64,
}

impl ScheduleConfig {
    pub fn messages(&self) -> Duration {
        Duration::from_secs(self.messages_secs)
    }

    pub fn unread(&self) -> Duration {
        Duration::from_secs(self.unread_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            messages_secs: default_messages_secs(),
            unread_secs: default_unread_secs(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_api_version() -> String {
    "5.103".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_flush_interval_secs() -> u64 {
    2
}

fn default_max_batch_size() -> usize {
    5000
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_messages_secs() -> u64 {
    60 * 60
}

fn default_unread_secs() -> u64 {
    5 * 60
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("unable to read config {path}"))?;
    serde_json::from_str::<Config>(&file_content)
        .context("invalid configuration file provided")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
