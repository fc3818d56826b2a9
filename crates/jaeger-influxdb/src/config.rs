//! Configuration for the InfluxDB span store.

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use url::Url;

use crate::schema;
use crate::StoreError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default InfluxDB address.
pub const DEFAULT_HOST: &str = "http://localhost:8086";

/// Default search window when a query gives no start time (7 days).
pub const DEFAULT_LOOKBACK_SECS: u64 = 7 * 24 * 60 * 60;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum lines per write batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5_000;

/// Default time from the first line of a batch to its flush.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;

/// Default number of lines that may wait for the flush task before
/// writers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5_000;

/// Default time before a service/operation marker is written again (1 hour).
pub const DEFAULT_META_CACHE_MAX_AGE_SECS: u64 = 60 * 60;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "jaeger-influxdb.toml";

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "INFLUXDB_";

/// Span store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// InfluxDB base URL.
    pub host: String,
    /// Search window in seconds when no start time is given.
    pub default_lookback_secs: u64,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// InfluxDB 1.x settings.
    pub v1: V1Config,
    /// InfluxDB 2.x settings.
    pub v2: V2Config,
    /// Write path settings.
    pub writer: WriterConfig,
    /// Measurement names.
    pub measurements: Measurements,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            default_lookback_secs: DEFAULT_LOOKBACK_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            v1: V1Config::default(),
            v2: V2Config::default(),
            writer: WriterConfig::default(),
            measurements: Measurements::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `jaeger-influxdb.toml` in current directory
    /// 3. Environment variables prefixed with `INFLUXDB_`, e.g.
    ///    `INFLUXDB_V2__BUCKET`
    pub fn load() -> Result<Self, StoreError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &str) -> Result<Self, StoreError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| StoreError::config(e.to_string()))
    }

    /// Which InfluxDB generation the settings describe.
    ///
    /// 1.x is chosen when a database and retention policy are set, otherwise
    /// 2.x when an organization, bucket and token are set.
    pub fn backend(&self) -> Result<Backend, StoreError> {
        if self.v1.is_complete() {
            Ok(Backend::V1)
        } else if self.v2.is_complete() {
            Ok(Backend::V2)
        } else {
            Err(StoreError::config(
                "set v1.database and v1.retention_policy for InfluxDB 1.x, \
                 or v2.organization, v2.bucket and v2.token for InfluxDB 2.x",
            ))
        }
    }

    /// Parsed base URL.
    pub fn host_url(&self) -> Result<Url, StoreError> {
        Url::parse(&self.host).map_err(|e| StoreError::config(format!("invalid host: {e}")))
    }

    pub fn default_lookback(&self) -> chrono::Duration {
        seconds(self.default_lookback_secs)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Storage generation selected by [`StoreConfig::backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// InfluxDB 1.x, queried with InfluxQL.
    V1,
    /// InfluxDB 2.x, queried with Flux.
    V2,
}

/// InfluxDB 1.x connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct V1Config {
    pub database: String,
    pub retention_policy: String,
    pub username: String,
    pub password: String,
    /// Accept invalid TLS certificates.
    pub unsafe_ssl: bool,
}

impl V1Config {
    fn is_complete(&self) -> bool {
        !self.database.is_empty() && !self.retention_policy.is_empty()
    }
}

/// InfluxDB 2.x connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct V2Config {
    pub token: String,
    pub organization: String,
    pub bucket: String,
}

impl V2Config {
    fn is_complete(&self) -> bool {
        !self.organization.is_empty() && !self.bucket.is_empty() && !self.token.is_empty()
    }
}

/// Write path configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Lines per batch before an immediate flush.
    pub max_batch_size: usize,
    /// Milliseconds from the first line of a batch to its flush.
    pub flush_interval_ms: u64,
    /// Lines buffered ahead of the flush task.
    pub queue_capacity: usize,
    /// Seconds before a service/operation marker is written again.
    pub meta_cache_max_age_secs: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            meta_cache_max_age_secs: DEFAULT_META_CACHE_MAX_AGE_SECS,
        }
    }
}

impl WriterConfig {
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn meta_cache_max_age(&self) -> chrono::Duration {
        seconds(self.meta_cache_max_age_secs)
    }
}

/// Measurement names for span, log and discovery rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Measurements {
    pub span: String,
    pub log: String,
    pub span_meta: String,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            span: schema::DEFAULT_SPAN_MEASUREMENT.to_owned(),
            log: schema::DEFAULT_LOG_MEASUREMENT.to_owned(),
            span_meta: schema::DEFAULT_SPAN_META_MEASUREMENT.to_owned(),
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
