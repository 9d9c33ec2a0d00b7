//! Configuration loading and management.
//!
//! Configuration is layered with figment and loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `rum-telemetry.toml` in the working directory (optional)
//! 3. Well-known environment variables (`RUM_APPLICATION_ID`, ...)
//! 4. Section environment variables (`RUM_<SECTION>__<KEY>`)
//!
//! # Well-known Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `RUM_APPLICATION_ID` | `rum.application_id` | RUM application identifier |
//! | `RUM_CLIENT_TOKEN` | `uploader.client_token` | Collector client token |
//! | `RUM_ENDPOINT` | `uploader.endpoint` | Collector intake URL |
//! | `RUM_BATCH_DIRECTORY` | `storage.directory` | Batch file directory |
//!
//! Section variables such as `RUM_UPLOADER__TIMEOUT=2000` take precedence.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "rum-telemetry.toml";
const ENV_PREFIX: &str = "RUM_";
const ENV_SECTION_SEPARATOR: &str = "__";

/// Compression applied to upload request bodies.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Gzip compression.
    Gzip,
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RUM monitor configuration.
    pub rum: RumConfig,
    /// Session and user action timing.
    pub session: SessionConfig,
    /// Upload pacing.
    pub delay: DelayConfig,
    /// System conditions gating uploads.
    pub conditions: ConditionsConfig,
    /// Batch file storage.
    pub storage: StorageConfig,
    /// Collector uploader.
    pub uploader: UploaderConfig,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(well_known_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SECTION_SEPARATOR));

        figment.extract()
    }

    /// Creates a new config builder for testing.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// RUM monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RumConfig {
    /// Identifier of the RUM application events are reported for.
    pub application_id: String,
    /// Capacity of the monitor's command channel.
    pub command_buffer_size: usize,
}

impl Default for RumConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            command_buffer_size: 256,
        }
    }
}

/// Session lifetime and user action timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum session lifetime in milliseconds.
    #[serde(with = "duration_ms")]
    pub max_duration: Duration,
    /// Session inactivity timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub inactivity_timeout: Duration,
    /// How long an instant action stays open to collect resources, in milliseconds.
    #[serde(with = "duration_ms")]
    pub discrete_action_timeout: Duration,
    /// Maximum duration of a started user action, in milliseconds.
    #[serde(with = "duration_ms")]
    pub continuous_action_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(4 * 60 * 60),
            inactivity_timeout: Duration::from_secs(15 * 60),
            discrete_action_timeout: Duration::from_millis(100),
            continuous_action_timeout: Duration::from_secs(10),
        }
    }
}

/// Upload interval bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Interval before the first upload cycle, in milliseconds.
    #[serde(with = "duration_ms")]
    pub initial: Duration,
    /// Lower bound in milliseconds.
    #[serde(with = "duration_ms")]
    pub min: Duration,
    /// Upper bound in milliseconds.
    #[serde(with = "duration_ms")]
    pub max: Duration,
    /// Multiplier applied on increase and divisor applied on decrease.
    pub change_factor: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            min: Duration::from_secs(1),
            max: Duration::from_secs(20),
            change_factor: 1.1,
        }
    }
}

/// System conditions gating uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsConfig {
    /// Battery level (percent) at or below which uploads are blocked when not charging.
    pub min_battery_level: u8,
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            min_battery_level: 10,
        }
    }
}

/// Batch file storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding batch files.
    pub directory: PathBuf,
    /// Maximum size of a single batch file in bytes.
    pub max_file_size: u64,
    /// Maximum number of records in a single batch file.
    pub max_items_per_batch: usize,
    /// A batch file older than this (ms) no longer receives writes.
    #[serde(with = "duration_ms")]
    pub max_file_age_for_write: Duration,
    /// A batch file younger than this (ms) is not yet readable.
    #[serde(with = "duration_ms")]
    pub min_file_age_for_read: Duration,
    /// A batch file older than this (ms) is deleted without upload.
    #[serde(with = "duration_ms")]
    pub max_file_age_for_read: Duration,
    /// Total size (bytes) above which the oldest batch files are purged.
    pub max_directory_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("rum-data/batches"),
            max_file_size: 4 * 1024 * 1024,
            max_items_per_batch: 500,
            max_file_age_for_write: Duration::from_millis(4750),
            min_file_age_for_read: Duration::from_secs(5),
            max_file_age_for_read: Duration::from_secs(18 * 60 * 60),
            max_directory_size: 512 * 1024 * 1024,
        }
    }
}

/// Collector uploader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Collector intake URL.
    pub endpoint: Option<String>,
    /// Client token sent with every request.
    pub client_token: Option<String>,
    /// Value of the `ddsource` query parameter.
    pub source: String,
    /// Name of the feature the uploads are performed for, used in logs.
    pub feature_name: String,
    /// Request timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Request body compression.
    pub compression: Compression,
    /// Additional headers to send with requests.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            client_token: None,
            source: "mobile".to_string(),
            feature_name: "rum".to_string(),
            timeout: Duration::from_secs(10),
            compression: Compression::None,
            headers: HashMap::new(),
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the RUM application identifier.
    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.config.rum.application_id = application_id.into();
        self
    }

    /// Sets the maximum session duration.
    pub fn session_max_duration(mut self, duration: Duration) -> Self {
        self.config.session.max_duration = duration;
        self
    }

    /// Sets the session inactivity timeout.
    pub fn session_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.inactivity_timeout = timeout;
        self
    }

    /// Sets the upload delay bounds.
    pub fn delay(mut self, initial: Duration, min: Duration, max: Duration) -> Self {
        self.config.delay.initial = initial;
        self.config.delay.min = min;
        self.config.delay.max = max;
        self
    }

    /// Sets the upload delay change factor.
    pub fn delay_change_factor(mut self, factor: f64) -> Self {
        self.config.delay.change_factor = factor;
        self
    }

    /// Sets the battery level below which uploads are blocked.
    pub fn min_battery_level(mut self, level: u8) -> Self {
        self.config.conditions.min_battery_level = level;
        self
    }

    /// Sets the batch file directory.
    pub fn storage_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.storage.directory = directory.into();
        self
    }

    /// Sets the batch file age windows for writing and reading.
    pub fn file_ages(mut self, max_for_write: Duration, min_for_read: Duration) -> Self {
        self.config.storage.max_file_age_for_write = max_for_write;
        self.config.storage.min_file_age_for_read = min_for_read;
        self
    }

    /// Sets the collector endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.uploader.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the collector client token.
    pub fn client_token(mut self, token: impl Into<String>) -> Self {
        self.config.uploader.client_token = Some(token.into());
        self
    }

    /// Sets the request body compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.uploader.compression = compression;
        self
    }

    /// Sets the upload request timeout.
    pub fn uploader_timeout(mut self, timeout: Duration) -> Self {
        self.config.uploader.timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Serialize)]
struct PartialRumConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct PartialStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct PartialUploaderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<String>,
}

/// Partial config for well-known env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_rum_empty")]
    rum: PartialRumConfig,
    #[serde(skip_serializing_if = "is_partial_storage_empty")]
    storage: PartialStorageConfig,
    #[serde(skip_serializing_if = "is_partial_uploader_empty")]
    uploader: PartialUploaderConfig,
}

fn is_partial_rum_empty(config: &PartialRumConfig) -> bool {
    config.application_id.is_none()
}

fn is_partial_storage_empty(config: &PartialStorageConfig) -> bool {
    config.directory.is_none()
}

fn is_partial_uploader_empty(config: &PartialUploaderConfig) -> bool {
    config.endpoint.is_none() && config.client_token.is_none()
}

fn well_known_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(application_id) = std::env::var("RUM_APPLICATION_ID") {
        config.rum.application_id = Some(application_id);
    }

    if let Ok(token) = std::env::var("RUM_CLIENT_TOKEN") {
        config.uploader.client_token = Some(token);
    }

    if let Ok(endpoint) = std::env::var("RUM_ENDPOINT") {
        config.uploader.endpoint = Some(endpoint);
    }

    if let Ok(directory) = std::env::var("RUM_BATCH_DIRECTORY") {
        config.storage.directory = Some(PathBuf::from(directory));
    }

    Serialized::defaults(config)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
