// crates/ruleplane-config/src/config.rs
// ============================================================================
// Module: Ruleplane Configuration
// Description: Configuration loading and validation for ruleplane.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: ruleplane-core, ruleplane-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is valid. Values outside
//! their documented ranges fail closed instead of being clamped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use ruleplane_core::PluginSettings;
use ruleplane_core::RetryPolicy;
use ruleplane_core::RuleCacheConfig;
use ruleplane_core::TombstonePolicy;
use ruleplane_core::runtime::cache::DEFAULT_OVERLAP_SECS;
use ruleplane_core::runtime::plugins::ALLOW_ALL;
use ruleplane_core::runtime::plugins::NOOP_STATS;
use ruleplane_core::runtime::retry::DEFAULT_MAX_ATTEMPTS;
use ruleplane_store_sqlite::MAX_POOL_SIZE;
use ruleplane_store_sqlite::SqliteStoreConfig;
use ruleplane_store_sqlite::SqliteStoreMode;
use ruleplane_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "ruleplane.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "RULEPLANE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` database filename.
const DEFAULT_STORE_PATH: &str = "ruleplane.sqlite";
/// Default busy timeout for store connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout for store connections.
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default connection pool size.
const DEFAULT_POOL_SIZE: usize = 4;
/// Maximum retry attempts per unit of work.
const MAX_RETRY_ATTEMPTS: u32 = 100;
/// Default pause between retry attempts.
const DEFAULT_RETRY_DELAY_MS: u64 = 10;
/// Maximum pause between retry attempts.
const MAX_RETRY_DELAY_MS: u64 = 10_000;
/// Maximum watermark overlap.
const MAX_OVERLAP_SECS: u32 = 3_600;
/// Default sync poll interval.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Minimum sync poll interval.
const MIN_POLL_INTERVAL_MS: u64 = 100;
/// Maximum sync poll interval.
const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;
/// Default tombstone retention (one day).
const DEFAULT_TOMBSTONE_RETENTION_SECS: u64 = 86_400;
/// Default tombstone sweep batch size.
const DEFAULT_SWEEP_BATCH_SIZE: usize = 500;
/// Maximum tombstone sweep batch size.
const MAX_SWEEP_BATCH_SIZE: usize = 100_000;
/// Maximum plugin name length.
const MAX_PLUGIN_NAME_LENGTH: usize = 64;
/// Maximum log filter directive length.
const MAX_LOG_FILTER_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Ruleplane configuration loaded from `ruleplane.toml`.
///
/// # Invariants
/// - [`RuleplaneConfig::validate`] has passed for configs returned by
///   [`RuleplaneConfig::load`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RuleplaneConfig {
    /// Rule store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Retry policy for store transactions.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Incremental sync and tombstone retention.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Plugin selection.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuleplaneConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order is the explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// `./ruleplane.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.retry.validate()?;
        self.sync.validate()?;
        self.plugins.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `[store]` section: the `SQLite` rule store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Database file path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl StoreConfig {
    /// Builds the store configuration consumed by the `SQLite` backend.
    #[must_use]
    pub fn to_sqlite_config(&self) -> SqliteStoreConfig {
        let mut config = SqliteStoreConfig::new(&self.path);
        config.busy_timeout_ms = self.busy_timeout_ms;
        config.journal_mode = self.journal_mode;
        config.sync_mode = self.sync_mode;
        config.pool_size = self.pool_size;
        config
    }

    /// Validates store limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "store.pool_size must be between 1 and {MAX_POOL_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Returns the default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default pool size.
const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

// ============================================================================
// SECTION: Retry
// ============================================================================

/// `[retry]` section: contention retry for store transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Returns the runtime retry policy.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "retry.retry_delay_ms must be at most {MAX_RETRY_DELAY_MS}"
            )));
        }
        Ok(())
    }
}

/// Returns the default attempt count.
const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Returns the default retry delay.
const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

// ============================================================================
// SECTION: Sync
// ============================================================================

/// `[sync]` section: incremental pull loop and tombstone retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Seconds of overlap when advancing the watermark.
    #[serde(default = "default_overlap_secs")]
    pub overlap_secs: u32,
    /// Whether the first pull includes tombstones.
    #[serde(default)]
    pub first_pull_tombstones: TombstonePolicy,
    /// Pause between pulls in `sync watch`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Minimum tombstone age before a sweep may remove it.
    #[serde(default = "default_tombstone_retention_secs")]
    pub tombstone_retention_secs: u64,
    /// Maximum tombstones removed per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            overlap_secs: DEFAULT_OVERLAP_SECS,
            first_pull_tombstones: TombstonePolicy::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            tombstone_retention_secs: DEFAULT_TOMBSTONE_RETENTION_SECS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// Returns the rule cache configuration.
    #[must_use]
    pub const fn to_cache_config(&self) -> RuleCacheConfig {
        RuleCacheConfig {
            overlap_secs: self.overlap_secs,
            first_pull_tombstones: self.first_pull_tombstones,
        }
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the retention window in whole seconds, saturating at `i64::MAX`.
    #[must_use]
    pub fn retention_seconds(&self) -> i64 {
        i64::try_from(self.tombstone_retention_secs).unwrap_or(i64::MAX)
    }

    /// Validates sync bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.overlap_secs > MAX_OVERLAP_SECS {
            return Err(ConfigError::Invalid(format!(
                "sync.overlap_secs must be at most {MAX_OVERLAP_SECS}"
            )));
        }
        if !(MIN_POLL_INTERVAL_MS ..= MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "sync.poll_interval_ms must be between {MIN_POLL_INTERVAL_MS} and \
                 {MAX_POLL_INTERVAL_MS}"
            )));
        }
        if self.tombstone_retention_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.tombstone_retention_secs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_batch_size == 0 || self.sweep_batch_size > MAX_SWEEP_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "sync.sweep_batch_size must be between 1 and {MAX_SWEEP_BATCH_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Returns the default watermark overlap.
const fn default_overlap_secs() -> u32 {
    DEFAULT_OVERLAP_SECS
}

/// Returns the default poll interval.
const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Returns the default tombstone retention.
const fn default_tombstone_retention_secs() -> u64 {
    DEFAULT_TOMBSTONE_RETENTION_SECS
}

/// Returns the default sweep batch size.
const fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

// ============================================================================
// SECTION: Plugins
// ============================================================================

/// `[plugins]` section: which rate limiter and call-stats sink to build.
///
/// Names are resolved against the plugin registry at startup, not here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginsConfig {
    /// Rate limiter selection.
    #[serde(default = "default_rate_limit_plugin")]
    pub rate_limit: PluginSettings,
    /// Call statistics sink selection.
    #[serde(default = "default_call_stats_plugin")]
    pub call_stats: PluginSettings,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit_plugin(),
            call_stats: default_call_stats_plugin(),
        }
    }
}

impl PluginsConfig {
    /// Validates plugin names.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_plugin_name("plugins.rate_limit.name", &self.rate_limit.name)?;
        validate_plugin_name("plugins.call_stats.name", &self.call_stats.name)
    }
}

/// Returns the default rate limiter selection.
fn default_rate_limit_plugin() -> PluginSettings {
    PluginSettings::named(ALLOW_ALL)
}

/// Returns the default call-stats selection.
fn default_call_stats_plugin() -> PluginSettings {
    PluginSettings::named(NOOP_STATS)
}

/// Validates a plugin name.
fn validate_plugin_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if name.len() > MAX_PLUGIN_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info` or `ruleplane_store_sqlite=debug`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates the filter string; directive syntax is checked by the CLI.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        if self.filter.len() > MAX_LOG_FILTER_LENGTH {
            return Err(ConfigError::Invalid("logging.filter exceeds max length".to_string()));
        }
        Ok(())
    }
}

/// Returns the default log filter.
fn default_log_filter() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
