//! Configuration loading for sync-client.
//!
//! Configuration is loaded from a TOML file or built in code. Every field
//! has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_core::{RetryPolicy, RetryPreset};

/// Root configuration for the offline client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Prefix for every persisted key (default: `@offline_sync`).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Sync engine configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    /// Default entry TTL in seconds (default: 300).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Maximum number of live entries (default: 100).
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Expired-entry sweep interval in seconds, 0 disables it (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Periodic drain interval in seconds (default: 30).
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Retry parameter preset (default: standard).
    #[serde(default)]
    pub retry_preset: RetryPreset,
    /// Remote-service error codes treated as transient.
    #[serde(default)]
    pub transient_codes: Vec<String>,
    /// Maximum queued actions (default: 1000).
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

// Default value functions
fn default_namespace() -> String {
    "@offline_sync".to_string()
}

fn default_ttl_secs() -> u64 {
    5 * 60 // 5 minutes
}

fn default_max_size() -> usize {
    100
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sync_interval() -> u64 {
    30
}

fn default_max_pending() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_size: default_max_size(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            retry_preset: RetryPreset::default(),
            transient_codes: Vec::new(),
            max_pending: default_max_pending(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<string>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".into(),
            });
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Set the persisted-key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the default cache TTL (whole seconds).
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.default_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the cache capacity.
    pub fn with_cache_max_size(mut self, max_size: usize) -> Self {
        self.cache.max_size = max_size;
        self
    }

    /// Set the cache sweep interval; zero disables sweeping.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Set the periodic drain interval (whole seconds).
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync.interval_secs = interval.as_secs();
        self
    }

    /// Set the retry preset.
    pub fn with_retry_preset(mut self, preset: RetryPreset) -> Self {
        self.sync.retry_preset = preset;
        self
    }

    /// Add remote-service error codes treated as transient.
    pub fn with_transient_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync
            .transient_codes
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Set the queue capacity.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.sync.max_pending = max_pending;
        self
    }

    /// Default cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    /// Cache sweep interval, `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.cache.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Periodic drain interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// Retry policy built from the preset and transient codes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_preset(self.sync.retry_preset)
            .with_transient_codes(self.sync.transient_codes.iter().cloned())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
