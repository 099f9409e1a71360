//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ConfigError, LogFormat};

/// Background identifier settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Whether the background identifier runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requeue delay after a clean run.
    #[serde(default = "default_wait_clean")]
    pub wait_clean_secs: u64,

    /// Requeue delay after a soft proof failure.
    #[serde(default = "default_wait_soft")]
    pub wait_soft_failure_secs: u64,

    /// Requeue delay after a hard failure.
    #[serde(default = "default_wait_hard")]
    pub wait_hard_failure_secs: u64,

    /// Pause between two consecutive scheduled runs.
    #[serde(default = "default_delay_slot")]
    pub delay_slot_secs: u64,
}

/// Configuration for the verification engine.
///
/// Can be loaded from a TOML file via [`EngineConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fast-tier TTL, measured from when the record was cached.
    #[serde(default = "default_fast_ttl")]
    pub fast_cache_ttl_secs: u64,

    /// Slow-tier TTL, measured from the last full identify.
    #[serde(default = "default_slow_ttl")]
    pub slow_cache_ttl_secs: u64,

    /// Slow-tier TTL for records cached with tolerated proof breaks.
    #[serde(default = "default_broken_ttl")]
    pub broken_cache_ttl_secs: u64,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to build a Prometheus registry.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_fast_ttl() -> u64 {
    60
}

fn default_slow_ttl() -> u64 {
    6 * 3600
}

fn default_broken_ttl() -> u64 {
    3600
}

fn default_wait_clean() -> u64 {
    4 * 3600
}

fn default_wait_soft() -> u64 {
    90 * 60
}

fn default_wait_hard() -> u64 {
    10 * 60
}

fn default_delay_slot() -> u64 {
    30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            wait_clean_secs: default_wait_clean(),
            wait_soft_failure_secs: default_wait_soft(),
            wait_hard_failure_secs: default_wait_hard(),
            delay_slot_secs: default_delay_slot(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("EngineConfig is always serializable to TOML")
    }

    /// Reject settings the scheduler cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.watch;
        if !(w.wait_clean_secs >= w.wait_soft_failure_secs
            && w.wait_soft_failure_secs >= w.wait_hard_failure_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "watch waits must satisfy clean >= soft >= hard (got {}/{}/{})",
                w.wait_clean_secs, w.wait_soft_failure_secs, w.wait_hard_failure_secs
            )));
        }
        if self.fast_cache_ttl_secs > self.slow_cache_ttl_secs {
            return Err(ConfigError::Invalid(
                "fast cache TTL must not exceed slow cache TTL".into(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_cache_ttl_secs: default_fast_ttl(),
            slow_cache_ttl_secs: default_slow_ttl(),
            broken_cache_ttl_secs: default_broken_ttl(),
            watch: WatchConfig::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}
