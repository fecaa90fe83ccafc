//! Settings sections.
//!
//! Each section maps onto the runtime configuration type of one crate:
//! [`DispatchSettings`] onto `DispatchConfig`, [`CacheSettings`] onto
//! `CacheConfig` and [`TelemetrySettings`] onto `TelemetryConfig`.

use std::time::Duration;

use optstore_core::CacheConfig;
use optstore_dispatch::DispatchConfig;
use optstore_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

/// Dispatch queue section.
///
/// # Example
///
/// ```
/// use optstore_config::DispatchSettings;
///
/// let settings = DispatchSettings {
///     lock_wakeup_interval_ms: 250,
/// };
/// assert_eq!(settings.to_dispatch_config().lock_wakeup_interval.as_millis(), 250);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DispatchSettings {
    /// How often a thread waiting to suspend the owner re-sends the wakeup,
    /// in milliseconds.
    #[serde(default = "default_lock_wakeup_interval")]
    pub lock_wakeup_interval_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            lock_wakeup_interval_ms: default_lock_wakeup_interval(),
        }
    }
}

impl DispatchSettings {
    /// Convert into a queue configuration.
    #[must_use]
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new()
            .with_lock_wakeup_interval(Duration::from_millis(self.lock_wakeup_interval_ms))
    }
}

fn default_lock_wakeup_interval() -> u64 {
    1000
}

/// Cache section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Log each value a cache copies during `update`.
    #[serde(default)]
    pub trace_changes: bool,
}

impl CacheSettings {
    /// Convert into a cache configuration.
    #[must_use]
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new().with_trace_changes(self.trace_changes)
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Enable the log subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info", "optstore_core=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include thread IDs in each line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_line_info: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            thread_ids: false,
            file_line_info: false,
        }
    }
}

impl LoggingSettings {
    /// Convert into a logging configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            thread_ids: self.thread_ids,
            file_line_info: self.file_line_info,
            ..LogConfig::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl MetricsSettings {
    /// Convert into a metrics configuration.
    #[must_use]
    pub fn to_metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.enabled,
        }
    }
}

/// Telemetry section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl TelemetrySettings {
    /// Convert into a telemetry configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: self.logging.to_log_config(),
            metrics: self.metrics.to_metrics_config(),
        }
    }
}

fn default_true() -> bool {
    true
}
