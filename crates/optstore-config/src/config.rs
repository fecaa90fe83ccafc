//! Top-level settings type.

use optstore_core::CacheConfig;
use optstore_dispatch::DispatchConfig;
use optstore_telemetry::{create_env_filter, LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::schema::{CacheSettings, DispatchSettings, TelemetrySettings};
use crate::SettingsError;

/// Settings for a process embedding the option store.
///
/// # Example
///
/// ```
/// use optstore_config::OptstoreSettings;
///
/// let settings = OptstoreSettings::default();
/// assert_eq!(settings.dispatch.lock_wakeup_interval_ms, 1000);
/// assert!(!settings.cache.trace_changes);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OptstoreSettings {
    /// Dispatch queue settings.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging and metrics settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl OptstoreSettings {
    /// Settings for local development: readable debug logs and traced
    /// cache updates.
    #[must_use]
    pub fn development() -> Self {
        let mut settings = Self::default();
        settings.cache.trace_changes = true;
        settings.telemetry.logging.level = "debug".to_string();
        settings.telemetry.logging.format = LogFormat::Pretty;
        settings.telemetry.logging.thread_ids = true;
        settings.telemetry.logging.file_line_info = true;
        settings
    }

    /// Settings for production: JSON logs at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Check values that deserialize fine but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.dispatch.lock_wakeup_interval_ms == 0 {
            return Err(SettingsError::invalid_value(
                "dispatch.lock_wakeup_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.telemetry.logging.enabled {
            create_env_filter(&self.telemetry.logging.level).map_err(|e| {
                SettingsError::invalid_value("telemetry.logging.level", e.to_string())
            })?;
        }

        Ok(())
    }

    /// Configuration for a [`DispatchQueue`](optstore_dispatch::DispatchQueue).
    #[must_use]
    pub fn dispatch_config(&self) -> DispatchConfig {
        self.dispatch.to_dispatch_config()
    }

    /// Configuration for a [`ConfigCache`](optstore_core::ConfigCache).
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        self.cache.to_cache_config()
    }

    /// Logging configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        self.telemetry.logging.to_log_config()
    }

    /// Metrics configuration.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        self.telemetry.metrics.to_metrics_config()
    }

    /// Combined telemetry configuration.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        self.telemetry.to_telemetry_config()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(OptstoreSettings::default().validate().is_ok());
        assert!(OptstoreSettings::development().validate().is_ok());
        assert!(OptstoreSettings::production().validate().is_ok());
    }

    #[test]
    fn test_development_preset() {
        let settings = OptstoreSettings::development();
        assert!(settings.cache_config().trace_changes);
        assert_eq!(settings.log_config().format, LogFormat::Pretty);
        assert_eq!(settings.log_config().level, "debug");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut settings = OptstoreSettings::default();
        settings.dispatch.lock_wakeup_interval_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("dispatch.lock_wakeup_interval_ms"));
    }

    #[test]
    fn test_bad_log_filter_rejected() {
        let mut settings = OptstoreSettings::default();
        settings.telemetry.logging.level = "optstore_core=loudest".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("telemetry.logging.level"));
    }

    #[test]
    fn test_bad_log_filter_ignored_when_logging_disabled() {
        let mut settings = OptstoreSettings::default();
        settings.telemetry.logging.enabled = false;
        settings.telemetry.logging.level = "optstore_core=loudest".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_conversions() {
        let mut settings = OptstoreSettings::default();
        settings.dispatch.lock_wakeup_interval_ms = 20;
        settings.telemetry.metrics.enabled = false;

        assert_eq!(
            settings.dispatch_config().lock_wakeup_interval,
            Duration::from_millis(20)
        );
        assert!(!settings.metrics_config().enabled);
        assert!(!settings.telemetry_config().metrics.enabled);
    }
}
