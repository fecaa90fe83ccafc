//! Prometheus metrics for Optstore.
//!
//! # Store Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `optstore_shadow_writes_total` | Counter | Writes that changed a value |
//! | `optstore_shadow_redundant_writes_total` | Counter | Writes of an equal value |
//! | `optstore_listener_wakeups_total` | Counter | Cache wakeups delivered |
//! | `optstore_dispatch_items_total` | Counter | Items queued on dispatch queues |
//!
//! Metrics are rendered on demand with [`render_metrics`]; no HTTP listener
//! is started.

use std::sync::OnceLock;

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metric names emitted by the store.
pub mod names {
    /// Writes that changed a value.
    pub const SHADOW_WRITES: &str = "optstore_shadow_writes_total";
    /// Writes of a value equal to the stored one.
    pub const SHADOW_REDUNDANT_WRITES: &str = "optstore_shadow_redundant_writes_total";
    /// Wakeup hooks invoked.
    pub const LISTENER_WAKEUPS: &str = "optstore_listener_wakeups_total";
    /// Items queued on dispatch queues.
    pub const DISPATCH_ITEMS: &str = "optstore_dispatch_items_total";
}

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Installs the global Prometheus recorder.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a global recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    tracing::debug!("prometheus recorder installed");

    Ok(())
}

/// Returns the global metrics handle if initialized.
pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers descriptions for the store's metrics with the current recorder.
pub fn describe_metrics() {
    describe_counter!(
        names::SHADOW_WRITES,
        "Option writes that changed the stored value"
    );
    describe_counter!(
        names::SHADOW_REDUNDANT_WRITES,
        "Option writes skipped because the value was unchanged"
    );
    describe_counter!(
        names::LISTENER_WAKEUPS,
        "Config cache wakeup hooks invoked by writers"
    );
    describe_counter!(
        names::DISPATCH_ITEMS,
        "Items queued on dispatch queues"
    );
}
