//! Runtime settings for processes embedding the option store.
//!
//! These settings configure the machinery, not the options themselves:
//! the dispatch queue's suspend wakeup interval, cache change tracing,
//! and logging and metrics.
//!
//! # Settings File Format
//!
//! ```toml
//! [dispatch]
//! lock_wakeup_interval_ms = 1000
//!
//! [cache]
//! trace_changes = false
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! thread_ids = false
//!
//! [telemetry.metrics]
//! enabled = true
//! ```
//!
//! Unknown sections and fields are rejected. Every value can be overridden
//! from the environment as `PREFIX__SECTION__KEY`, e.g.
//! `OPTSTORE__TELEMETRY__LOGGING__LEVEL=debug`.

#![doc(html_root_url = "https://docs.rs/optstore-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::OptstoreSettings;
pub use error::SettingsError;
pub use loader::SettingsLoader;
pub use schema::{
    CacheSettings, DispatchSettings, LoggingSettings, MetricsSettings, TelemetrySettings,
};
