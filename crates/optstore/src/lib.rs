//! # Optstore
//!
//! **A runtime option store for multi-threaded programs**
//!
//! - **One shadow, many caches** – writers publish into a single
//!   [`ConfigShadow`](core::ConfigShadow); every consumer reads its own
//!   [`ConfigCache`](core::ConfigCache) without locking
//! - **Explicit refresh** – a cache changes only when its owner calls
//!   `update`, which reports each changed option once
//! - **Wakeups** – writers notify interested caches directly or by queueing
//!   a callback on the consumer's [`DispatchQueue`](dispatch::DispatchQueue)
//! - **Owner-thread protocol** – other threads can suspend or lock a queue's
//!   owner to touch its state safely
//!
//! ## Quick Start
//!
//! ```
//! use optstore::prelude::*;
//! use std::sync::Arc;
//!
//! let video = GroupSchema::builder("video").option("gamma", 1.0_f64).build();
//! let root = GroupSchema::builder("player")
//!     .option("volume", 100_i64)
//!     .sub_group("video", Arc::clone(&video))
//!     .build();
//!
//! let tree = GroupTree::build(Arc::clone(&root));
//! let gamma = tree.opt::<f64>(&video, "gamma").unwrap();
//! let shadow = ConfigShadow::new(tree).unwrap();
//!
//! let mut cache = ConfigCache::for_schema(&shadow, &video).unwrap();
//! shadow.set(gamma, 2.2);
//!
//! assert!(cache.update());
//! assert_eq!(*cache.get(gamma), 2.2);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! writer ── write ──▶ ConfigShadow ── wakeup ──▶ hook / DispatchQueue
//!                          │                           │
//!                          └──── update ◀── ConfigCache ◀┘ (owner thread)
//! ```

#![doc(html_root_url = "https://docs.rs/optstore/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error;
use tracing::info;

// Re-export core types
pub use optstore_core as core;

// Re-export dispatch types
pub use optstore_dispatch as dispatch;

// Re-export settings types
pub use optstore_config as config;

// Re-export telemetry types
pub use optstore_telemetry as telemetry;

/// Errors from [`init`].
#[derive(Error, Debug)]
pub enum InitError {
    /// The settings are invalid.
    #[error(transparent)]
    Settings(#[from] optstore_config::SettingsError),

    /// Logging or metrics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] optstore_telemetry::TelemetryError),
}

/// Validate `settings` and install logging and metrics.
///
/// Call once per process. Queues and caches take their configuration from
/// [`OptstoreSettings::dispatch_config`](config::OptstoreSettings::dispatch_config)
/// and [`OptstoreSettings::cache_config`](config::OptstoreSettings::cache_config).
///
/// # Errors
///
/// Returns [`InitError`] if validation fails or a global logger or
/// recorder is already installed.
pub fn init(settings: &optstore_config::OptstoreSettings) -> Result<(), InitError> {
    settings.validate()?;
    optstore_telemetry::init_telemetry(&settings.telemetry_config())?;
    info!(
        lock_wakeup_interval_ms = settings.dispatch.lock_wakeup_interval_ms,
        trace_changes = settings.cache.trace_changes,
        "optstore initialized"
    );
    Ok(())
}

/// Prelude module for convenient imports.
///
/// ```
/// use optstore::prelude::*;
/// ```
pub mod prelude {
    pub use optstore_core::{
        CacheConfig, ConfigCache, ConfigShadow, DispatchCallback, GroupSchema, GroupTree, Opt,
        OptionId, OptionValue, StoreError, StoreResult, WakeupHook,
    };

    pub use optstore_dispatch::{
        DispatchConfig, DispatchError, DispatchQueue, DispatchResult, NotifyKey, QueueState,
    };

    pub use optstore_config::{OptstoreSettings, SettingsLoader};
}
