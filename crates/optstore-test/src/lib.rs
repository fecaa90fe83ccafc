//! # Optstore Test
//!
//! Test utilities for Optstore:
//!
//! - [`PlayerFixture`] - a ready-made option tree with typed handles
//! - [`WakeupCounter`] - a wakeup hook that counts its calls
//! - [`OwnerThread`] - a thread processing a dispatch queue in the background
//! - [`assert_changes`] - drain a cache and compare the reported options
//!
//! ## Example
//!
//! ```
//! use optstore_test::{assert_changes, PlayerFixture};
//!
//! let f = PlayerFixture::new();
//! let mut cache = f.cache_for(&f.video).unwrap();
//!
//! f.shadow.set(f.gamma, 2.2);
//! f.shadow.set(f.volume, 30);
//!
//! assert_changes(&mut cache, &["video-gamma"]);
//! ```

#![doc(html_root_url = "https://docs.rs/optstore-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod fixture;
mod owner;
mod probe;

pub use error::TestError;
pub use fixture::{PlayerFixture, GAMMA_CHANGED, SCALE_CHANGED, VIDEO_CHANGED};
pub use owner::OwnerThread;
pub use probe::{assert_changes, changed_names, WakeupCounter};
