//! # Optstore Core
//!
//! A runtime option store shared by many concurrent consumers.
//!
//! - [`GroupSchema`] / [`GroupTree`] - static, tree-shaped option schema
//! - [`ConfigShadow`] - the canonical copy of every value, behind one lock
//! - [`ConfigCache`] - a consumer's private snapshot of one subtree,
//!   refreshed on demand
//! - [`OptionValue`] - what the store needs from an option's value type
//!
//! Writers publish through the shadow; every cache covering the written
//! group is woken up, directly or through a
//! [`DispatchQueue`](optstore_dispatch::DispatchQueue), and picks up the
//! change on its next [`ConfigCache::update`].

#![doc(html_root_url = "https://docs.rs/optstore-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
mod data;
mod error;
pub mod schema;
mod shadow;
pub mod tree;
mod value;

pub use cache::{CacheConfig, Changes, ConfigCache, DispatchCallback};
pub use error::{StoreError, StoreResult};
pub use schema::{GroupSchema, GroupSchemaBuilder, OptionSpec, SchemaEntry};
pub use shadow::{ConfigShadow, ListenerId, WakeupHook};
pub use tree::{Group, GroupTree, Opt, OptionDescriptor, OptionId};
pub use value::{OptionKind, OptionValue};
