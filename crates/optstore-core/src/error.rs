//! Error types for the option store.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the shadow store and config caches.
///
/// Only resource exhaustion is reported as an error. Misuse (unknown
/// groups, kind mismatches, access outside a cache's subtree) panics.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Allocating option storage failed.
    #[error("option storage allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

impl StoreError {
    /// Check if this is an allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}
