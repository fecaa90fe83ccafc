//! Error types for dispatch queue operations.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while handing work to a dispatch queue.
///
/// Misuse of the queue (unbalanced `resume`, unlocking from the wrong
/// thread, dropping a queue with pending work) is not reported here; it
/// panics at the call site.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The queue could not grow to hold another item.
    #[error("dispatch queue allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

impl DispatchError {
    /// Check if this is an allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}
