//! Cross-thread dispatch queue for Optstore.
//!
//! A [`DispatchQueue`] belongs to one owner thread, the thread that calls
//! [`DispatchQueue::process`]. Any other thread can hand it work:
//!
//! - [`enqueue`](DispatchQueue::enqueue) - fire and forget
//! - [`enqueue_notify`](DispatchQueue::enqueue_notify) - fire and forget,
//!   merged with an identical pending notification
//! - [`run`](DispatchQueue::run) - block until the owner ran the closure
//!
//! Two further protocols let a non-owner thread interact with the owner's
//! private state:
//!
//! - **suspend/resume** keeps the owner inside `process` (it still runs
//!   queued items) until every request is resumed;
//! - **lock/unlock** additionally excludes dispatched closures, giving the
//!   caller exclusive access to whatever the owner protects.
//!
//! # Example
//!
//! ```
//! use optstore_dispatch::{DispatchQueue, QueueState};
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let queue = Arc::new(DispatchQueue::new());
//!
//! let owner_queue = Arc::clone(&queue);
//! let owner = thread::spawn(move || owner_queue.process(Duration::from_secs(5)));
//!
//! // Blocks until the owner ran the closure.
//! let answer = queue.run(|| 6 * 7).unwrap();
//! assert_eq!(answer, 42);
//!
//! owner.join().unwrap();
//! assert_eq!(queue.state(), QueueState::Idle);
//! ```

#![warn(missing_docs)]

mod error;
mod queue;
mod state;

pub use error::{DispatchError, DispatchResult};
pub use queue::{DispatchConfig, DispatchLock, DispatchQueue, NotifyKey};
pub use state::QueueState;
