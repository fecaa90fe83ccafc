//! Owner-thread state machine of a dispatch queue.
//!
//! ```text
//!            process()                 suspend()
//!   Idle ───────────────▶ Draining ───────────────▶ Suspended ◀──┐
//!    ▲                       │  ▲                      │    ▲    │ unlock()
//!    └───────────────────────┘  └──────────────────────┘    │    │
//!     queue empty, no requests,   last resume()             │    │
//!     timeout elapsed                              lock()   ▼    │
//!                                                      Exclusive ─┘
//! ```
//!
//! `Idle -> Suspended` happens directly when the owner enters `process`
//! while suspend requests are already outstanding.

use std::fmt;

/// Where the owner thread of a queue currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// The owner is not inside `process`.
    Idle,
    /// The owner is inside `process`, running items or waiting for them.
    Draining,
    /// The owner is inside `process` and at least one suspend request is
    /// outstanding, so it will not return. The owner may be running a
    /// dispatched item; items enqueued meanwhile still run, and the state
    /// stays `Suspended` throughout.
    Suspended,
    /// Suspended, and a non-owner thread holds exclusive access to the
    /// owner's state. The owner runs no items in this state.
    Exclusive,
}

impl QueueState {
    /// Check if the owner thread is inside `process`.
    pub fn is_owner_inside(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Check if `process` is pinned by a suspend request.
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended | Self::Exclusive)
    }

    /// Check whether `self -> next` is legal given the bookkeeping the
    /// queue holds at the moment of the transition.
    pub(crate) fn can_transition(
        self,
        next: QueueState,
        suspend_requests: usize,
        running_item: bool,
    ) -> bool {
        use QueueState::{Draining, Exclusive, Idle, Suspended};

        match (self, next) {
            (Idle, Draining) | (Suspended, Draining) => suspend_requests == 0,
            (Idle, Suspended) | (Draining, Suspended) | (Exclusive, Suspended) => {
                suspend_requests > 0
            }
            (Suspended, Exclusive) => suspend_requests > 0 && !running_item,
            (Draining, Idle) => suspend_requests == 0 && !running_item,
            _ => false,
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Draining => write!(f, "draining"),
            Self::Suspended => write!(f, "suspended"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}
