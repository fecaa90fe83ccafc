//! A background thread owning a dispatch queue.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use optstore_dispatch::DispatchQueue;

use crate::TestError;

/// Upper bound for one `process` call, so a missed interrupt cannot hang a
/// test.
const PROCESS_SLICE: Duration = Duration::from_millis(10);

/// Runs `process` on a queue from a dedicated thread until stopped.
///
/// ```
/// use optstore_dispatch::DispatchQueue;
/// use optstore_test::OwnerThread;
/// use std::sync::Arc;
///
/// let queue = Arc::new(DispatchQueue::new());
/// let owner = OwnerThread::spawn(&queue);
///
/// assert_eq!(queue.run(|| 2 + 2).unwrap(), 4);
/// owner.stop().unwrap();
/// ```
#[derive(Debug)]
pub struct OwnerThread {
    queue: Arc<DispatchQueue>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OwnerThread {
    /// Spawn the owner thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create the thread.
    #[must_use]
    pub fn spawn(queue: &Arc<DispatchQueue>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let queue = Arc::clone(queue);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("optstore-owner".to_string())
                .spawn(move || loop {
                    queue.process(PROCESS_SLICE);
                    if stop.load(Ordering::SeqCst) && queue.pending() == 0 {
                        break;
                    }
                })
                .expect("spawn owner thread")
        };
        Self {
            queue: Arc::clone(queue),
            stop,
            handle: Some(handle),
        }
    }

    /// The queue this thread owns.
    #[must_use]
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Stop the loop and join the thread. Items already queued run
    /// before the thread exits.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::OwnerPanicked`] if a dispatched item panicked on
    /// the owner thread.
    pub fn stop(mut self) -> Result<(), TestError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), TestError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::SeqCst);
        self.queue.interrupt();
        handle
            .join()
            .map_err(|payload| TestError::OwnerPanicked(panic_message(&*payload)))
    }
}

impl Drop for OwnerThread {
    fn drop(&mut self) {
        if !thread::panicking() {
            let _ = self.shutdown();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
