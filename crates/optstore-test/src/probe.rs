//! Wakeup probes and change assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use optstore_core::{ConfigCache, WakeupHook};

use crate::TestError;

/// Counts how often a wakeup hook fired.
///
/// ```
/// use optstore_test::{PlayerFixture, WakeupCounter};
///
/// let f = PlayerFixture::new();
/// let counter = WakeupCounter::new();
/// let mut cache = f.cache_for(&f.audio).unwrap();
/// cache.set_wakeup(Some(counter.hook()));
///
/// f.shadow.set(f.volume, 50);
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WakeupCounter {
    count: Arc<AtomicUsize>,
}

impl WakeupCounter {
    /// A counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook incrementing this counter.
    #[must_use]
    pub fn hook(&self) -> WakeupHook {
        let count = Arc::clone(&self.count);
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Wakeups seen so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Return the count and reset it to zero.
    pub fn take(&self) -> usize {
        self.count.swap(0, Ordering::SeqCst)
    }

    /// Block until at least `n` wakeups were seen.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if `timeout` elapses first.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> Result<(), TestError> {
        let deadline = Instant::now() + timeout;
        while self.count() < n {
            if Instant::now() >= deadline {
                return Err(TestError::Timeout(timeout));
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

/// Drain `cache` and return the full names of the options it reported.
pub fn changed_names(cache: &mut ConfigCache) -> Vec<String> {
    let mut names = Vec::new();
    while let Some(id) = cache.next_changed() {
        names.push(cache.tree().full_name(id).to_owned());
    }
    names
}

/// Assert that draining `cache` reports exactly `expected`, in order.
///
/// # Panics
///
/// Panics with both lists if they differ.
pub fn assert_changes(cache: &mut ConfigCache, expected: &[&str]) {
    let actual = changed_names(cache);
    assert_eq!(actual, expected, "cache reported unexpected changes");
}
