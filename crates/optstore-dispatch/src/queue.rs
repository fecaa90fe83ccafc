//! Dispatch queue bound to a single owner thread.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::DispatchResult;
use crate::state::QueueState;

type Job = Box<dyn FnOnce() + Send + 'static>;
type Hook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Configuration for a dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often a thread waiting in `suspend`/`lock` re-invokes the wakeup
    /// function while the owner has not entered `process` yet.
    pub lock_wakeup_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lock_wakeup_interval: Duration::from_secs(1),
        }
    }
}

impl DispatchConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wakeup re-invocation interval used while suspending.
    pub fn with_lock_wakeup_interval(mut self, interval: Duration) -> Self {
        self.lock_wakeup_interval = interval;
        self
    }
}

/// Identity of a mergeable notification.
///
/// At most one item per key is pending at any time, and all pending items
/// with a key can be removed with [`DispatchQueue::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyKey(u64);

impl NotifyKey {
    /// Allocate a key that is unique within the process.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw key value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for NotifyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notify-{}", self.0)
    }
}

struct DispatchItem {
    job: Job,
    key: Option<NotifyKey>,
    // Present for blocking `run` items; set once the job has returned or
    // unwound.
    completion: Option<Arc<AtomicBool>>,
}

struct Inner {
    items: VecDeque<DispatchItem>,
    state: QueueState,
    owner: Option<ThreadId>,
    running: bool,
    current: Option<Arc<AtomicBool>>,
    suspend_requests: usize,
    exclusive_holder: Option<ThreadId>,
    interrupted: bool,
    deadline: Option<Instant>,
    wakeup_fn: Option<Hook>,
    onlock_fn: Option<Hook>,
}

impl Inner {
    fn transition(&mut self, next: QueueState) {
        assert!(
            self.state
                .can_transition(next, self.suspend_requests, self.running),
            "invalid dispatch queue transition {} -> {} (suspend requests: {}, running: {})",
            self.state,
            next,
            self.suspend_requests,
            self.running
        );
        trace!(from = %self.state, to = %next, "dispatch queue transition");
        self.state = next;
    }
}

/// A FIFO of closures executed by one owner thread.
///
/// Any thread may [`enqueue`](Self::enqueue) work or [`run`](Self::run) it
/// synchronously. The owner thread drains the queue by calling
/// [`process`](Self::process). Non-owner threads can pin the owner inside
/// `process` with [`suspend`](Self::suspend), or additionally gain exclusive
/// access to the owner's state with [`lock`](Self::lock).
///
/// # Example
///
/// ```
/// use optstore_dispatch::DispatchQueue;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// let queue = DispatchQueue::new();
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&hits);
/// queue.enqueue(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }).unwrap();
///
/// queue.process(Duration::ZERO);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct DispatchQueue {
    config: DispatchConfig,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DispatchQueue")
            .field("state", &inner.state)
            .field("pending", &inner.items.len())
            .field("suspend_requests", &inner.suspend_requests)
            .finish_non_exhaustive()
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    /// Create a new queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    /// Create a new queue with custom configuration.
    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                state: QueueState::Idle,
                owner: None,
                running: false,
                current: None,
                suspend_requests: 0,
                exclusive_holder: None,
                interrupted: false,
                deadline: None,
                wakeup_fn: None,
                onlock_fn: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Get the queue configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Get the current owner-thread state.
    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// Number of items waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Number of outstanding suspend requests (locks included).
    pub fn suspend_requests(&self) -> usize {
        self.inner.lock().suspend_requests
    }

    /// Set the function used to wake up an owner that blocks somewhere other
    /// than [`process`](Self::process), such as an event loop.
    ///
    /// It is called without the queue lock held, after every enqueue and
    /// periodically while a suspender waits for the owner.
    pub fn set_wakeup_fn(&self, wakeup: Option<Arc<dyn Fn() + Send + Sync + 'static>>) {
        self.inner.lock().wakeup_fn = wakeup;
    }

    /// Set a function called once at the start of every `suspend`/`lock`
    /// request, before waiting for the owner.
    pub fn set_onlock_fn(&self, onlock: Option<Arc<dyn Fn() + Send + Sync + 'static>>) {
        self.inner.lock().onlock_fn = onlock;
    }

    /// Queue a closure to run on the owner thread and return immediately.
    pub fn enqueue<F>(&self, f: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(DispatchItem {
            job: Box::new(f),
            key: None,
            completion: None,
        })
    }

    /// Queue a closure together with the data it works on.
    ///
    /// The queue owns `data` until the closure has run and drops it right
    /// after.
    pub fn enqueue_autofree<T, F>(&self, f: F, data: T) -> DispatchResult<()>
    where
        T: Send + 'static,
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.enqueue(move || {
            let mut data = data;
            f(&mut data);
        })
    }

    /// Queue a notification unless one with the same key is still pending.
    ///
    /// Returns whether an item was queued.
    pub fn enqueue_notify<F>(&self, key: NotifyKey, f: F) -> DispatchResult<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        let wakeup = {
            let mut inner = self.inner.lock();
            if inner.items.iter().any(|item| item.key == Some(key)) {
                return Ok(false);
            }
            inner.items.try_reserve(1)?;
            inner.items.push_back(DispatchItem {
                job: Box::new(f),
                key: Some(key),
                completion: None,
            });
            self.cond.notify_all();
            inner.wakeup_fn.clone()
        };

        counter!("optstore_dispatch_items_total").increment(1);
        if let Some(wakeup) = wakeup {
            wakeup();
        }
        Ok(true)
    }

    /// Remove every pending item queued with `key`.
    ///
    /// Items already running are not affected. Returns the number of items
    /// removed.
    pub fn cancel(&self, key: NotifyKey) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.items.len();
        inner.items.retain(|item| item.key != Some(key));
        let removed = before - inner.items.len();
        if removed > 0 {
            trace!(%key, removed, "cancelled pending dispatch items");
        }
        removed
    }

    /// Run a closure on the owner thread and wait for its result.
    ///
    /// Called from the owner thread while it is inside `process` (for
    /// example from a dispatched closure), the closure runs inline.
    ///
    /// # Panics
    ///
    /// Panics if the closure panicked on the owner thread, or if the caller
    /// holds this queue's lock (the owner could never run the item).
    pub fn run<F, R>(&self, f: F) -> DispatchResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let me = thread::current().id();
        {
            let inner = self.inner.lock();
            if inner.owner == Some(me) {
                drop(inner);
                return Ok(f());
            }
            assert!(
                inner.exclusive_holder != Some(me),
                "run() called while holding the dispatch lock"
            );
        }

        let slot: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
        let done = Arc::new(AtomicBool::new(false));
        let result = Arc::clone(&slot);

        self.push(DispatchItem {
            job: Box::new(move || {
                let value = f();
                *result.lock() = Some(value);
            }),
            key: None,
            completion: Some(Arc::clone(&done)),
        })?;

        let mut inner = self.inner.lock();
        while !done.load(Ordering::Acquire) {
            self.cond.wait(&mut inner);
        }
        drop(inner);

        let value = slot.lock().take();
        match value {
            Some(value) => Ok(value),
            None => panic!("dispatched closure panicked on the owner thread"),
        }
    }

    /// Drain the queue on the owner thread.
    ///
    /// Runs queued items in FIFO order. Returns once the queue is empty, no
    /// suspend request is outstanding, and either `timeout` has elapsed, at
    /// least one item ran, or [`interrupt`](Self::interrupt) was called.
    /// Suspend requests keep the owner in here regardless of the timeout.
    /// `Duration::MAX` waits indefinitely.
    ///
    /// While a closure runs the queue lock is released, so other threads
    /// can keep enqueuing, but no `lock` caller can get in.
    ///
    /// # Panics
    ///
    /// Panics if called recursively. A panic inside a dispatched closure
    /// propagates to the caller after the queue state is restored.
    pub fn process(&self, timeout: Duration) {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        assert!(
            inner.owner.is_none(),
            "DispatchQueue::process called recursively"
        );
        inner.owner = Some(me);
        inner.deadline = Instant::now().checked_add(timeout);
        if inner.suspend_requests > 0 {
            inner.transition(QueueState::Suspended);
            // Wake up threads waiting in suspend()/lock().
            self.cond.notify_all();
        } else {
            inner.transition(QueueState::Draining);
        }

        let mut ran_item = false;
        loop {
            if inner.state == QueueState::Exclusive {
                self.cond.wait(&mut inner);
                continue;
            }

            if let Some(item) = inner.items.pop_front() {
                inner.running = true;
                inner.current = item.completion;
                trace!(pending = inner.items.len(), "running dispatch item");

                let job = item.job;
                let outcome = MutexGuard::unlocked(&mut inner, || {
                    panic::catch_unwind(AssertUnwindSafe(job))
                });

                inner.running = false;
                if let Some(done) = inner.current.take() {
                    done.store(true, Ordering::Release);
                }
                // Wakes run() callers and lock() callers waiting for the
                // item to finish.
                self.cond.notify_all();

                if let Err(payload) = outcome {
                    // The owner leaves process() by unwinding; pending
                    // suspend requests are picked up by the next call.
                    inner.state = QueueState::Idle;
                    inner.owner = None;
                    inner.interrupted = false;
                    inner.deadline = None;
                    drop(inner);
                    panic::resume_unwind(payload);
                }

                ran_item = true;
                continue;
            }

            if inner.suspend_requests > 0 {
                self.cond.wait(&mut inner);
                continue;
            }

            if !ran_item && !inner.interrupted {
                match inner.deadline {
                    None => {
                        self.cond.wait(&mut inner);
                        continue;
                    }
                    Some(deadline) if Instant::now() < deadline => {
                        self.cond.wait_until(&mut inner, deadline);
                        continue;
                    }
                    Some(_) => {}
                }
            }

            break;
        }

        inner.transition(QueueState::Idle);
        inner.owner = None;
        inner.interrupted = false;
        inner.deadline = None;
    }

    /// Make the current (or next) `process` call return as soon as the
    /// queue is empty and not suspended, ignoring its remaining timeout.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        self.cond.notify_all();
    }

    /// Shorten the wait of the current `process` call to `deadline` if that
    /// is earlier than its own. Has no effect if the owner is not inside
    /// `process`.
    pub fn adjust_timeout(&self, deadline: Instant) {
        let mut inner = self.inner.lock();
        if inner.owner.is_none() {
            return;
        }
        if inner.deadline.map_or(true, |current| deadline < current) {
            inner.deadline = Some(deadline);
            self.cond.notify_all();
        }
    }

    /// Keep the owner thread inside `process` until the matching
    /// [`resume`](Self::resume).
    ///
    /// Blocks until the owner has entered `process`. The owner keeps running
    /// queued items while suspended.
    ///
    /// # Panics
    ///
    /// Panics when called from the owner thread while it is inside
    /// `process`.
    pub fn suspend(&self) {
        let inner = self.acquire_suspend();
        debug!(requests = inner.suspend_requests, "dispatch queue suspended");
    }

    /// Release one suspend request.
    ///
    /// # Panics
    ///
    /// Panics without a matching [`suspend`](Self::suspend), or if this
    /// would leave an exclusive lock holder without a suspend request.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        self.release_suspend(&mut inner);
    }

    /// Suspend the owner thread and gain exclusive access to its state.
    ///
    /// Waits until the owner is suspended and not running a dispatched
    /// closure. Until [`unlock`](Self::unlock) no dispatched closure runs,
    /// while other threads can still enqueue.
    ///
    /// # Panics
    ///
    /// Panics if called from the owner thread while it is inside `process`,
    /// or recursively from the thread already holding the lock.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut inner = self.acquire_suspend();
        assert!(
            inner.exclusive_holder != Some(me),
            "DispatchQueue::lock called recursively"
        );

        while inner.state != QueueState::Suspended || inner.running {
            self.cond.wait(&mut inner);
        }

        inner.transition(QueueState::Exclusive);
        inner.exclusive_holder = Some(me);
        debug!(requests = inner.suspend_requests, "dispatch queue locked");
    }

    /// Give up exclusive access taken with [`lock`](Self::lock).
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        assert!(
            inner.state == QueueState::Exclusive && inner.exclusive_holder == Some(me),
            "DispatchQueue::unlock called without holding the lock"
        );
        inner.exclusive_holder = None;
        inner.transition(QueueState::Suspended);
        debug!("dispatch queue unlocked");
        self.release_suspend(&mut inner);
    }

    /// [`lock`](Self::lock) the queue and return a guard that unlocks it
    /// when dropped.
    pub fn lock_guard(&self) -> DispatchLock<'_> {
        self.lock();
        DispatchLock {
            queue: self,
            _not_send: PhantomData,
        }
    }

    fn push(&self, item: DispatchItem) -> DispatchResult<()> {
        let wakeup = {
            let mut inner = self.inner.lock();
            inner.items.try_reserve(1)?;
            inner.items.push_back(item);
            self.cond.notify_all();
            inner.wakeup_fn.clone()
        };

        counter!("optstore_dispatch_items_total").increment(1);
        if let Some(wakeup) = wakeup {
            wakeup();
        }
        Ok(())
    }

    fn acquire_suspend(&self) -> MutexGuard<'_, Inner> {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        assert!(
            inner.owner != Some(me),
            "suspend/lock called from the dispatch owner thread"
        );

        inner.suspend_requests += 1;
        if inner.state == QueueState::Draining {
            inner.transition(QueueState::Suspended);
            self.cond.notify_all();
        }

        if let Some(onlock) = inner.onlock_fn.clone() {
            MutexGuard::unlocked(&mut inner, || onlock());
        }

        // Coax an owner blocked elsewhere into calling process().
        while inner.state == QueueState::Idle {
            if let Some(wakeup) = inner.wakeup_fn.clone() {
                MutexGuard::unlocked(&mut inner, || wakeup());
            }
            if inner.state != QueueState::Idle {
                break;
            }
            self.cond
                .wait_for(&mut inner, self.config.lock_wakeup_interval);
        }

        inner
    }

    fn release_suspend(&self, inner: &mut Inner) {
        assert!(
            inner.suspend_requests > 0,
            "DispatchQueue::resume called without a matching suspend"
        );
        if inner.state == QueueState::Exclusive {
            assert!(
                inner.suspend_requests > 1,
                "suspend count would drop to zero while the queue is locked"
            );
        }

        inner.suspend_requests -= 1;
        if inner.suspend_requests == 0 && inner.state == QueueState::Suspended {
            inner.transition(QueueState::Draining);
        }
        debug!(requests = inner.suspend_requests, "dispatch queue resumed");
        self.cond.notify_all();
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        let inner = self.inner.get_mut();
        assert!(
            inner.items.is_empty(),
            "dispatch queue dropped with {} pending items",
            inner.items.len()
        );
        assert_eq!(
            inner.suspend_requests, 0,
            "dispatch queue dropped while suspended"
        );
    }
}

/// RAII guard returned by [`DispatchQueue::lock_guard`].
///
/// Must be dropped on the thread that took it.
#[must_use = "the queue is unlocked as soon as the guard is dropped"]
pub struct DispatchLock<'a> {
    queue: &'a DispatchQueue,
    _not_send: PhantomData<*const ()>,
}

impl DispatchLock<'_> {
    /// Get the locked queue.
    pub fn queue(&self) -> &DispatchQueue {
        self.queue
    }
}

impl Drop for DispatchLock<'_> {
    fn drop(&mut self) {
        self.queue.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn test_enqueue_and_process() {
        let queue = DispatchQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            queue
                .enqueue(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert_eq!(queue.pending(), 3);
        queue.process(Duration::ZERO);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn test_process_preserves_fifo_order() {
        let queue = DispatchQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..10 {
            let order = Arc::clone(&order);
            queue.enqueue(move || order.lock().push(n)).unwrap();
        }

        queue.process(Duration::ZERO);
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_process_times_out_when_empty() {
        let queue = DispatchQueue::new();
        let start = Instant::now();
        queue.process(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_enqueue_autofree_drops_data() {
        let queue = DispatchQueue::new();
        let data = Arc::new(());
        let seen = Arc::new(AtomicUsize::new(0));

        let observed = Arc::clone(&seen);
        queue
            .enqueue_autofree(
                move |payload: &mut Arc<()>| {
                    observed.store(Arc::strong_count(payload), Ordering::SeqCst);
                },
                Arc::clone(&data),
            )
            .unwrap();

        queue.process(Duration::ZERO);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_enqueue_notify_merges_pending() {
        let queue = DispatchQueue::new();
        let key = NotifyKey::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            queue
                .enqueue_notify(key, move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert_eq!(queue.pending(), 1);
        queue.process(Duration::ZERO);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_removes_only_matching_key() {
        let queue = DispatchQueue::new();
        let key = NotifyKey::new();
        let other = NotifyKey::new();

        assert!(queue.enqueue_notify(key, || {}).unwrap());
        assert!(queue.enqueue_notify(other, || {}).unwrap());
        queue.enqueue(|| {}).unwrap();

        assert_eq!(queue.cancel(key), 1);
        assert_eq!(queue.cancel(key), 0);
        assert_eq!(queue.pending(), 2);
        queue.process(Duration::ZERO);
    }

    #[test]
    fn test_wakeup_fn_called_on_enqueue() {
        let queue = DispatchQueue::new();
        let wakeups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakeups);
        queue.set_wakeup_fn(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        queue.enqueue(|| {}).unwrap();
        queue.enqueue(|| {}).unwrap();
        assert_eq!(wakeups.load(Ordering::SeqCst), 2);
        queue.process(Duration::ZERO);
    }

    #[test]
    fn test_run_returns_value_from_owner() {
        let queue = Arc::new(DispatchQueue::new());
        let owner_queue = Arc::clone(&queue);
        let (id_tx, id_rx) = mpsc::channel();

        let owner = thread::spawn(move || {
            id_tx.send(thread::current().id()).unwrap();
            owner_queue.process(Duration::from_secs(5));
        });

        let owner_id = id_rx.recv().unwrap();
        let ran_on = queue.run(|| thread::current().id()).unwrap();
        assert_eq!(ran_on, owner_id);
        owner.join().unwrap();
    }

    #[test]
    fn test_run_inline_on_owner_thread() {
        let queue = Arc::new(DispatchQueue::new());
        let result = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_result = Arc::clone(&result);
        queue
            .enqueue(move || {
                let value = inner_queue.run(|| 7_usize).unwrap();
                inner_result.store(value, Ordering::SeqCst);
            })
            .unwrap();

        queue.process(Duration::ZERO);
        assert_eq!(result.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_interrupt_cuts_timeout_short() {
        let queue = Arc::new(DispatchQueue::new());
        let owner_queue = Arc::clone(&queue);
        let start = Instant::now();

        let owner = thread::spawn(move || owner_queue.process(Duration::MAX));
        while queue.state() == QueueState::Idle {
            thread::yield_now();
        }
        queue.interrupt();
        owner.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_interrupt_applies_to_next_process() {
        let queue = DispatchQueue::new();
        queue.interrupt();
        let start = Instant::now();
        queue.process(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_adjust_timeout_shortens_wait() {
        let queue = Arc::new(DispatchQueue::new());
        let owner_queue = Arc::clone(&queue);
        let start = Instant::now();

        let owner = thread::spawn(move || owner_queue.process(Duration::from_secs(30)));
        while queue.state() == QueueState::Idle {
            thread::yield_now();
        }
        queue.adjust_timeout(Instant::now() + Duration::from_millis(20));
        owner.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_adjust_timeout_ignored_when_idle() {
        let queue = DispatchQueue::new();
        queue.adjust_timeout(Instant::now());
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn test_lock_guard_excludes_items() {
        let queue = Arc::new(DispatchQueue::new());
        let owner_queue = Arc::clone(&queue);
        let stop = Arc::new(AtomicBool::new(false));
        let owner_stop = Arc::clone(&stop);

        let owner = thread::spawn(move || {
            while !owner_stop.load(Ordering::SeqCst) {
                owner_queue.process(Duration::from_millis(10));
            }
        });

        let hits = Arc::new(AtomicUsize::new(0));
        {
            let guard = queue.lock_guard();
            assert_eq!(guard.queue().state(), QueueState::Exclusive);
            let hits = Arc::clone(&hits);
            queue
                .enqueue(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            thread::sleep(Duration::from_millis(30));
            assert_eq!(queue.pending(), 1);
        }

        queue.run(|| ()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        stop.store(true, Ordering::SeqCst);
        queue.interrupt();
        owner.join().unwrap();
    }

    #[test]
    fn test_onlock_fn_called_on_suspend() {
        let queue = Arc::new(DispatchQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        queue.set_onlock_fn(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let owner_queue = Arc::clone(&queue);
        let owner = thread::spawn(move || owner_queue.process(Duration::MAX));

        queue.suspend();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        queue.resume();
        queue.interrupt();
        owner.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "without a matching suspend")]
    fn test_resume_without_suspend_panics() {
        let queue = DispatchQueue::new();
        queue.resume();
    }

    #[test]
    #[should_panic(expected = "without holding the lock")]
    fn test_unlock_without_lock_panics() {
        let queue = DispatchQueue::new();
        queue.unlock();
    }

    #[test]
    #[should_panic(expected = "pending items")]
    fn test_drop_with_pending_items_panics() {
        let queue = DispatchQueue::new();
        queue.enqueue(|| {}).unwrap();
        drop(queue);
    }

    #[test]
    fn test_panicking_item_restores_state() {
        let queue = Arc::new(DispatchQueue::new());
        queue.enqueue(|| panic!("boom")).unwrap();

        let owner_queue = Arc::clone(&queue);
        let result = thread::spawn(move || owner_queue.process(Duration::ZERO)).join();
        assert!(result.is_err());
        assert_eq!(queue.state(), QueueState::Idle);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        queue
            .enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        queue.process(Duration::ZERO);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_key_unique() {
        let a = NotifyKey::new();
        let b = NotifyKey::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("notify-"));
    }

    #[test]
    fn test_config_builder() {
        let config = DispatchConfig::new().with_lock_wakeup_interval(Duration::from_millis(5));
        let queue = DispatchQueue::with_config(config);
        assert_eq!(queue.config().lock_wakeup_interval, Duration::from_millis(5));
    }
}
