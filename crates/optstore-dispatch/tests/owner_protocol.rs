//! Owner-thread protocol integration tests.
//!
//! These tests run a real owner thread and exercise the interaction of
//! enqueue, run, suspend and lock from other threads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use optstore_dispatch::{DispatchQueue, QueueState};
use parking_lot::Mutex;
use proptest::prelude::*;

/// Spawns an owner that keeps calling `process` until `stop` is set.
fn spawn_owner(queue: &Arc<DispatchQueue>, stop: &Arc<AtomicBool>) -> JoinHandle<()> {
    let queue = Arc::clone(queue);
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            queue.process(Duration::from_millis(5));
        }
    })
}

fn stop_owner(queue: &DispatchQueue, stop: &AtomicBool, owner: JoinHandle<()>) {
    stop.store(true, Ordering::SeqCst);
    queue.interrupt();
    owner.join().unwrap();
}

fn wait_for_state(queue: &DispatchQueue, state: QueueState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while queue.state() != state {
        assert!(Instant::now() < deadline, "queue never reached {state}");
        thread::yield_now();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_items_run_in_enqueue_order(values in proptest::collection::vec(any::<u32>(), 0..64)) {
        let queue = DispatchQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for value in &values {
            let seen = Arc::clone(&seen);
            let value = *value;
            queue.enqueue(move || seen.lock().push(value)).unwrap();
        }

        queue.process(Duration::ZERO);
        prop_assert_eq!(&*seen.lock(), &values);
    }
}

#[test]
fn test_items_and_lock_holders_never_overlap() {
    let queue = Arc::new(DispatchQueue::new());
    let stop = Arc::new(AtomicBool::new(false));
    let owner = spawn_owner(&queue, &stop);

    let busy = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let enter = |busy: &AtomicBool, overlaps: &AtomicUsize| {
        if busy.swap(true, Ordering::SeqCst) {
            overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(200));
        busy.store(false, Ordering::SeqCst);
    };

    let mut workers = Vec::new();
    for worker in 0..4 {
        let queue = Arc::clone(&queue);
        let busy = Arc::clone(&busy);
        let overlaps = Arc::clone(&overlaps);
        workers.push(thread::spawn(move || {
            for round in 0..20 {
                if (worker + round) % 2 == 0 {
                    let _guard = queue.lock_guard();
                    enter(&busy, &overlaps);
                } else {
                    let busy = Arc::clone(&busy);
                    let overlaps = Arc::clone(&overlaps);
                    queue.run(move || enter(&busy, &overlaps)).unwrap();
                }
            }
        }));
    }

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    stop_owner(&queue, &stop, owner);
}

#[test]
fn test_suspend_keeps_owner_inside_process() {
    let queue = Arc::new(DispatchQueue::new());
    let returned = Arc::new(AtomicBool::new(false));

    let owner_queue = Arc::clone(&queue);
    let owner_returned = Arc::clone(&returned);
    let owner = thread::spawn(move || {
        owner_queue.process(Duration::MAX);
        owner_returned.store(true, Ordering::SeqCst);
    });

    // suspend() blocks until the owner is inside process().
    wait_for_state(&queue, QueueState::Draining);
    queue.suspend();
    assert_eq!(queue.state(), QueueState::Suspended);

    // Items still run while suspended. Having run one, an unsuspended
    // owner would return right away.
    let value = queue.run(|| 11).unwrap();
    assert_eq!(value, 11);
    queue.interrupt();

    thread::sleep(Duration::from_millis(30));
    assert!(!returned.load(Ordering::SeqCst));
    assert_eq!(queue.state(), QueueState::Suspended);

    queue.resume();
    owner.join().unwrap();
    assert!(returned.load(Ordering::SeqCst));
    assert_eq!(queue.state(), QueueState::Idle);
}

#[test]
fn test_nested_suspends_need_every_resume() {
    let queue = Arc::new(DispatchQueue::new());
    let stop = Arc::new(AtomicBool::new(false));
    let owner = spawn_owner(&queue, &stop);

    queue.suspend();
    let other = Arc::clone(&queue);
    thread::spawn(move || other.suspend()).join().unwrap();
    assert_eq!(queue.suspend_requests(), 2);

    queue.resume();
    assert_eq!(queue.state(), QueueState::Suspended);
    queue.resume();
    assert_eq!(queue.suspend_requests(), 0);

    stop_owner(&queue, &stop, owner);
}

#[test]
fn test_lock_while_owner_waits_indefinitely() {
    let queue = Arc::new(DispatchQueue::new());
    let returned = Arc::new(AtomicBool::new(false));

    let owner_queue = Arc::clone(&queue);
    let owner_returned = Arc::clone(&returned);
    let owner = thread::spawn(move || {
        owner_queue.process(Duration::MAX);
        owner_returned.store(true, Ordering::SeqCst);
    });
    wait_for_state(&queue, QueueState::Draining);

    let shared = Arc::new(Mutex::new(0_u32));
    let locker_queue = Arc::clone(&queue);
    let locker_shared = Arc::clone(&shared);
    let locker = thread::spawn(move || {
        locker_queue.lock();
        assert_eq!(locker_queue.state(), QueueState::Exclusive);
        *locker_shared.lock() += 1;
        thread::sleep(Duration::from_millis(20));
        locker_queue.unlock();
    });
    locker.join().unwrap();

    assert!(!returned.load(Ordering::SeqCst));
    assert_eq!(*shared.lock(), 1);

    // The owner drains normally again after unlock.
    let item_shared = Arc::clone(&shared);
    let start = Instant::now();
    let value = queue
        .run(move || {
            *item_shared.lock() += 1;
            *item_shared.lock()
        })
        .unwrap();
    assert_eq!(value, 2);
    assert!(start.elapsed() < Duration::from_secs(1));

    owner.join().unwrap();
    assert!(returned.load(Ordering::SeqCst));
}

#[test]
fn test_suspend_coaxes_owner_with_wakeup_fn() {
    let queue = Arc::new(DispatchQueue::new());
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    let tx = Mutex::new(tx);
    queue.set_wakeup_fn(Some(Arc::new(move || {
        let _ = tx.lock().send(());
    })));

    // The owner blocks on its own channel, not in process().
    let owner_queue = Arc::clone(&queue);
    let owner = thread::spawn(move || {
        while rx.recv().is_ok() {
            owner_queue.process(Duration::ZERO);
            if owner_queue.suspend_requests() == 0 && owner_queue.pending() == 0 {
                break;
            }
        }
    });

    queue.suspend();
    assert!(queue.state().is_suspended());
    queue.resume();
    owner.join().unwrap();
    queue.set_wakeup_fn(None);
}
