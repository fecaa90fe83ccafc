//! Whole-stack scenarios: settings, a dispatch owner thread, caches woken
//! through the queue, and metrics.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use optstore::prelude::*;
use optstore_test::{
    assert_changes, OwnerThread, PlayerFixture, WakeupCounter, GAMMA_CHANGED, VIDEO_CHANGED,
};
use parking_lot::Mutex;

fn settings() -> OptstoreSettings {
    SettingsLoader::new()
        .with_string("[dispatch]\nlock_wakeup_interval_ms = 5", "toml")
        .unwrap()
        .load()
        .unwrap()
}

#[test]
fn test_owner_thread_updates_cache_on_dispatch_wakeup() {
    let settings = settings();
    let f = PlayerFixture::new();
    let queue = Arc::new(DispatchQueue::with_config(settings.dispatch_config()));
    let owner = OwnerThread::spawn(&queue);

    let cache = Arc::new(Mutex::new(
        ConfigCache::with_config(&f.shadow, 0, settings.cache_config()).unwrap(),
    ));
    let (seen_tx, seen_rx) = mpsc::channel();
    let callback: DispatchCallback = {
        let cache = Arc::clone(&cache);
        let volume = f.volume;
        Arc::new(move || {
            let mut cache = cache.lock();
            if cache.update() {
                let _ = seen_tx.send(*cache.get(volume));
            }
        })
    };
    cache
        .lock()
        .set_dispatch_wakeup(Some((Arc::clone(&queue), callback)));

    f.shadow.set(f.volume, 40);
    assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 40);

    f.shadow.set(f.volume, 55);
    assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 55);

    cache.lock().set_dispatch_wakeup(None);
    owner.stop().unwrap();
}

#[test]
fn test_lock_gives_exclusive_access_to_owner_cache() {
    let f = PlayerFixture::new();
    let queue = Arc::new(DispatchQueue::new());
    let owner = OwnerThread::spawn(&queue);
    let cache = Arc::new(Mutex::new(f.cache_for(&f.video).unwrap()));
    let mut root = f.root_cache().unwrap();

    f.shadow.set(f.gamma, 1.8);
    f.shadow.set(f.pause, true);

    // Another thread stops the owner and refreshes the owner's cache.
    {
        let _guard = queue.lock_guard();
        assert_eq!(queue.state(), QueueState::Exclusive);

        let mut cache = cache.lock();
        assert!(cache.update());
        assert_eq!(*cache.get(f.gamma), 1.8);
        // The cache's own root group contributes no flags.
        assert_eq!(cache.take_change_flags(), GAMMA_CHANGED);
    }

    // Seen from the player root, the video group's flag folds in.
    assert!(root.update());
    assert_eq!(root.take_change_flags(), GAMMA_CHANGED | VIDEO_CHANGED);

    // The owner drains normally again.
    let gamma = f.gamma;
    let read = queue
        .run({
            let cache = Arc::clone(&cache);
            move || *cache.lock().get(gamma)
        })
        .unwrap();
    assert_eq!(read, 1.8);

    owner.stop().unwrap();
}

#[test]
fn test_every_covering_cache_is_woken() {
    let f = PlayerFixture::new();
    let (root_wakeups, video_wakeups, audio_wakeups) =
        (WakeupCounter::new(), WakeupCounter::new(), WakeupCounter::new());

    let mut root = f.root_cache().unwrap();
    let mut video = f.cache_for(&f.video).unwrap();
    let mut audio = f.cache_for(&f.audio).unwrap();
    root.set_wakeup(Some(root_wakeups.hook()));
    video.set_wakeup(Some(video_wakeups.hook()));
    audio.set_wakeup(Some(audio_wakeups.hook()));

    let writer = {
        let shadow = Arc::clone(&f.shadow);
        let filter = f.scale_filter;
        thread::spawn(move || shadow.set(filter, String::from("lanczos")))
    };
    assert!(writer.join().unwrap());

    video_wakeups.wait_for(1, Duration::from_secs(5)).unwrap();
    assert_eq!(root_wakeups.count(), 1);
    assert_eq!(audio_wakeups.count(), 0);

    assert_changes(&mut root, &["video-scale-filter"]);
    assert_changes(&mut video, &["video-scale-filter"]);
    assert_changes(&mut audio, &[]);
}

#[test]
fn test_write_back_from_one_cache_reaches_another() {
    let f = PlayerFixture::new();
    let mut editor = f.cache_for(&f.audio).unwrap();
    let mut viewer = f.root_cache().unwrap();

    *editor.get_mut(f.volume) = 70;
    *editor.get_mut(f.mute) = true;
    assert!(editor.write_back(f.volume.id()));
    assert!(editor.write_back(f.mute.id()));

    assert_changes(&mut editor, &[]);
    assert_changes(&mut viewer, &["audio-volume", "audio-mute"]);
    assert_eq!(*viewer.get(f.volume), 70);
}

#[test]
fn test_store_metrics_are_recorded() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let f = PlayerFixture::new();
    let counter = WakeupCounter::new();
    let mut cache = f.root_cache().unwrap();
    cache.set_wakeup(Some(counter.hook()));

    metrics::with_local_recorder(&recorder, || {
        optstore::telemetry::describe_metrics();
        f.shadow.set(f.pause, true);
        f.shadow.set(f.pause, true);
        f.shadow.set(f.volume, 10);
    });

    let output = handle.render();
    assert!(output.contains("optstore_shadow_writes_total 2"));
    assert!(output.contains("optstore_shadow_redundant_writes_total 1"));
    assert!(output.contains("optstore_listener_wakeups_total 2"));
    assert_eq!(counter.count(), 2);
}
