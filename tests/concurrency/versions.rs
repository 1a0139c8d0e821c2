//! Record versions never move backwards

use crate::common::*;
use epochdb::{EngineConfig, LockMode, RecordValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn watch_versions(config: EngineConfig) {
    let workers = config.workers;
    let db = open_db(config);
    let key = counter(1);
    db.load(key, RecordValue::Counter(0));
    let record = db.store().get(&key).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let record = &record;
        let done = &done;
        let watcher = s.spawn(move || {
            let mut last = record.lock().peek().version();
            let mut changes = 0;
            while !done.load(Ordering::Acquire) {
                let now = record.lock().peek().version();
                assert!(now >= last, "version went from {} to {}", last, now);
                if now > last {
                    changes += 1;
                }
                last = now;
            }
            changes
        });

        let writers: Vec<_> = (0..workers)
            .map(|w| {
                let db = &db;
                s.spawn(move || increment_n(db, w, key, 250))
            })
            .collect();
        for h in writers {
            h.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(watcher.join().unwrap() > 0);
    });

    assert_eq!(
        db.peek(&key),
        Some(RecordValue::Counter(workers as i64 * 250))
    );
}

#[test]
fn optimistic_versions_are_monotonic() {
    watch_versions(
        EngineConfig::default()
            .with_workers(4)
            .with_epoch_interval_ms(0),
    );
}

#[test]
fn unlocked_versions_are_monotonic() {
    watch_versions(
        EngineConfig::default()
            .with_workers(1)
            .with_epoch_interval_ms(0)
            .with_lock_mode(LockMode::Unlocked),
    );
}

#[test]
fn commit_tokens_exceed_observed_versions() {
    let db = manual_db(2);
    let key = counter(1);
    let a = db.submit(0, incr(key, 1)).unwrap().tid;
    // Worker 1 has issued nothing yet, but must still commit above `a`
    let b = db.submit(1, incr(key, 1)).unwrap().tid;
    assert!(b > a);
    assert_eq!(b.worker(), 1);
    let version = db.store().get(&key).unwrap().lock().peek().version();
    assert_eq!(version, b);
}
