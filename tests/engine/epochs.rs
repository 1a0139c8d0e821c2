//! Barrier liveness and epoch agreement

use crate::common::*;
use epochdb::{EngineConfig, Phase, RecordValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn idle_workers_follow_manual_advances() {
    let db = manual_db(4);
    for _ in 0..10 {
        let report = db.advance_epoch().unwrap();
        assert_eq!(db.epoch(), report.epoch);
        for w in 0..4 {
            assert_eq!(db.worker(w).unwrap().epoch(), report.epoch);
        }
    }
    assert_eq!(db.epoch().epoch_number(), 11);
    assert_eq!(db.metrics().epochs, 10);
}

#[test]
fn busy_workers_agree_on_every_epoch() {
    let workers = 3;
    let db = manual_db(workers);
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        for w in 0..workers {
            let db = &db;
            let stop = &stop;
            s.spawn(move || {
                let key = counter(w as u64);
                let mut last = db.epoch();
                while !stop.load(Ordering::Acquire) {
                    let receipt = db.submit_with_retry(w, incr(key, 1), persistent()).unwrap();
                    // Tokens never run behind the epoch a worker already saw
                    assert!(receipt.tid.epoch() >= last);
                    assert!(receipt.tid.epoch() <= db.epoch());
                    last = receipt.tid.epoch();
                }
            });
        }

        for _ in 0..25 {
            let report = db.advance_epoch().unwrap();
            for w in 0..workers {
                assert_eq!(db.worker(w).unwrap().epoch(), report.epoch);
            }
        }
        stop.store(true, Ordering::Release);
    });

    assert_eq!(db.metrics().epochs, 25);
}

#[test]
fn workers_are_normal_between_advances() {
    let db = manual_db(2);
    db.advance_epoch().unwrap();
    db.submit(0, incr(counter(1), 1)).unwrap();
    db.submit(1, incr(counter(1), 1)).unwrap();
    // A submit returns only once its worker is back in the normal phase
    assert_eq!(db.worker(0).unwrap().phase(), Phase::Normal);
    assert_eq!(db.worker(1).unwrap().phase(), Phase::Normal);
}

#[test]
fn accelerate_advances_in_manual_mode() {
    let db = manual_db(2);
    let start = db.epoch();
    db.accelerate();
    let deadline = Instant::now() + Duration::from_secs(10);
    while db.epoch() == start {
        assert!(Instant::now() < deadline, "accelerate did not advance");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn timer_drives_epochs_and_promotion() {
    let config = EngineConfig::default()
        .with_workers(2)
        .with_sample_rate(1)
        .with_stats_interval(1)
        .with_epoch_interval_ms(2);
    let db = open_db(config);
    let key = counter(1);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut sent = 0;
    while !db.is_localized(&key) {
        assert!(Instant::now() < deadline, "hot key was never promoted");
        db.submit_with_retry(sent % 2, incr(key, 1), persistent())
            .unwrap();
        sent += 1;
    }
    db.shutdown();
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(sent as i64)));
    assert!(db.metrics().epochs > 0);
}
