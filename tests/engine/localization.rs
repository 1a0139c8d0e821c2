//! Promotion, demotion and stash handling

use crate::common::*;
use epochdb::ops::FIRST_CUSTOM;
use epochdb::{AbortReason, EngineConfig, RecordValue, Reply, Request, TxnError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn cold_keys_stay_global() {
    let db = manual_db(1);
    let key = counter(1);
    increment_n(&db, 0, key, 1);
    let report = db.advance_epoch().unwrap();
    assert!(report.promoted.is_empty());
    assert!(!db.is_localized(&key));
}

#[test]
fn read_mostly_keys_are_not_promoted() {
    let db = manual_db(1);
    let key = counter(1);
    db.load(key, RecordValue::Counter(0));
    for _ in 0..3 {
        increment_n(&db, 0, key, 1);
        for _ in 0..3 {
            db.submit(0, read(key)).unwrap();
        }
    }
    let report = db.advance_epoch().unwrap();
    assert!(report.promoted.is_empty());
}

#[test]
fn promotion_keeps_every_concurrent_increment() {
    let workers = 4;
    let per_thread = 300;
    let db = manual_db(workers);
    let key = counter(1);
    let running = AtomicBool::new(true);

    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let db = &db;
                s.spawn(move || increment_n(db, w, key, per_thread))
            })
            .collect();

        let db = &db;
        let running = &running;
        s.spawn(move || {
            while running.load(Ordering::Acquire) {
                db.advance_epoch().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        for h in handles {
            h.join().unwrap();
        }
        running.store(false, Ordering::Release);
    });

    // One more advance merges whatever the overlays still hold
    db.advance_epoch().unwrap();
    assert_eq!(
        db.peek(&key),
        Some(RecordValue::Counter((workers * per_thread) as i64))
    );
    assert!(db.metrics().promotions >= 1);
}

#[test]
fn quiet_key_is_demoted_after_two_decisions() {
    let db = manual_db(1);
    let key = counter(1);
    promote(&db, key);

    let first = db.advance_epoch().unwrap();
    assert!(first.demoted.is_empty());
    assert!(db.is_localized(&key));

    let second = db.advance_epoch().unwrap();
    assert_eq!(second.demoted, vec![key]);
    assert!(!db.is_localized(&key));
    assert_eq!(db.metrics().demotions, 1);
}

#[test]
fn continued_writes_keep_key_localized() {
    let db = manual_db(1);
    let key = counter(1);
    promote(&db, key);
    for _ in 0..3 {
        increment_n(&db, 0, key, 3);
        let report = db.advance_epoch().unwrap();
        assert!(report.demoted.is_empty());
    }
    assert!(db.is_localized(&key));
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(12)));
}

#[test]
fn replay_gives_up_after_attempt_bound() {
    let db = open_db(EngineConfig::manual(1).with_max_replay_attempts(3));
    let key = counter(1);
    db.register(FIRST_CUSTOM, |tx, req| {
        tx.read(req.k1)?;
        Err(TxnError::aborted(AbortReason::StaleRead(req.k1)))
    })
    .unwrap();
    promote(&db, key);

    let (request, rx) = Request::new(FIRST_CUSTOM).with_key(key).with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));
    db.advance_epoch().unwrap();

    assert_eq!(
        await_completion(&rx),
        Err(TxnError::aborted(AbortReason::ReplayExhausted(3)))
    );
    let metrics = db.metrics();
    assert_eq!(metrics.replays, 1);
    assert_eq!(metrics.replay_failures, 1);
}

#[test]
fn replay_delivers_final_errors_unchanged() {
    let db = manual_db(1);
    let key = counter(1);
    db.register(FIRST_CUSTOM, |tx, req| {
        tx.read(req.k1)?;
        Err(TxnError::NoRetry("rejected".into()))
    })
    .unwrap();
    promote(&db, key);

    let (request, rx) = Request::new(FIRST_CUSTOM).with_key(key).with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));
    db.advance_epoch().unwrap();
    assert_eq!(
        await_completion(&rx),
        Err(TxnError::NoRetry("rejected".into()))
    );
}

#[test]
fn full_stash_queue_forces_an_advance() {
    let db = open_db(EngineConfig::manual(1).with_stash_trigger(2));
    let key = counter(1);
    promote(&db, key);
    let epoch = db.epoch();

    let (first, rx1) = read(key).with_completion();
    let (second, rx2) = read(key).with_completion();
    assert_eq!(db.submit(0, first), Err(TxnError::Stashed));
    assert_eq!(db.submit(0, second), Err(TxnError::Stashed));

    // No manual advance: the full queue asks the coordinator for one
    let expected = Reply::Record(RecordValue::Counter(3));
    assert_eq!(await_completion(&rx1).unwrap().reply, expected);
    assert_eq!(await_completion(&rx2).unwrap().reply, expected);
    assert!(db.epoch() > epoch);
}

#[test]
fn sampled_accesses_are_counted_per_shard() {
    let db = manual_db(1);
    let key = counter(5);
    increment_n(&db, 0, key, 2);
    db.submit(0, read(key)).unwrap();
    let counts = db.store().shard_access_counts();
    assert_eq!(counts.len(), 256);
    assert!(counts[key.shard()] >= 3);
}
