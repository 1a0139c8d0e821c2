//! End-to-end scenarios

use crate::common::*;
use epochdb::{ops, RecordValue, Reply, Request, TxnError};
use std::thread;

#[test]
fn two_concurrent_increments_both_land() {
    let db = manual_db(2);
    let key = counter(1);
    db.load(key, RecordValue::Counter(40));

    thread::scope(|s| {
        for worker in 0..2 {
            let db = &db;
            s.spawn(move || {
                db.submit_with_retry(worker, incr(key, 1), persistent())
                    .unwrap();
            });
        }
    });

    assert_eq!(db.peek(&key), Some(RecordValue::Counter(42)));
}

#[test]
fn promote_stash_replay_returns_merged_value() {
    let db = manual_db(1);
    let key = counter(7);
    db.load(key, RecordValue::Counter(10));

    promote(&db, key);
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(13)));

    // Localized writes stay in the worker overlay until the next merge
    increment_n(&db, 0, key, 2);
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(13)));

    let (request, rx) = read(key).with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));
    assert_eq!(db.worker(0).unwrap().stash_len(), 1);

    db.advance_epoch().unwrap();
    let receipt = await_completion(&rx).unwrap();
    assert_eq!(receipt.reply, Reply::Record(RecordValue::Counter(15)));
    assert_eq!(receipt.tid.epoch(), db.epoch());
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(15)));
    assert_eq!(db.worker(0).unwrap().stash_len(), 0);
}

#[test]
fn stashed_read_increment_applies_after_join() {
    let db = manual_db(2);
    let hot = counter(1);
    let cold = counter(2);
    promote(&db, hot);

    increment_n(&db, 1, hot, 4);
    let (request, rx) = Request::new(ops::READ_INCREMENT)
        .with_keys(cold, hot)
        .with_amount(1)
        .with_completion();
    assert_eq!(db.submit(1, request), Err(TxnError::Stashed));
    assert_eq!(db.peek(&cold), None);

    db.advance_epoch().unwrap();
    let receipt = await_completion(&rx).unwrap();
    assert_eq!(receipt.reply, Reply::Int(7));
    assert_eq!(db.peek(&cold), Some(RecordValue::Counter(1)));
}

#[test]
fn transfer_between_hot_and_cold_accounts() {
    let db = manual_db(1);
    let hot = account(1);
    let cold = account(2);
    db.load(hot, RecordValue::Counter(100));
    promote(&db, hot);

    // TRANSFER reads its source, so a localized source is stashed
    let (request, rx) = Request::new(ops::TRANSFER)
        .with_keys(hot, cold)
        .with_amount(30)
        .with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));

    db.advance_epoch().unwrap();
    assert_eq!(await_completion(&rx).unwrap().reply, Reply::Int(73));
    assert_eq!(db.peek(&hot), Some(RecordValue::Counter(73)));
    assert_eq!(db.peek(&cold), Some(RecordValue::Counter(30)));
}
