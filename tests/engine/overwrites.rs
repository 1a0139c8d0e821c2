//! Overwrite ordering on localized records across workers and phases

use crate::common::*;
use epochdb::ops::{self, FIRST_CUSTOM};
use epochdb::{Database, EngineConfig, Key, Reply, Request, Tid, TxnError, Value};

const READ_THEN_PUT: u32 = FIRST_CUSTOM;

fn register_read_then_put(db: &Database) {
    db.register(READ_THEN_PUT, |tx, req| {
        tx.read(req.k1)?;
        tx.put(req.k1, req.amount)?;
        Ok(Reply::Empty)
    })
    .unwrap();
}

fn put(key: Key, value: i64) -> Request {
    Request::new(ops::PUT).with_key(key).with_amount(value)
}

fn current(db: &Database, key: &Key) -> Option<i64> {
    db.peek(key)?.as_value().and_then(Value::as_int)
}

// Three puts on worker 0 make the key write-hot
fn promote_overwrite(db: &Database, key: Key) {
    for n in 0..3 {
        db.submit(0, put(key, n)).unwrap();
    }
    let report = db.advance_epoch().unwrap();
    assert!(report.promoted.contains(&key));
}

#[test]
fn normal_put_after_join_replays_wins() {
    let db = open_db(EngineConfig::manual(3).with_max_replay_attempts(1_000));
    register_read_then_put(&db);
    let key = Key::from_id(1, b'o');
    promote_overwrite(&db, key);

    // Parked on workers 0 and 1, replayed at the next join
    let mut pending = Vec::new();
    for (worker, value) in [(0, 100), (0, 101), (0, 102), (1, 200), (1, 201)] {
        let (req, rx) = Request::new(READ_THEN_PUT)
            .with_key(key)
            .with_amount(value)
            .with_completion();
        assert_eq!(db.submit(worker, req), Err(TxnError::Stashed));
        pending.push(rx);
    }
    db.advance_epoch().unwrap();
    let replayed: Vec<Tid> = pending
        .iter()
        .map(|rx| await_completion(rx).unwrap().tid)
        .collect();
    assert!(db.is_localized(&key));

    // Worker 2 has a fresh sequence in this epoch
    let receipt = db.submit(2, put(key, 999)).unwrap();
    for tid in &replayed {
        assert!(receipt.tid > *tid, "{} should order after {}", receipt.tid, tid);
    }

    db.advance_epoch().unwrap();
    assert_eq!(current(&db, &key), Some(999));
}

#[test]
fn later_epoch_puts_win_over_earlier_ones() {
    let db = manual_db(2);
    let key = Key::from_id(2, b'o');
    promote_overwrite(&db, key);

    for n in 0..5 {
        db.submit(1, put(key, 10 + n)).unwrap();
    }
    db.advance_epoch().unwrap();
    assert_eq!(current(&db, &key), Some(14));

    // A single put from the other worker in the next epoch beats them all
    db.submit(0, put(key, 7)).unwrap();
    db.advance_epoch().unwrap();
    assert_eq!(current(&db, &key), Some(7));
}
