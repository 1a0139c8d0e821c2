//! Read-modify-write transactions never lose updates

use crate::common::*;
use epochdb::ops::FIRST_CUSTOM;
use epochdb::{Database, EngineConfig, LockMode, Reply, Request, TxnError, Value};
use std::collections::BTreeSet;
use std::thread;

const READ_PUT_NEXT: u32 = FIRST_CUSTOM;

// Reads an overwrite record holding an integer and writes back the next one
fn open_with_read_put_next(mode: LockMode) -> Database {
    let config = EngineConfig::default()
        .with_workers(4)
        .with_epoch_interval_ms(0)
        .with_lock_mode(mode);
    let db = open_db(config);
    db.register(READ_PUT_NEXT, |tx, req| {
        let current = match tx.read(req.k1) {
            Ok(v) => v.as_value().and_then(Value::as_int).unwrap_or(0),
            Err(TxnError::NotFound(_)) => 0,
            Err(e) => return Err(e),
        };
        tx.put(req.k1, current + 1)?;
        Ok(Reply::Int(current + 1))
    })
    .unwrap();
    db
}

fn run_read_put_next(mode: LockMode) {
    let db = open_with_read_put_next(mode);
    let key = counter(1);
    let per_thread = 200;

    let seen: Vec<i64> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let db = &db;
                s.spawn(move || {
                    (0..per_thread)
                        .map(|_| {
                            let req = Request::new(READ_PUT_NEXT).with_key(key);
                            match db.submit_with_retry(w, req, persistent()).unwrap().reply {
                                Reply::Int(n) => n,
                                other => panic!("unexpected reply {:?}", other),
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    // Every commit saw a distinct predecessor
    let distinct: BTreeSet<i64> = seen.iter().copied().collect();
    let total = 4 * per_thread as i64;
    assert_eq!(distinct.len() as i64, total);
    assert_eq!(distinct.iter().next(), Some(&1));
    assert_eq!(distinct.iter().next_back(), Some(&total));

    let last = db.peek(&key).unwrap();
    assert_eq!(last.as_value().and_then(Value::as_int), Some(total));
}

#[test]
fn optimistic_read_modify_write_is_serializable() {
    run_read_put_next(LockMode::Optimistic);
}

#[test]
fn blocking_read_modify_write_is_serializable() {
    run_read_put_next(LockMode::Blocking);
}

#[test]
fn conflicts_are_counted() {
    let db = open_with_read_put_next(LockMode::Optimistic);
    let key = counter(9);
    thread::scope(|s| {
        for w in 0..4 {
            let db = &db;
            s.spawn(move || {
                for _ in 0..200 {
                    let req = Request::new(READ_PUT_NEXT).with_key(key);
                    db.submit_with_retry(w, req, persistent()).unwrap();
                }
            });
        }
    });
    let metrics = db.metrics();
    assert_eq!(metrics.commits, 800);
    assert_eq!(metrics.aborts, metrics.conflicts);
}
