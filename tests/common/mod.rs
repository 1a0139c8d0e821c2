//! Shared test utilities for all integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use epochdb::{ops, Database, EngineConfig, Key, Request, RetryConfig};
use std::sync::mpsc::Receiver;
use std::sync::Once;
use std::time::Duration;

static INIT_TRACING: Once = Once::new();

/// Route engine warnings to the test output
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::WARN)
            .try_init();
    });
}

/// A manual-mode database: no timer, every transaction sampled, a
/// promotion decision on every advance
pub fn manual_db(workers: usize) -> Database {
    init_tracing();
    Database::open(EngineConfig::manual(workers)).expect("open manual database")
}

/// Open with a custom config
pub fn open_db(config: EngineConfig) -> Database {
    init_tracing();
    Database::open(config).expect("open database")
}

/// Counter key `n`
pub fn counter(n: u64) -> Key {
    Key::from_id(n, b'c')
}

/// Account key `n`
pub fn account(n: u64) -> Key {
    Key::from_id(n, b'a')
}

/// Increment `key` by `amount`
pub fn incr(key: Key, amount: i64) -> Request {
    Request::new(ops::INCREMENT).with_key(key).with_amount(amount)
}

/// Read `key`
pub fn read(key: Key) -> Request {
    Request::new(ops::READ).with_key(key)
}

/// Retry aborts until they succeed, without sleeping
pub fn persistent() -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(100_000)
        .with_base_delay_ms(0)
        .with_max_delay_ms(1)
}

/// Wait for a deferred outcome
pub fn await_completion<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(Duration::from_secs(10))
        .expect("deferred outcome was not delivered")
}

/// Commit `n` increments of `key` on `worker`
pub fn increment_n(db: &Database, worker: usize, key: Key, n: usize) {
    for _ in 0..n {
        db.submit_with_retry(worker, incr(key, 1), persistent())
            .expect("increment commits");
    }
}

/// Drive `key` into localized mode on a manual database
///
/// Three sampled writes with no reads give a score of 3, above the default
/// promotion threshold of 2.
pub fn promote(db: &Database, key: Key) {
    increment_n(db, 0, key, 3);
    let report = db.advance_epoch().expect("advance");
    assert!(report.promoted.contains(&key), "{} was not promoted", key);
    assert!(db.is_localized(&key));
}
