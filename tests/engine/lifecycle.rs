//! Opening from config files, shutdown and drop

use crate::common::*;
use epochdb::{Database, EngineConfig, EngineError, LockMode, RecordValue, Reply, TxnError};
use tempfile::TempDir;

#[test]
fn open_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("epochdb.toml");
    std::fs::write(
        &path,
        "workers = 3\nepoch_interval_ms = 0\nlock_mode = \"blocking\"\n",
    )
    .unwrap();

    let config = EngineConfig::from_file(&path).unwrap();
    let db = Database::open(config).unwrap();
    assert_eq!(db.worker_count(), 3);
    assert_eq!(db.config().lock_mode, LockMode::Blocking);
    db.submit(2, incr(counter(1), 5)).unwrap();
    assert_eq!(db.peek(&counter(1)), Some(RecordValue::Counter(5)));
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "workers = 0\n").unwrap();
    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn shutdown_merges_overlays_and_demotes() {
    let db = manual_db(2);
    let key = counter(1);
    promote(&db, key);
    increment_n(&db, 0, key, 2);
    increment_n(&db, 1, key, 5);
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(3)));

    db.shutdown();
    assert_eq!(db.peek(&key), Some(RecordValue::Counter(10)));
    assert!(!db.is_localized(&key));
    assert!(db.metrics().demotions >= 1);
}

#[test]
fn shutdown_replays_pending_stash() {
    let db = manual_db(1);
    let key = counter(1);
    promote(&db, key);
    increment_n(&db, 0, key, 1);
    let (request, rx) = read(key).with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));

    db.shutdown();
    let receipt = await_completion(&rx).unwrap();
    assert_eq!(receipt.reply, Reply::Record(RecordValue::Counter(4)));
}

#[test]
fn drop_shuts_down_cleanly() {
    let key = counter(1);
    {
        let db = manual_db(4);
        increment_n(&db, 3, key, 2);
    }
    let db = manual_db(1);
    assert_eq!(db.peek(&key), None);
}

#[test]
fn unlocked_mode_single_worker() {
    let db = open_db(EngineConfig::manual(1).with_lock_mode(LockMode::Unlocked));
    increment_n(&db, 0, counter(1), 10);
    db.advance_epoch().unwrap();
    increment_n(&db, 0, counter(1), 10);
    db.shutdown();
    assert_eq!(db.peek(&counter(1)), Some(RecordValue::Counter(20)));
}

#[test]
fn metrics_track_the_promote_stash_cycle() {
    let db = manual_db(1);
    let key = counter(1);
    promote(&db, key);
    let (request, _rx) = read(key).with_completion();
    assert_eq!(db.submit(0, request), Err(TxnError::Stashed));
    db.advance_epoch().unwrap();

    let metrics = db.metrics();
    assert_eq!(metrics.promotions, 1);
    assert_eq!(metrics.stashes, 1);
    assert_eq!(metrics.replays, 1);
    assert_eq!(metrics.replay_failures, 0);
    assert_eq!(metrics.commits, 4);
    assert_eq!(metrics.localized_keys, 1);
    assert_eq!(metrics.workers.len(), 1);
    assert_eq!(metrics.workers[0].stash_len, 0);

    let json = serde_json::to_value(&metrics).unwrap();
    assert_eq!(json["promotions"], 1);
}
