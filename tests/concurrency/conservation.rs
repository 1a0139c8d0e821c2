//! Multi-key commits are atomic: transfers conserve the total balance

use crate::common::*;
use epochdb::{ops, EngineConfig, LockMode, RecordValue, Request, TxnError};
use rand::{Rng, SeedableRng};
use std::thread;

const ACCOUNTS: u64 = 8;
const INITIAL: i64 = 1_000;

fn total(db: &epochdb::Database) -> i64 {
    (0..ACCOUNTS)
        .map(|n| db.peek(&account(n)).and_then(|v| v.as_counter()).unwrap_or(0))
        .sum()
}

fn run_transfers(config: EngineConfig, advance: bool) {
    let workers = config.workers;
    let db = open_db(config);
    for n in 0..ACCOUNTS {
        db.load(account(n), RecordValue::Counter(INITIAL));
    }

    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let db = &db;
                s.spawn(move || {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(w as u64);
                    for _ in 0..300 {
                        let from = rng.gen_range(0..ACCOUNTS);
                        let to = (from + rng.gen_range(1..ACCOUNTS)) % ACCOUNTS;
                        let (req, rx) = Request::new(ops::TRANSFER)
                            .with_keys(account(from), account(to))
                            .with_amount(rng.gen_range(1..50))
                            .with_completion();
                        match db.submit_with_retry(w, req, persistent()) {
                            Ok(_) | Err(TxnError::NoRetry(_)) => {}
                            // Deferred to the next join
                            Err(TxnError::Stashed) => {
                                let _ = await_completion(&rx);
                            }
                            Err(e) => panic!("transfer failed: {}", e),
                        }
                    }
                })
            })
            .collect();

        if advance {
            let db = &db;
            s.spawn(move || {
                while !handles.iter().all(|h| h.is_finished()) {
                    db.advance_epoch().unwrap();
                }
            });
        } else {
            for h in handles {
                h.join().unwrap();
            }
        }
    });

    db.shutdown();
    assert_eq!(total(&db), ACCOUNTS as i64 * INITIAL);
    for n in 0..ACCOUNTS {
        assert!(db.peek(&account(n)).unwrap().as_counter().unwrap() >= 0);
    }
}

#[test]
fn optimistic_transfers_conserve_total() {
    run_transfers(
        EngineConfig::default()
            .with_workers(4)
            .with_epoch_interval_ms(0),
        false,
    );
}

#[test]
fn blocking_transfers_conserve_total() {
    run_transfers(
        EngineConfig::default()
            .with_workers(4)
            .with_epoch_interval_ms(0)
            .with_lock_mode(LockMode::Blocking),
        false,
    );
}

#[test]
fn transfers_conserve_total_across_epochs() {
    run_transfers(EngineConfig::manual(4), true);
}
