//! Database facade
//!
//! Opening a database starts one idle poller per worker (`epochdb-poll-N`)
//! and the epoch timer (`epochdb-coord`). Clients submit requests to a
//! worker by index; any thread may submit to any worker, and submissions to
//! the same worker are serialized.
//!
//! # Example
//! ```ignore
//! let db = Database::open(EngineConfig::default())?;
//! let hits = Key::from_name("hits");
//! db.submit_with_retry(0, Request::new(ops::INCREMENT).with_key(hits).with_amount(1),
//!     RetryConfig::default())?;
//! db.shutdown();
//! ```

use crate::config::EngineConfig;
use crate::coordinator::{Coordinator, EpochReport, Trigger};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{EngineMetrics, MetricsSnapshot, WorkerSnapshot};
use crate::request::{OpId, OpRegistry, Reply, Request, TxnReceipt};
use crate::retry::RetryConfig;
use crate::worker::Worker;
use epochdb_concurrency::Transaction;
use epochdb_core::{Key, RecordValue, Tid, TxnError, TxnResult};
use epochdb_storage::Store;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// State shared by the facade, the workers and the background threads
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) store: Store,
    pub(crate) workers: Vec<Worker>,
    pub(crate) coordinator: Coordinator,
    pub(crate) registry: RwLock<OpRegistry>,
    pub(crate) metrics: EngineMetrics,
    shut_down: AtomicBool,
}

impl Shared {
    #[inline]
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

/// An open database
pub struct Database {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Database {
    /// Open an empty database with the built-in operations registered
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` for an invalid config and
    /// `EngineError::Io` if a background thread cannot be spawned.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let workers = (0..config.workers)
            .map(|i| Worker::new(i as u8, &config))
            .collect();
        let shared = Arc::new(Shared {
            store: Store::new(),
            workers,
            coordinator: Coordinator::new(),
            registry: RwLock::new(OpRegistry::with_builtins()),
            metrics: EngineMetrics::default(),
            shut_down: AtomicBool::new(false),
            config,
        });
        let db = Self {
            shared,
            threads: Mutex::new(Vec::new()),
        };
        if let Err(e) = db.spawn_threads() {
            db.shared.shut_down.store(true, Ordering::Release);
            db.stop_threads();
            return Err(e);
        }
        info!(
            target: "epochdb::engine",
            workers = db.shared.config.workers,
            lock_mode = ?db.shared.config.lock_mode,
            manual = db.shared.config.epoch_interval().is_none(),
            "Database opened"
        );
        Ok(db)
    }

    fn spawn_threads(&self) -> EngineResult<()> {
        let mut threads = self.threads.lock();
        for i in 0..self.shared.workers.len() {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("epochdb-poll-{}", i))
                .spawn(move || shared.workers[i].poll(&shared))?;
            threads.push(handle);
        }
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("epochdb-coord".to_string())
            .spawn(move || shared.coordinator.run(&shared))?;
        threads.push(handle);
        Ok(())
    }

    fn stop_threads(&self) {
        self.shared.coordinator.stop();
        self.shared.coordinator.barrier().close();
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// The config this database was opened with
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The record store
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Worker `index`
    pub fn worker(&self, index: usize) -> EngineResult<&Worker> {
        self.shared
            .workers
            .get(index)
            .ok_or(EngineError::UnknownWorker(index))
    }

    /// Run `request` on worker `worker`
    ///
    /// Returns `Stashed` if the request read a localized record; its final
    /// outcome is then delivered on the request's completion channel after
    /// the next epoch advance.
    pub fn submit(&self, worker: usize, request: Request) -> TxnResult<TxnReceipt> {
        let w = self
            .shared
            .workers
            .get(worker)
            .ok_or_else(|| TxnError::NoRetry(format!("unknown worker {}", worker)))?;
        w.submit(&self.shared, request)
    }

    /// Run `request`, retrying aborts with exponential backoff
    ///
    /// `Stashed`, `NotFound` and `NoRetry` are returned without retrying.
    pub fn submit_with_retry(
        &self,
        worker: usize,
        request: Request,
        config: RetryConfig,
    ) -> TxnResult<TxnReceipt> {
        let mut attempt = 0;
        loop {
            match self.submit(worker, request.clone()) {
                Err(e) if config.should_retry(&e, attempt) => {
                    debug!(target: "epochdb::txn", worker, attempt, error = %e, "Retrying aborted transaction");
                    config.wait(attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Register a transaction body for `op`, replacing any previous one
    pub fn register<F>(&self, op: OpId, body: F) -> EngineResult<()>
    where
        F: Fn(&mut Transaction<'_>, &Request) -> TxnResult<Reply> + Send + Sync + 'static,
    {
        if self.shared.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        self.shared.registry.write().register(op, body);
        Ok(())
    }

    /// Advance the epoch now and wait for every worker to pass it
    ///
    /// This is how epochs move in manual mode. Must not be called from inside
    /// a transaction body.
    pub fn advance_epoch(&self) -> EngineResult<EpochReport> {
        if self.shared.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        self.shared
            .coordinator
            .advance(&self.shared, Trigger::Manual)
            .ok_or(EngineError::ShutDown)
    }

    /// Request an early epoch advance from the background coordinator
    pub fn accelerate(&self) {
        self.shared.coordinator.accelerate();
    }

    /// The current global epoch
    pub fn epoch(&self) -> Tid {
        self.shared.coordinator.epoch()
    }

    /// Seed a record outside any transaction
    ///
    /// Meant for bulk loading before traffic starts; it does not take the
    /// record's version lock.
    pub fn load(&self, key: Key, value: RecordValue) {
        self.shared.store.load(key, value);
    }

    /// The committed value of `key`, bypassing transactions
    ///
    /// For a localized key this excludes deltas not yet merged.
    pub fn peek(&self, key: &Key) -> Option<RecordValue> {
        self.shared.store.lookup(key).map(|r| r.snapshot())
    }

    /// Whether `key` is currently localized
    pub fn is_localized(&self, key: &Key) -> bool {
        self.shared.store.is_localized(key)
    }

    /// Snapshot of the engine counters
    pub fn metrics(&self) -> MetricsSnapshot {
        let workers = self
            .shared
            .workers
            .iter()
            .map(|w| WorkerSnapshot::new(w.id(), w.epoch().epoch_number(), w.phase(), &w.counters))
            .collect();
        MetricsSnapshot::new(
            &self.shared.metrics,
            self.shared.store.localized_keys().len(),
            workers,
        )
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Stop the database
    ///
    /// Runs a final advance that merges every overlay, replays every stash
    /// and demotes every localized key, then stops the background threads.
    /// Later submissions fail with `NoRetry`. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let report = self
            .shared
            .coordinator
            .advance(&self.shared, Trigger::Shutdown);
        self.stop_threads();
        info!(
            target: "epochdb::engine",
            demoted = report.map(|r| r.demoted.len()).unwrap_or(0),
            "Database shut down"
        );
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("workers", &self.shared.workers.len())
            .field("epoch", &self.epoch())
            .field("store", &self.shared.store)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
