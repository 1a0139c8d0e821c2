//! Transaction requests and the operation registry
//!
//! A request names an operation by id and carries a small fixed set of
//! argument slots. The body registered for that id runs against a
//! [`Transaction`] and decides how the slots are used.

use epochdb_concurrency::Transaction;
use epochdb_core::{Key, RecordValue, Tid, TxnResult};
use rustc_hash::FxHashMap;
use std::sync::mpsc;
use std::sync::Arc;

/// Operation identifier
pub type OpId = u32;

/// Channel end that receives the outcome of a stashed transaction
pub type Completion = mpsc::Sender<TxnResult<TxnReceipt>>;

/// A transaction body
///
/// Bodies may run more than once (retries, stash replay), so they must not
/// have side effects outside the transaction.
pub type TxnBody = Arc<dyn Fn(&mut Transaction<'_>, &Request) -> TxnResult<Reply> + Send + Sync>;

/// A transaction request
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Operation to run
    pub op: OpId,
    /// First key slot
    pub k1: Key,
    /// Second key slot
    pub k2: Key,
    /// Amount slot
    pub amount: i64,
    /// Integer id slots
    pub ids: [u64; 4],
    /// Optional text slot
    pub text: Option<String>,
    /// Receives the outcome if the request is stashed and replayed
    pub completion: Option<Completion>,
}

impl Request {
    /// A request for `op` with empty slots
    pub fn new(op: OpId) -> Self {
        Self {
            op,
            ..Default::default()
        }
    }

    /// Set the first key
    pub fn with_key(mut self, key: Key) -> Self {
        self.k1 = key;
        self
    }

    /// Set both keys
    pub fn with_keys(mut self, k1: Key, k2: Key) -> Self {
        self.k1 = k1;
        self.k2 = k2;
        self
    }

    /// Set the amount
    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    /// Set the id slots
    pub fn with_ids(mut self, ids: [u64; 4]) -> Self {
        self.ids = ids;
        self
    }

    /// Set the text slot
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach a completion channel, returning its receiving end
    pub fn with_completion(mut self) -> (Self, mpsc::Receiver<TxnResult<TxnReceipt>>) {
        let (tx, rx) = mpsc::channel();
        self.completion = Some(tx);
        (self, rx)
    }

    /// Deliver a deferred outcome; a dropped receiver is ignored
    pub(crate) fn complete(&self, outcome: TxnResult<TxnReceipt>) {
        if let Some(tx) = &self.completion {
            let _ = tx.send(outcome);
        }
    }
}

/// What a transaction body returns
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reply {
    /// Nothing to report
    #[default]
    Empty,
    /// A record value that was read
    Record(RecordValue),
    /// An integer result
    Int(i64),
    /// A freshly allocated id
    Id(u64),
}

/// A committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxnReceipt {
    /// Commit token
    pub tid: Tid,
    /// The body's reply
    pub reply: Reply,
}

/// Operation id to body table
#[derive(Clone, Default)]
pub struct OpRegistry {
    bodies: FxHashMap<OpId, TxnBody>,
}

impl OpRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in operations
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::ops::register_builtins(&mut registry);
        registry
    }

    /// Register `body` for `op`, returning the body it replaced
    pub fn register<F>(&mut self, op: OpId, body: F) -> Option<TxnBody>
    where
        F: Fn(&mut Transaction<'_>, &Request) -> TxnResult<Reply> + Send + Sync + 'static,
    {
        self.bodies.insert(op, Arc::new(body))
    }

    /// The body for `op`
    pub fn get(&self, op: OpId) -> Option<TxnBody> {
        self.bodies.get(&op).cloned()
    }

    /// Whether `op` is registered
    pub fn contains(&self, op: OpId) -> bool {
        self.bodies.contains_key(&op)
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ops: Vec<OpId> = self.bodies.keys().copied().collect();
        ops.sort_unstable();
        f.debug_struct("OpRegistry").field("ops", &ops).finish()
    }
}
