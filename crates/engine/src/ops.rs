//! Built-in operations
//!
//! | op | slots | effect |
//! |----|-------|--------|
//! | `READ` | k1 | read k1 |
//! | `INCREMENT` | k1, amount | counter k1 += amount |
//! | `MAX` | k1, amount | max k1 = max(k1, amount) |
//! | `PUT` | k1, text or amount | overwrite k1 |
//! | `LIST_INSERT` | k1, k2, amount, ids\[0\] | insert (order = amount, key = k2, value = ids\[0\]) into k1 |
//! | `TRANSFER` | k1, k2, amount | move amount from counter k1 to counter k2 |
//! | `READ_INCREMENT` | k1, k2, amount | read counter k2, then k1 += amount |
//! | `CREATE` | ids\[0\] as tag, text or amount | allocate an id, create its record |

use crate::request::{OpId, OpRegistry, Reply, Request};
use epochdb_concurrency::Transaction;
use epochdb_core::{Delta, Key, RankedEntry, TxnError, TxnResult, Value};

/// Read `k1`
pub const READ: OpId = 0;
/// Add `amount` to counter `k1`
pub const INCREMENT: OpId = 1;
/// Raise max record `k1` to `amount`
pub const MAX: OpId = 2;
/// Overwrite `k1`
pub const PUT: OpId = 3;
/// Insert into ranked list `k1`
pub const LIST_INSERT: OpId = 4;
/// Move `amount` between two counters
pub const TRANSFER: OpId = 5;
/// Read `k2`, increment `k1`
pub const READ_INCREMENT: OpId = 6;
/// Allocate an id and create its record
pub const CREATE: OpId = 7;

/// Every built-in op id
pub const BUILTINS: &[OpId] = &[
    READ,
    INCREMENT,
    MAX,
    PUT,
    LIST_INSERT,
    TRANSFER,
    READ_INCREMENT,
    CREATE,
];

/// First op id free for custom bodies
pub const FIRST_CUSTOM: OpId = 64;

pub(crate) fn register_builtins(registry: &mut OpRegistry) {
    registry.register(READ, read);
    registry.register(INCREMENT, increment);
    registry.register(MAX, max);
    registry.register(PUT, put);
    registry.register(LIST_INSERT, list_insert);
    registry.register(TRANSFER, transfer);
    registry.register(READ_INCREMENT, read_increment);
    registry.register(CREATE, create);
}

fn text_or_amount(req: &Request) -> Value {
    match &req.text {
        Some(s) => Value::String(s.clone()),
        None => Value::Int(req.amount),
    }
}

fn read(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    tx.read(req.k1).map(Reply::Record)
}

fn increment(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    tx.add(req.k1, req.amount)?;
    Ok(Reply::Empty)
}

fn max(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    tx.max(req.k1, req.amount)?;
    Ok(Reply::Empty)
}

fn put(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    tx.put(req.k1, text_or_amount(req))?;
    Ok(Reply::Empty)
}

fn list_insert(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    tx.insert(req.k1, RankedEntry::new(req.amount, req.k2, req.ids[0] as i64))?;
    Ok(Reply::Empty)
}

fn transfer(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    let balance = tx.read_int(req.k1)?;
    if balance < req.amount {
        return Err(TxnError::NoRetry(format!(
            "insufficient balance in {}: {} < {}",
            req.k1, balance, req.amount
        )));
    }
    tx.add(req.k1, -req.amount)?;
    tx.add(req.k2, req.amount)?;
    Ok(Reply::Int(balance - req.amount))
}

fn read_increment(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    let seen = tx.read_int(req.k2)?;
    tx.add(req.k1, req.amount)?;
    Ok(Reply::Int(seen))
}

fn create(tx: &mut Transaction<'_>, req: &Request) -> TxnResult<Reply> {
    let id = tx.unique_id().entity_id();
    let key = Key::from_id(id, req.ids[0] as u8);
    tx.create(key, Delta::Put(text_or_amount(req)))?;
    Ok(Reply::Id(id))
}
