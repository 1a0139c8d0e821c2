//! Concurrency Integration Tests
//!
//! OCC guarantees across workers: no lost updates, atomic multi-key commits,
//! monotonic record versions.

#[path = "../common/mod.rs"]
mod common;

mod conservation;
mod isolation;
mod versions;
