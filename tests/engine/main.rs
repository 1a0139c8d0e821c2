//! Engine integration tests: epochs, localization, stash replay, lifecycle

#[path = "../common/mod.rs"]
mod common;

mod epochs;
mod lifecycle;
mod localization;
mod overwrites;
mod scenarios;
