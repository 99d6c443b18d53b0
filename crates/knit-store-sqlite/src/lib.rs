//! SQLite backend for the Knit identity store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Every `reconcile` executes the
//! core engine inside one IMMEDIATE transaction, retried on busy conflicts.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
