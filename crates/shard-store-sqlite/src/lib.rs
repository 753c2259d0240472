//! SQLite backend for the Shardhold ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every shard mutation runs inside a
//! single `BEGIN IMMEDIATE` transaction.

mod apply;
mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
