//! Core types and trait definitions for the Shardhold ledger.
//!
//! No HTTP, database or chain-client dependencies live here. Every other
//! crate in the workspace depends on this one.

// Trait methods are written as `async fn` in impls; the `Send` bounds are
// spelled out on the trait declarations instead.
#![allow(async_fn_in_trait)]

pub mod address;
pub mod amount;
pub mod audit;
pub mod chain;
pub mod error;
pub mod fraction;
pub mod operation;
pub mod property;
pub mod store;
pub mod wallet;

pub use error::{Error, ErrorKind, Result};
