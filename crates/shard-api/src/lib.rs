//! JSON REST API for the Shardhold ledger.
//!
//! Exposes an axum [`Router`] backed by a [`shard_ledger::Ledger`]. Handlers
//! read the caller from a [`Caller`] request extension; authenticating the
//! request and inserting it is the embedding server's job.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", shard_api::api_router(ledger.clone()))
//! ```

pub mod audit;
pub mod error;
pub mod extract;
pub mod fractions;
pub mod properties;
pub mod proposals;
pub mod wallets;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use shard_core::{chain::ChainGateway, store::LedgerStore};
use shard_ledger::Ledger;

pub use error::ApiError;
pub use extract::Caller;

/// Build a fully-materialised API router for `ledger`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(ledger: Arc<Ledger<S, G>>) -> Router<()>
where
  S: LedgerStore + 'static,
  G: ChainGateway + 'static,
{
  Router::new()
    // Wallets
    .route("/wallets", get(wallets::list::<S, G>).post(wallets::connect::<S, G>))
    .route("/wallets/{address}/holdings", get(wallets::holdings::<S, G>))
    // Properties
    .route(
      "/properties",
      get(properties::list::<S, G>).post(properties::register::<S, G>),
    )
    .route("/properties/{id}", get(properties::get_one::<S, G>))
    .route("/properties/{id}/fractions", get(properties::fractions::<S, G>))
    .route("/properties/{id}/supply", get(properties::supply::<S, G>))
    // Fractions
    .route("/fractions/mint", post(fractions::mint::<S, G>))
    .route("/fractions/burn", post(fractions::burn::<S, G>))
    .route("/fractions/transfer", post(fractions::transfer::<S, G>))
    .route("/fractions/unlock", post(fractions::unlock::<S, G>))
    .route("/fractions/{id}", get(fractions::get_one::<S, G>))
    // Sell proposals
    .route(
      "/sell-proposals",
      get(proposals::list::<S, G>).post(proposals::create::<S, G>),
    )
    .route("/sell-proposals/{id}", get(proposals::get_one::<S, G>))
    .route("/sell-proposals/{id}/buy", post(proposals::buy::<S, G>))
    // Audit trail
    .route("/transactions", get(audit::transactions::<S, G>))
    .route("/operations/{id}", get(audit::operation::<S, G>))
    .with_state(ledger)
}

#[cfg(test)]
mod tests;
