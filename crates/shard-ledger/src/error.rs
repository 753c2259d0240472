//! Error type for `shard-ledger`.

use shard_core::{address::TxHash, store::StoreError};
use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// A ledger rule rejected the request. Nothing was submitted or written.
  #[error(transparent)]
  Domain(#[from] shard_core::Error),

  /// The gateway could not submit the call or report on it.
  #[error("chain gateway error: {0}")]
  Chain(BoxError),

  /// The transaction was mined but reverted. The ledger is unchanged.
  #[error("transaction {tx_hash} reverted: {reason}")]
  Reverted {
    operation_id: Uuid,
    tx_hash:      TxHash,
    reason:       String,
  },

  /// Submitted but not confirmed within the wait window. The operation stays
  /// open and is settled by the reconciler.
  #[error("operation {operation_id} ({tx_hash}) is awaiting confirmation")]
  Pending { operation_id: Uuid, tx_hash: TxHash },

  /// Confirmed on-chain, but the ledger could not mirror it. The operation
  /// is marked diverged and needs an operator.
  #[error("operation {operation_id} ({tx_hash}) confirmed on-chain but not applied: {reason}")]
  Reconciliation {
    operation_id: Uuid,
    tx_hash:      TxHash,
    reason:       String,
  },

  #[error("store error: {0}")]
  Store(BoxError),
}

impl Error {
  /// Split a backend error into a ledger rule violation or a storage failure.
  pub(crate) fn from_store<E: StoreError>(err: E) -> Self {
    match err.into_domain() {
      Ok(rule) => Self::Domain(rule),
      Err(other) => Self::Store(Box::new(other)),
    }
  }

  pub(crate) fn from_chain<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Chain(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
