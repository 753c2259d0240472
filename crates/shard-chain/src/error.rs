//! Error type for `shard-chain`.

use shard_core::address::TxHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The relay answered with a non-success status.
  #[error("relay returned {status}: {body}")]
  Relay { status: u16, body: String },

  /// The gateway refused to broadcast the call.
  #[error("submission rejected: {0}")]
  Rejected(String),

  #[error("unknown transaction {0}")]
  UnknownTransaction(TxHash),

  #[error("invalid relay response: {0}")]
  InvalidResponse(String),

  #[error("gateway state lock poisoned")]
  Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
