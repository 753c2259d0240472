//! Error type for `shard-store-sqlite`.

use shard_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A ledger rule rejected the write.
  #[error(transparent)]
  Core(#[from] shard_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column could not be decoded back into its domain type.
  #[error("corrupt column {column}: {reason}")]
  Decode { column: &'static str, reason: String },
}

impl StoreError for Error {
  fn into_domain(self) -> Result<shard_core::Error, Self> {
    match self {
      Error::Core(e) => Ok(e),
      other => Err(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
