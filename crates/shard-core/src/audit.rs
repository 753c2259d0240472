//! Append-only audit trail of shard movements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{address::TxHash, amount::Amount};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
  Fractionalise,
  Sell,
  Buy,
  Transfer,
  Burn,
  Unlock,
}

/// A single ledger movement. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
  pub transaction_id: Uuid,
  /// The wallet the movement is keyed to (sender for transfers, buyer for
  /// buys).
  pub wallet_id:      Uuid,
  pub property_id:    Uuid,
  pub fraction_id:    Option<Uuid>,
  pub kind:           TransactionKind,
  /// Number of shards moved.
  pub amount:         u64,
  /// Total price paid, for purchases.
  pub value:          Option<Amount>,
  /// Hash of the confirming chain transaction; absent for ledger-only moves.
  pub tx_hash:        Option<TxHash>,
  pub created_at:     DateTime<Utc>,
}
