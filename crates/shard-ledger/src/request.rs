//! Inputs to the [`crate::Ledger`] operations.
//!
//! Holders are named by on-chain address here; the ledger resolves them to
//! wallets before anything is written.

use serde::{Deserialize, Serialize};
use shard_core::{address::Address, amount::Amount, audit::TransactionKind};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterProperty {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub valuation:   Amount,
  pub nft_address: Address,
  pub image_url:   Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintRequest {
  pub property_id: Uuid,
  pub to_address:  Address,
  pub quantity:    u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BurnRequest {
  pub property_id:    Uuid,
  pub amount:         u64,
  /// Burn from this holder; defaults to the earliest holding.
  pub wallet_address: Option<Address>,
}

/// How a direct transfer is labelled in the audit trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
  #[default]
  Transfer,
  Sell,
}

impl From<TransferKind> for TransactionKind {
  fn from(kind: TransferKind) -> Self {
    match kind {
      TransferKind::Transfer => TransactionKind::Transfer,
      TransferKind::Sell => TransactionKind::Sell,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
  pub fraction_id:  Uuid,
  pub from_address: Address,
  pub to_address:   Address,
  pub amount:       u64,
  #[serde(default)]
  pub kind:         TransferKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRequest {
  pub property_id:    Uuid,
  pub wallet_address: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRequest {
  pub wallet_address:  Address,
  pub fraction_id:     Uuid,
  pub shards_for_sale: u64,
  pub price_per_shard: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyRequest {
  pub buyer_address: Address,
  pub proposal_id:   Uuid,
  pub quantity:      u64,
}
