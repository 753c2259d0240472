//! Shard holdings and the escrowed sell proposals built on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;

// ─── Fraction ────────────────────────────────────────────────────────────────

/// One wallet's shard holding for one property.
///
/// At most one row exists per `(property_id, wallet_id)`, and `supply` is
/// always at least 1: a holding that drops to zero is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
  pub fraction_id: Uuid,
  pub property_id: Uuid,
  pub wallet_id:   Uuid,
  pub supply:      u64,
  pub token_id:    String,
  pub created_at:  DateTime<Utc>,
}

// ─── SellProposal ────────────────────────────────────────────────────────────

/// An open offer to sell shards at a fixed price per shard.
///
/// The offered shards leave the seller's fraction when the proposal opens and
/// sit in `remaining` until bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellProposal {
  pub proposal_id:       Uuid,
  pub property_id:       Uuid,
  /// The seller's fraction at the time the proposal opened. The row may since
  /// have been deleted if the seller offered their whole holding.
  pub fraction_id:       Uuid,
  pub wallet_id:         Uuid,
  pub shards_for_sale:   u64,
  pub remaining:         u64,
  pub price_per_shard:   Amount,
  pub executed:          bool,
  /// Identifier the contract assigned to the listing.
  pub chain_proposal_id: Option<String>,
  pub created_at:        DateTime<Utc>,
}

impl SellProposal {
  pub fn is_open(&self) -> bool { !self.executed && self.remaining > 0 }
}

// ─── Supply accounting ───────────────────────────────────────────────────────

/// Where a property's shards currently sit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplySummary {
  pub property_id:    Uuid,
  /// Minted minus burned, as recorded on the property.
  pub shard_supply:   u64,
  /// Sum of all fraction supplies.
  pub held:           u64,
  /// Sum of `remaining` over open sell proposals.
  pub escrowed:       u64,
  /// Number of fraction rows with positive supply.
  pub holders:        usize,
  pub open_proposals: usize,
}

impl SupplySummary {
  /// Every shard in existence is either held or escrowed, exactly once.
  pub fn is_balanced(&self) -> bool {
    self.held + self.escrowed == self.shard_supply
  }
}
