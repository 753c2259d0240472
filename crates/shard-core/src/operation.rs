//! Chain operations and the ledger mutations they settle.
//!
//! Every chain-backed change to the ledger is recorded as a
//! [`ChainOperation`] *before* the call is submitted. The operation carries the
//! [`Mutation`] that must be applied once the chain confirms, so a process that
//! crashes mid-flight can pick the work back up by polling the recorded hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  address::TxHash,
  amount::Amount,
  audit::TransactionKind,
  chain::{ChainCall, Receipt},
  fraction::{Fraction, SellProposal},
  property::Property,
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
  /// Recorded, not yet handed to the gateway (or the hash was never stored).
  Preparing,
  /// Broadcast; the hash is known but the outcome is not.
  Submitted,
  /// Confirmed on-chain and mirrored into the ledger.
  Applied,
  /// Rejected by the gateway or reverted on-chain. No ledger change.
  Failed,
  /// Confirmed on-chain but the ledger write failed. Needs an operator.
  Diverged,
}

impl OperationStatus {
  /// `true` once nothing further will happen to the operation automatically.
  pub fn is_settled(self) -> bool {
    matches!(self, Self::Applied | Self::Failed | Self::Diverged)
  }
}

// ─── Mutation ────────────────────────────────────────────────────────────────

/// A ledger change, described with resolved internal ids.
///
/// `expected_*` fields carry the value read when preconditions were checked;
/// the store only applies the change if the row still holds that value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
  RegisterProperty {
    property_id: Uuid,
  },
  Mint {
    property_id: Uuid,
    wallet_id:   Uuid,
    quantity:    u64,
  },
  Burn {
    fraction_id:     Uuid,
    amount:          u64,
    expected_supply: u64,
  },
  Transfer {
    fraction_id:     Uuid,
    to_wallet:       Uuid,
    amount:          u64,
    expected_supply: u64,
    kind:            TransactionKind,
  },
  Unlock {
    property_id: Uuid,
    wallet_id:   Uuid,
  },
  OpenProposal {
    fraction_id:     Uuid,
    shards_for_sale: u64,
    price_per_shard: Amount,
    expected_supply: u64,
  },
  FillProposal {
    proposal_id:        Uuid,
    buyer_wallet:       Uuid,
    quantity:           u64,
    expected_remaining: u64,
  },
}

/// The rows a successfully applied [`Mutation`] produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
  PropertyRegistered(Property),
  Minted(Fraction),
  Burned {
    property:  Property,
    /// `None` when the holding was burned in full and deleted.
    remaining: Option<Fraction>,
  },
  Transferred {
    /// `None` when the sender's holding reached zero and was deleted.
    sender:   Option<Fraction>,
    receiver: Fraction,
  },
  Unlocked(Property),
  ProposalOpened {
    proposal: SellProposal,
    seller:   Option<Fraction>,
  },
  ProposalFilled {
    proposal: SellProposal,
    buyer:    Fraction,
  },
}

// ─── Operation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOperation {
  pub operation_id: Uuid,
  pub property_id:  Uuid,
  pub status:       OperationStatus,
  pub tx_hash:      Option<TxHash>,
  pub call:         ChainCall,
  pub mutation:     Mutation,
  pub block_number: Option<u64>,
  /// Failure or divergence reason.
  pub detail:       Option<String>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Input to [`crate::store::LedgerStore::begin_operation`].
#[derive(Debug, Clone)]
pub struct NewOperation {
  pub property_id: Uuid,
  pub call:        ChainCall,
  pub mutation:    Mutation,
}

/// Ties a mutation to the confirmed chain transaction that authorises it.
#[derive(Debug, Clone)]
pub struct Confirmation {
  pub operation_id: Uuid,
  pub receipt:      Receipt,
}
