//! The `ChainGateway` trait: the contract the ledger settles against.
//!
//! Submitting a call and learning its fate are two separate steps: a call is
//! first *submitted* (yielding a transaction hash) and later observed as
//! confirmed or reverted. A caller that stops waiting has not cancelled
//! anything; the transaction may still confirm.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  address::{Address, TxHash},
  amount::Amount,
};

// ─── Calls ───────────────────────────────────────────────────────────────────

/// A contract method invocation. Serialised as
/// `{"method": "<camelCase name>", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum ChainCall {
  CreateProperty {
    nft_address:  Address,
    metadata_uri: String,
  },
  MintFractions {
    token_id: String,
    to:       Address,
    amount:   u64,
  },
  SafeTransferFrom {
    from:     Address,
    to:       Address,
    token_id: String,
    amount:   u64,
    /// Opaque calldata forwarded to the receiver hook; `0x` when unused.
    data:     String,
  },
  CreateSellProposal {
    /// Account whose shards are escrowed by the listing.
    seller:         Address,
    property_token: String,
    fraction_token: String,
    amount:         u64,
    price_wei:      Amount,
  },
  BuySellProposal {
    /// Account the bought shards are delivered to.
    buyer:        Address,
    proposal_ref: String,
    quantity:     u64,
    /// Payment attached to the call.
    value:        Amount,
  },
  UnlockProperty {
    token_id: String,
  },
}

impl ChainCall {
  /// Contract method name, as used on the wire and in the operation log.
  pub fn method(&self) -> &'static str {
    match self {
      Self::CreateProperty { .. } => "createProperty",
      Self::MintFractions { .. } => "mintFractions",
      Self::SafeTransferFrom { .. } => "safeTransferFrom",
      Self::CreateSellProposal { .. } => "createSellProposal",
      Self::BuySellProposal { .. } => "buySellProposal",
      Self::UnlockProperty { .. } => "unlockProperty",
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Proof that a transaction was included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
  pub tx_hash:      TxHash,
  pub block_number: u64,
  /// Return value of the method, when it has one (the token id assigned by
  /// `createProperty`, the proposal id assigned by `createSellProposal`).
  pub output:       Option<String>,
}

/// What the chain currently says about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
  Pending,
  Confirmed(Receipt),
  Reverted { reason: String },
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the smart-contract connection.
///
/// Implementations are shared by every request and must be safe for
/// concurrent use; ordering of submissions from the signing account (nonce
/// management) is their responsibility.
pub trait ChainGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Sign and broadcast `call`, returning its transaction hash without
  /// waiting for inclusion.
  fn submit(
    &self,
    call: ChainCall,
  ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send + '_;

  /// Look up the current status of a previously submitted transaction.
  fn status<'a>(
    &'a self,
    tx_hash: &'a TxHash,
  ) -> impl Future<Output = Result<TxStatus, Self::Error>> + Send + 'a;
}
