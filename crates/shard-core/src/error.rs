//! Error types for `shard-core`.
//!
//! These are the domain rules of the shard ledger. Storage backends and the
//! ledger service wrap them; the API layer maps each [`ErrorKind`] to an HTTP
//! status.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  // ── Validation ────────────────────────────────────────────────────────────
  #[error("quantity must be greater than zero")]
  InvalidQuantity,

  #[error("invalid amount {0:?}: {1}")]
  InvalidAmount(String, &'static str),

  #[error("invalid address: {0:?}")]
  InvalidAddress(String),

  #[error("invalid transaction hash: {0:?}")]
  InvalidTxHash(String),

  #[error("price per shard must be greater than zero")]
  InvalidPrice,

  #[error("invalid page request: {0}")]
  InvalidPage(String),

  #[error("{0} must not be empty")]
  EmptyField(&'static str),

  #[error("cannot burn {requested} shards from a holding of {supply}")]
  BurnExceedsSupply { supply: u64, requested: u64 },

  #[error("sender and receiver are the same wallet")]
  SelfTransfer,

  #[error("amount overflow")]
  Overflow,

  // ── Not found ─────────────────────────────────────────────────────────────
  #[error("property not found: {0}")]
  PropertyNotFound(Uuid),

  #[error("wallet not found: {0}")]
  WalletNotFound(String),

  #[error("fraction not found: {0}")]
  FractionNotFound(Uuid),

  #[error("property {0} has no fractions")]
  NoFractionForProperty(Uuid),

  #[error("sell proposal not found: {0}")]
  ProposalNotFound(Uuid),

  #[error("operation not found: {0}")]
  OperationNotFound(Uuid),

  // ── Conflict ──────────────────────────────────────────────────────────────
  #[error("property {0} is already fractionalised")]
  AlreadyFractionalised(Uuid),

  #[error("property {0} is not fractionalised")]
  NotFractionalised(Uuid),

  #[error("property {0} is not verified on-chain")]
  PropertyNotVerified(Uuid),

  #[error("fraction {fraction_id} is not owned by {address}")]
  NotOwner { fraction_id: Uuid, address: String },

  #[error("insufficient supply: {available} available, {requested} requested")]
  InsufficientSupply { available: u64, requested: u64 },

  #[error("cannot offer {requested} shards for sale, only {available} held")]
  Oversell { available: u64, requested: u64 },

  #[error("cannot unlock property {property_id}: expected exactly 1 holder, found {holders}")]
  CannotUnlock { property_id: Uuid, holders: usize },

  #[error("cannot unlock property {property_id}: {address} is not the sole holder")]
  UnlockHolderMismatch { property_id: Uuid, address: String },

  #[error("cannot unlock property {property_id}: {proposals} open sell proposal(s) hold escrowed shards")]
  EscrowOpen { property_id: Uuid, proposals: usize },

  #[error("sell proposal {0} is already executed")]
  ProposalExecuted(Uuid),

  #[error("insufficient remaining shards: {remaining} remaining, {requested} requested")]
  InsufficientRemaining { remaining: u64, requested: u64 },

  #[error("fraction {0} changed underneath this write")]
  StaleFraction(Uuid),

  #[error("sell proposal {0} changed underneath this write")]
  StaleProposal(Uuid),

  #[error("property {0} has a chain operation awaiting confirmation")]
  OperationPending(Uuid),

  #[error("operation {0} was already applied to the ledger")]
  AlreadyApplied(Uuid),

  #[error("operation {0} does not allow this transition in its current state")]
  InvalidOperationState(Uuid),

  #[error("wallet {0} is registered to another user")]
  WalletClaimed(String),

  #[error("chain receipt is missing the {0}")]
  MissingChainOutput(&'static str),

  // ── Internal ──────────────────────────────────────────────────────────────
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for propagation and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  NotFound,
  Conflict,
  Forbidden,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidQuantity
      | Self::InvalidAmount(..)
      | Self::InvalidAddress(_)
      | Self::InvalidTxHash(_)
      | Self::InvalidPrice
      | Self::InvalidPage(_)
      | Self::EmptyField(_)
      | Self::BurnExceedsSupply { .. }
      | Self::SelfTransfer
      | Self::Overflow => ErrorKind::Validation,

      Self::PropertyNotFound(_)
      | Self::WalletNotFound(_)
      | Self::FractionNotFound(_)
      | Self::NoFractionForProperty(_)
      | Self::ProposalNotFound(_)
      | Self::OperationNotFound(_) => ErrorKind::NotFound,

      Self::NotOwner { .. } => ErrorKind::Forbidden,

      Self::MissingChainOutput(_) | Self::Serialization(_) => {
        ErrorKind::Internal
      }

      _ => ErrorKind::Conflict,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
