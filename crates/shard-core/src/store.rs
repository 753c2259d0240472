//! The `LedgerStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `shard-store-sqlite`).
//! The ledger service depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  address::Address,
  audit::Transaction,
  fraction::{Fraction, SellProposal, SupplySummary},
  operation::{ChainOperation, Confirmation, Mutation, NewOperation, Outcome},
  property::{NewProperty, Property},
  wallet::Wallet,
};

// ─── Pagination ──────────────────────────────────────────────────────────────

pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-based offset page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  pub page:  u32,
  pub limit: u32,
}

impl Page {
  pub fn new(page: u32, limit: u32) -> Result<Self> {
    if page == 0 {
      return Err(Error::InvalidPage("page starts at 1".into()));
    }
    if limit == 0 || limit > MAX_PAGE_SIZE {
      return Err(Error::InvalidPage(format!(
        "limit must be between 1 and {MAX_PAGE_SIZE}"
      )));
    }
    Ok(Self { page, limit })
  }

  /// Rows to skip: `(page - 1) × limit`.
  pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for Page {
  fn default() -> Self { Self { page: 1, limit: 10 } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub page:          u32,
  pub limit:         u32,
  pub total:         u64,
  pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub items:      Vec<T>,
  pub pagination: Pagination,
}

impl<T> Paginated<T> {
  pub fn new(items: Vec<T>, page: Page, total: u64) -> Self {
    Self {
      items,
      pagination: Pagination {
        page:          page.page,
        limit:         page.limit,
        total,
        has_next_page: u64::from(page.page) * u64::from(page.limit) < total,
      },
    }
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Parameters for [`LedgerStore::list_proposals`].
#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
  pub property_id: Option<Uuid>,
  /// Only proposals that still have shards for sale.
  pub open_only:   bool,
}

/// Parameters for [`LedgerStore::list_transactions`].
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
  pub wallet_id:   Option<Uuid>,
  pub property_id: Option<Uuid>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Error type of a [`LedgerStore`] backend.
///
/// A write can fail because it would break a ledger rule (a stale fraction,
/// an already-applied operation) or because the backend itself failed; the
/// service needs to tell the two apart.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// Returns the ledger rule that was violated, or gives the error back if it
  /// was a backend failure.
  fn into_domain(self) -> Result<Error, Self>
  where
    Self: Sized;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a shard ledger backend.
///
/// Reads are plain lookups. Every change to shard ownership goes through
/// [`LedgerStore::apply`], which performs the whole change in one atomic unit
/// and re-validates against the rows it touches.
pub trait LedgerStore: Send + Sync {
  type Error: StoreError;

  // ── Wallets ───────────────────────────────────────────────────────────

  /// Register `address` for `user_id`, or return the existing wallet if the
  /// user already connected it. Fails with [`Error::WalletClaimed`] if the
  /// address belongs to another user.
  fn connect_wallet(
    &self,
    user_id: String,
    address: Address,
  ) -> impl Future<Output = Result<Wallet, Self::Error>> + Send + '_;

  fn find_wallet<'a>(
    &'a self,
    address: &'a Address,
  ) -> impl Future<Output = Result<Option<Wallet>, Self::Error>> + Send + 'a;

  fn list_wallets<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Wallet>, Self::Error>> + Send + 'a;

  // ── Properties ────────────────────────────────────────────────────────

  /// Persist a property in `Pending` status ahead of its on-chain
  /// registration.
  fn insert_pending_property(
    &self,
    input: NewProperty,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  fn get_property(
    &self,
    property_id: Uuid,
  ) -> impl Future<Output = Result<Option<Property>, Self::Error>> + Send + '_;

  fn list_properties(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Paginated<Property>, Self::Error>> + Send + '_;

  // ── Fractions ─────────────────────────────────────────────────────────

  fn get_fraction(
    &self,
    fraction_id: Uuid,
  ) -> impl Future<Output = Result<Option<Fraction>, Self::Error>> + Send + '_;

  /// All holdings of a property, oldest first.
  fn list_fractions(
    &self,
    property_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Fraction>, Self::Error>> + Send + '_;

  /// All holdings of a wallet, oldest first.
  fn list_holdings(
    &self,
    wallet_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Fraction>, Self::Error>> + Send + '_;

  fn find_holding(
    &self,
    property_id: Uuid,
    wallet_id: Uuid,
  ) -> impl Future<Output = Result<Option<Fraction>, Self::Error>> + Send + '_;

  /// Returns `None` if the property does not exist.
  fn supply_summary(
    &self,
    property_id: Uuid,
  ) -> impl Future<Output = Result<Option<SupplySummary>, Self::Error>> + Send + '_;

  // ── Sell proposals ────────────────────────────────────────────────────

  fn get_proposal(
    &self,
    proposal_id: Uuid,
  ) -> impl Future<Output = Result<Option<SellProposal>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_proposals(
    &self,
    filter: ProposalFilter,
    page: Page,
  ) -> impl Future<Output = Result<Paginated<SellProposal>, Self::Error>> + Send + '_;

  // ── Audit trail ───────────────────────────────────────────────────────

  /// Newest first.
  fn list_transactions(
    &self,
    filter: TransactionFilter,
    page: Page,
  ) -> impl Future<Output = Result<Paginated<Transaction>, Self::Error>> + Send + '_;

  // ── Chain operations ──────────────────────────────────────────────────

  /// Record an operation in `Preparing` status.
  fn begin_operation(
    &self,
    input: NewOperation,
  ) -> impl Future<Output = Result<ChainOperation, Self::Error>> + Send + '_;

  /// `Preparing → Submitted`, storing the hash. Hashes are unique across all
  /// operations.
  fn mark_submitted(
    &self,
    operation_id: Uuid,
    tx_hash: crate::address::TxHash,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Settle an unapplied operation as `Failed`.
  fn mark_failed(
    &self,
    operation_id: Uuid,
    detail: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Settle an unapplied operation as `Diverged`.
  fn mark_diverged(
    &self,
    operation_id: Uuid,
    detail: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_operation(
    &self,
    operation_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChainOperation>, Self::Error>> + Send + '_;

  /// Operations in `Preparing` or `Submitted` status, oldest first.
  fn unsettled_operations(
    &self,
  ) -> impl Future<Output = Result<Vec<ChainOperation>, Self::Error>> + Send + '_;

  /// Number of unsettled operations touching `property_id`.
  fn open_operations(
    &self,
    property_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Mutation ──────────────────────────────────────────────────────────

  /// Apply `mutation` and its audit records as one atomic unit.
  ///
  /// With a `confirmation`, the referenced operation must be `Submitted`; it
  /// is flipped to `Applied` in the same unit, so a confirmed transaction can
  /// never be mirrored twice. Without one, the mutation is ledger-only.
  fn apply(
    &self,
    mutation: Mutation,
    confirmation: Option<Confirmation>,
  ) -> impl Future<Output = Result<Outcome, Self::Error>> + Send + '_;
}
