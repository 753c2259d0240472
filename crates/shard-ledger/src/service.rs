//! [`Ledger`]: the fraction ledger and sell-proposal services.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use shard_core::{
  Error as Rule,
  address::{Address, TxHash},
  audit::Transaction,
  chain::{ChainCall, ChainGateway, Receipt, TxStatus},
  fraction::{Fraction, SellProposal, SupplySummary},
  operation::{ChainOperation, Confirmation, Mutation, NewOperation, OperationStatus, Outcome},
  property::{NewProperty, Property, PropertyStatus},
  store::{LedgerStore, Page, Paginated, ProposalFilter, StoreError as _, TransactionFilter},
  wallet::Wallet,
};
use tokio::time::{Instant, sleep};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
  BurnRequest, BuyRequest, Error, MintRequest, ProposalRequest, RegisterProperty,
  Result, TransferRequest, UnlockRequest, locks::PropertyLocks,
};

/// How long a request waits for its transaction to confirm.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
  pub timeout:       Duration,
  pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
  fn default() -> Self {
    Self {
      timeout:       Duration::from_secs(30),
      poll_interval: Duration::from_millis(500),
    }
  }
}

/// A ledger change together with the transaction that authorised it.
#[derive(Debug, Clone, Serialize)]
pub struct Settled<T> {
  pub value:        T,
  pub operation_id: Uuid,
  pub tx_hash:      TxHash,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  pub applied:  usize,
  pub failed:   usize,
  pub diverged: usize,
  pub pending:  usize,
}

/// The shard ledger service over a store `S` and a chain gateway `G`.
pub struct Ledger<S, G> {
  store:  Arc<S>,
  chain:  Arc<G>,
  locks:  PropertyLocks,
  policy: ConfirmPolicy,
}

impl<S, G> Ledger<S, G>
where
  S: LedgerStore,
  G: ChainGateway,
{
  pub fn new(store: Arc<S>, chain: Arc<G>, policy: ConfirmPolicy) -> Self {
    Self { store, chain, locks: PropertyLocks::default(), policy }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn chain(&self) -> &G { &self.chain }

  // ── Wallets ───────────────────────────────────────────────────────────────

  #[instrument(skip(self))]
  pub async fn connect_wallet(&self, user_id: &str, address: Address) -> Result<Wallet> {
    if user_id.trim().is_empty() {
      return Err(Rule::EmptyField("user_id").into());
    }
    let wallet = self
      .store
      .connect_wallet(user_id.to_owned(), address)
      .await
      .map_err(Error::from_store)?;
    info!(wallet_id = %wallet.wallet_id, address = %wallet.address, "wallet connected");
    Ok(wallet)
  }

  pub async fn wallets_of(&self, user_id: &str) -> Result<Vec<Wallet>> {
    self.store.list_wallets(user_id).await.map_err(Error::from_store)
  }

  /// The wallet registered at `address`.
  pub async fn wallet(&self, address: &Address) -> Result<Wallet> {
    self
      .store
      .find_wallet(address)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::WalletNotFound(address.to_string()).into())
  }

  /// Holdings of the wallet registered at `address`.
  pub async fn holdings(&self, address: &Address) -> Result<Vec<Fraction>> {
    let wallet = self.wallet(address).await?;
    self
      .store
      .list_holdings(wallet.wallet_id)
      .await
      .map_err(Error::from_store)
  }

  // ── Properties ────────────────────────────────────────────────────────────

  /// Record a property and register it with the contract. The property is
  /// `Verified` once the registration confirms.
  #[instrument(skip(self, input), fields(title = %input.title))]
  pub async fn register_property(
    &self,
    owner_id: &str,
    input: RegisterProperty,
  ) -> Result<Settled<Property>> {
    if input.title.trim().is_empty() {
      return Err(Rule::EmptyField("title").into());
    }
    let property = self
      .store
      .insert_pending_property(NewProperty {
        title:       input.title,
        description: input.description,
        valuation:   input.valuation,
        nft_address: input.nft_address.clone(),
        image_url:   input.image_url,
        owner_id:    owner_id.to_owned(),
      })
      .await
      .map_err(Error::from_store)?;

    let _guard = self.locks.lock(property.property_id).await;
    let call = ChainCall::CreateProperty {
      nft_address:  input.nft_address,
      metadata_uri: format!("urn:shardhold:property:{}", property.property_id),
    };
    let mutation = Mutation::RegisterProperty { property_id: property.property_id };

    let Settled { value, operation_id, tx_hash } =
      self.settle(property.property_id, call, mutation).await?;
    match value {
      Outcome::PropertyRegistered(p) => {
        info!(property_id = %p.property_id, token_id = ?p.token_id, "property registered");
        Ok(Settled { value: p, operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  pub async fn get_property(&self, property_id: Uuid) -> Result<Property> {
    self
      .store
      .get_property(property_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::PropertyNotFound(property_id).into())
  }

  pub async fn list_properties(&self, page: Page) -> Result<Paginated<Property>> {
    self.store.list_properties(page).await.map_err(Error::from_store)
  }

  pub async fn fractions_of(&self, property_id: Uuid) -> Result<Vec<Fraction>> {
    self.get_property(property_id).await?;
    self
      .store
      .list_fractions(property_id)
      .await
      .map_err(Error::from_store)
  }

  pub async fn supply(&self, property_id: Uuid) -> Result<SupplySummary> {
    self
      .store
      .supply_summary(property_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::PropertyNotFound(property_id).into())
  }

  // ── Fractions ─────────────────────────────────────────────────────────────

  pub async fn get_fraction(&self, fraction_id: Uuid) -> Result<Fraction> {
    self
      .store
      .get_fraction(fraction_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::FractionNotFound(fraction_id).into())
  }

  /// Fractionalise a verified property, crediting every shard to one wallet.
  #[instrument(skip(self))]
  pub async fn mint(&self, req: MintRequest) -> Result<Settled<Fraction>> {
    if req.quantity == 0 {
      return Err(Rule::InvalidQuantity.into());
    }
    let _guard = self.locks.lock(req.property_id).await;

    let property = self.get_property(req.property_id).await?;
    match property.status {
      PropertyStatus::Pending => return Err(Rule::PropertyNotVerified(req.property_id).into()),
      PropertyStatus::Fractionalised => {
        return Err(Rule::AlreadyFractionalised(req.property_id).into());
      }
      PropertyStatus::Verified => {}
    }
    if property.was_fractionalised() || !self.fractions_of(req.property_id).await?.is_empty() {
      return Err(Rule::AlreadyFractionalised(req.property_id).into());
    }
    let wallet = self.wallet(&req.to_address).await?;
    self.ensure_idle(req.property_id).await?;
    let token_id = property
      .token_id
      .ok_or(Rule::PropertyNotVerified(req.property_id))?;

    let call = ChainCall::MintFractions {
      token_id,
      to: req.to_address,
      amount: req.quantity,
    };
    let mutation = Mutation::Mint {
      property_id: req.property_id,
      wallet_id:   wallet.wallet_id,
      quantity:    req.quantity,
    };

    let Settled { value, operation_id, tx_hash } =
      self.settle(req.property_id, call, mutation).await?;
    match value {
      Outcome::Minted(fraction) => {
        info!(fraction_id = %fraction.fraction_id, supply = fraction.supply, "shards minted");
        Ok(Settled { value: fraction, operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  /// Destroy shards from one holding. Ledger-only: the contract exposes no
  /// burn call.
  #[instrument(skip(self))]
  pub async fn burn(&self, req: BurnRequest) -> Result<(Property, Option<Fraction>)> {
    if req.amount == 0 {
      return Err(Rule::InvalidQuantity.into());
    }
    let _guard = self.locks.lock(req.property_id).await;

    self.get_property(req.property_id).await?;
    let fraction = match &req.wallet_address {
      Some(address) => {
        let wallet = self.wallet(address).await?;
        self
          .store
          .find_holding(req.property_id, wallet.wallet_id)
          .await
          .map_err(Error::from_store)?
      }
      None => self.fractions_of(req.property_id).await?.into_iter().next(),
    }
    .ok_or(Rule::NoFractionForProperty(req.property_id))?;

    if req.amount > fraction.supply {
      return Err(
        Rule::BurnExceedsSupply { supply: fraction.supply, requested: req.amount }.into(),
      );
    }
    self.ensure_idle(req.property_id).await?;

    let mutation = Mutation::Burn {
      fraction_id:     fraction.fraction_id,
      amount:          req.amount,
      expected_supply: fraction.supply,
    };
    match self
      .store
      .apply(mutation, None)
      .await
      .map_err(Error::from_store)?
    {
      Outcome::Burned { property, remaining } => {
        info!(
          fraction_id = %fraction.fraction_id,
          amount = req.amount,
          shard_supply = property.shard_supply,
          "shards burned"
        );
        Ok((property, remaining))
      }
      other => Err(unexpected(&other)),
    }
  }

  /// Move shards between two wallets.
  #[instrument(skip(self))]
  pub async fn transfer(
    &self,
    req: TransferRequest,
  ) -> Result<Settled<(Option<Fraction>, Fraction)>> {
    if req.amount == 0 {
      return Err(Rule::InvalidQuantity.into());
    }
    if req.from_address == req.to_address {
      return Err(Rule::SelfTransfer.into());
    }

    let property_id = self.get_fraction(req.fraction_id).await?.property_id;
    let _guard = self.locks.lock(property_id).await;

    // Re-read under the lock: a concurrent request may have moved or
    // emptied the holding.
    let fraction = self
      .store
      .get_fraction(req.fraction_id)
      .await
      .map_err(Error::from_store)?
      .ok_or(Rule::InsufficientSupply { available: 0, requested: req.amount })?;
    let sender = self.wallet(&req.from_address).await?;
    if fraction.wallet_id != sender.wallet_id {
      return Err(
        Rule::NotOwner {
          fraction_id: fraction.fraction_id,
          address:     req.from_address.to_string(),
        }
        .into(),
      );
    }
    let receiver = self.wallet(&req.to_address).await?;
    if req.amount > fraction.supply {
      return Err(
        Rule::InsufficientSupply { available: fraction.supply, requested: req.amount }
          .into(),
      );
    }
    self.ensure_idle(property_id).await?;

    let call = ChainCall::SafeTransferFrom {
      from:     req.from_address,
      to:       req.to_address,
      token_id: fraction.token_id.clone(),
      amount:   req.amount,
      data:     "0x".into(),
    };
    let mutation = Mutation::Transfer {
      fraction_id:     fraction.fraction_id,
      to_wallet:       receiver.wallet_id,
      amount:          req.amount,
      expected_supply: fraction.supply,
      kind:            req.kind.into(),
    };

    let Settled { value, operation_id, tx_hash } =
      self.settle(property_id, call, mutation).await?;
    match value {
      Outcome::Transferred { sender, receiver } => {
        info!(
          fraction_id = %fraction.fraction_id,
          amount = req.amount,
          receiver = %receiver.fraction_id,
          "shards transferred"
        );
        Ok(Settled { value: (sender, receiver), operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  /// Reconsolidate a property held entirely by one wallet.
  #[instrument(skip(self))]
  pub async fn unlock(&self, req: UnlockRequest) -> Result<Settled<Property>> {
    let _guard = self.locks.lock(req.property_id).await;

    let property = self.get_property(req.property_id).await?;
    if !property.is_fractionalised() {
      return Err(Rule::NotFractionalised(req.property_id).into());
    }
    let holdings = self.fractions_of(req.property_id).await?;
    let [holder] = holdings.as_slice() else {
      return Err(
        Rule::CannotUnlock { property_id: req.property_id, holders: holdings.len() }.into(),
      );
    };
    let wallet = self.wallet(&req.wallet_address).await?;
    if holder.wallet_id != wallet.wallet_id {
      return Err(
        Rule::UnlockHolderMismatch {
          property_id: req.property_id,
          address:     req.wallet_address.to_string(),
        }
        .into(),
      );
    }
    let supply = self.supply(req.property_id).await?;
    if supply.open_proposals > 0 {
      return Err(
        Rule::EscrowOpen {
          property_id: req.property_id,
          proposals:   supply.open_proposals,
        }
        .into(),
      );
    }
    self.ensure_idle(req.property_id).await?;
    let token_id = property
      .token_id
      .ok_or(Rule::PropertyNotVerified(req.property_id))?;

    let call = ChainCall::UnlockProperty { token_id };
    let mutation = Mutation::Unlock {
      property_id: req.property_id,
      wallet_id:   wallet.wallet_id,
    };

    let Settled { value, operation_id, tx_hash } =
      self.settle(req.property_id, call, mutation).await?;
    match value {
      Outcome::Unlocked(p) => {
        info!(property_id = %p.property_id, "property unlocked");
        Ok(Settled { value: p, operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  // ── Sell proposals ────────────────────────────────────────────────────────

  /// Escrow shards from the seller's holding into a new sell proposal.
  #[instrument(skip(self))]
  pub async fn create_sell_proposal(
    &self,
    req: ProposalRequest,
  ) -> Result<Settled<SellProposal>> {
    if req.shards_for_sale == 0 {
      return Err(Rule::InvalidQuantity.into());
    }
    if req.price_per_shard.is_zero() {
      return Err(Rule::InvalidPrice.into());
    }

    let property_id = self.get_fraction(req.fraction_id).await?.property_id;
    let _guard = self.locks.lock(property_id).await;

    let fraction = self
      .store
      .get_fraction(req.fraction_id)
      .await
      .map_err(Error::from_store)?
      .ok_or(Rule::Oversell { available: 0, requested: req.shards_for_sale })?;
    let seller = self.wallet(&req.wallet_address).await?;
    if fraction.wallet_id != seller.wallet_id {
      return Err(
        Rule::NotOwner {
          fraction_id: fraction.fraction_id,
          address:     req.wallet_address.to_string(),
        }
        .into(),
      );
    }
    if req.shards_for_sale > fraction.supply {
      return Err(
        Rule::Oversell { available: fraction.supply, requested: req.shards_for_sale }
          .into(),
      );
    }
    self.ensure_idle(property_id).await?;
    let property_token = self
      .get_property(property_id)
      .await?
      .token_id
      .ok_or(Rule::PropertyNotVerified(property_id))?;

    let call = ChainCall::CreateSellProposal {
      seller: req.wallet_address,
      property_token,
      fraction_token: fraction.token_id.clone(),
      amount: req.shards_for_sale,
      price_wei: req.price_per_shard,
    };
    let mutation = Mutation::OpenProposal {
      fraction_id:     fraction.fraction_id,
      shards_for_sale: req.shards_for_sale,
      price_per_shard: req.price_per_shard,
      expected_supply: fraction.supply,
    };

    let Settled { value, operation_id, tx_hash } =
      self.settle(property_id, call, mutation).await?;
    match value {
      Outcome::ProposalOpened { proposal, .. } => {
        info!(
          proposal_id = %proposal.proposal_id,
          shards = proposal.shards_for_sale,
          price = %proposal.price_per_shard,
          "sell proposal opened"
        );
        Ok(Settled { value: proposal, operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  /// Buy `quantity` shards out of an open proposal.
  #[instrument(skip(self))]
  pub async fn buy_sell_proposal(
    &self,
    req: BuyRequest,
  ) -> Result<Settled<(SellProposal, Fraction)>> {
    if req.quantity == 0 {
      return Err(Rule::InvalidQuantity.into());
    }

    let property_id = self.get_proposal(req.proposal_id).await?.property_id;
    let _guard = self.locks.lock(property_id).await;

    let proposal = self.get_proposal(req.proposal_id).await?;
    if proposal.executed {
      return Err(Rule::ProposalExecuted(proposal.proposal_id).into());
    }
    let buyer = self.wallet(&req.buyer_address).await?;
    if buyer.wallet_id == proposal.wallet_id {
      return Err(Rule::SelfTransfer.into());
    }
    if req.quantity > proposal.remaining {
      return Err(
        Rule::InsufficientRemaining {
          remaining: proposal.remaining,
          requested: req.quantity,
        }
        .into(),
      );
    }
    let total = proposal
      .price_per_shard
      .checked_mul_quantity(req.quantity)
      .ok_or(Rule::Overflow)?;
    self.ensure_idle(property_id).await?;
    let proposal_ref = proposal
      .chain_proposal_id
      .clone()
      .ok_or(Rule::MissingChainOutput("proposal id"))?;

    let call = ChainCall::BuySellProposal {
      buyer: req.buyer_address,
      proposal_ref,
      quantity: req.quantity,
      value: total,
    };
    let mutation = Mutation::FillProposal {
      proposal_id:        proposal.proposal_id,
      buyer_wallet:       buyer.wallet_id,
      quantity:           req.quantity,
      expected_remaining: proposal.remaining,
    };

    let Settled { value, operation_id, tx_hash } =
      self.settle(property_id, call, mutation).await?;
    match value {
      Outcome::ProposalFilled { proposal, buyer } => {
        info!(
          proposal_id = %proposal.proposal_id,
          quantity = req.quantity,
          total = %total,
          remaining = proposal.remaining,
          "sell proposal filled"
        );
        Ok(Settled { value: (proposal, buyer), operation_id, tx_hash })
      }
      other => Err(unexpected(&other)),
    }
  }

  pub async fn get_proposal(&self, proposal_id: Uuid) -> Result<SellProposal> {
    self
      .store
      .get_proposal(proposal_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::ProposalNotFound(proposal_id).into())
  }

  pub async fn list_sell_proposals(
    &self,
    filter: ProposalFilter,
    page: Page,
  ) -> Result<Paginated<SellProposal>> {
    self
      .store
      .list_proposals(filter, page)
      .await
      .map_err(Error::from_store)
  }

  // ── Audit trail and operations ────────────────────────────────────────────

  pub async fn transactions(
    &self,
    filter: TransactionFilter,
    page: Page,
  ) -> Result<Paginated<Transaction>> {
    self
      .store
      .list_transactions(filter, page)
      .await
      .map_err(Error::from_store)
  }

  pub async fn get_operation(&self, operation_id: Uuid) -> Result<ChainOperation> {
    self
      .store
      .get_operation(operation_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| Rule::OperationNotFound(operation_id).into())
  }

  /// Advance every operation left open by an earlier timeout or crash.
  ///
  /// Operations still pending on-chain are left for the next pass.
  #[instrument(skip(self))]
  pub async fn reconcile_pending(&self) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let open = self
      .store
      .unsettled_operations()
      .await
      .map_err(Error::from_store)?;

    for op in open {
      let _guard = self.locks.lock(op.property_id).await;
      // Another task may have settled it while we waited for the lock.
      let Some(op) = self
        .store
        .get_operation(op.operation_id)
        .await
        .map_err(Error::from_store)?
      else {
        continue;
      };

      match (op.status, op.tx_hash.clone()) {
        (OperationStatus::Preparing, _) | (OperationStatus::Submitted, None) => {
          error!(
            target: "reconciliation",
            operation_id = %op.operation_id,
            method = op.call.method(),
            "operation has no recorded submission and may have been broadcast, marking failed for review"
          );
          self
            .store
            .mark_failed(op.operation_id, "no transaction hash recorded".into())
            .await
            .map_err(Error::from_store)?;
          report.failed += 1;
        }
        (OperationStatus::Submitted, Some(tx_hash)) => {
          let status = match self.chain.status(&tx_hash).await {
            Ok(status) => status,
            Err(e) => {
              warn!(operation_id = %op.operation_id, error = %e, "status poll failed");
              report.pending += 1;
              continue;
            }
          };
          match status {
            TxStatus::Pending => report.pending += 1,
            TxStatus::Reverted { reason } => {
              self.fail(op.operation_id, &tx_hash, reason).await?;
              report.failed += 1;
            }
            TxStatus::Confirmed(receipt) => {
              match self.apply_confirmed(op.operation_id, op.mutation, receipt).await {
                Ok(_) => report.applied += 1,
                Err(Error::Reconciliation { .. }) => report.diverged += 1,
                Err(e) => return Err(e),
              }
            }
          }
        }
        _ => {}
      }
    }

    if report != ReconcileReport::default() {
      info!(?report, "reconciliation pass finished");
    }
    Ok(report)
  }

  // ── Two-phase protocol ────────────────────────────────────────────────────

  async fn ensure_idle(&self, property_id: Uuid) -> Result<()> {
    let open = self
      .store
      .open_operations(property_id)
      .await
      .map_err(Error::from_store)?;
    if open > 0 {
      return Err(Rule::OperationPending(property_id).into());
    }
    Ok(())
  }

  /// Record, submit, confirm and apply one chain-backed mutation. The caller
  /// holds the property lock.
  async fn settle(
    &self,
    property_id: Uuid,
    call: ChainCall,
    mutation: Mutation,
  ) -> Result<Settled<Outcome>> {
    let op = self
      .store
      .begin_operation(NewOperation {
        property_id,
        call: call.clone(),
        mutation: mutation.clone(),
      })
      .await
      .map_err(Error::from_store)?;
    let operation_id = op.operation_id;

    let tx_hash = match self.chain.submit(call).await {
      Ok(hash) => hash,
      Err(e) => {
        warn!(%operation_id, error = %e, "chain submission failed");
        self
          .store
          .mark_failed(operation_id, e.to_string())
          .await
          .map_err(Error::from_store)?;
        return Err(Error::from_chain(e));
      }
    };

    if let Err(e) = self.store.mark_submitted(operation_id, tx_hash.clone()).await {
      let reason = format!("could not record submission: {e}");
      error!(target: "reconciliation", %operation_id, %tx_hash, %reason, "submission not recorded");
      return Err(Error::Reconciliation { operation_id, tx_hash, reason });
    }

    let receipt = self.await_receipt(operation_id, &tx_hash).await?;
    let value = self.apply_confirmed(operation_id, mutation, receipt).await?;
    Ok(Settled { value, operation_id, tx_hash })
  }

  /// Poll until the transaction confirms, reverts, or the wait runs out.
  async fn await_receipt(&self, operation_id: Uuid, tx_hash: &TxHash) -> Result<Receipt> {
    let deadline = Instant::now() + self.policy.timeout;
    loop {
      match self.chain.status(tx_hash).await {
        Ok(TxStatus::Confirmed(receipt)) => return Ok(receipt),
        Ok(TxStatus::Reverted { reason }) => {
          return Err(self.fail(operation_id, tx_hash, reason).await?);
        }
        Ok(TxStatus::Pending) => {}
        Err(e) => warn!(%operation_id, %tx_hash, error = %e, "status poll failed"),
      }
      if Instant::now() >= deadline {
        warn!(%operation_id, %tx_hash, "confirmation timed out, leaving operation open");
        return Err(Error::Pending { operation_id, tx_hash: tx_hash.clone() });
      }
      sleep(self.policy.poll_interval).await;
    }
  }

  /// Mark a reverted operation failed and build the error to report.
  async fn fail(&self, operation_id: Uuid, tx_hash: &TxHash, reason: String) -> Result<Error> {
    warn!(%operation_id, %tx_hash, %reason, "transaction reverted");
    self
      .store
      .mark_failed(operation_id, reason.clone())
      .await
      .map_err(Error::from_store)?;
    Ok(Error::Reverted { operation_id, tx_hash: tx_hash.clone(), reason })
  }

  /// Mirror a confirmed transaction into the store. Failure here is never
  /// retried: the operation is marked diverged for an operator.
  async fn apply_confirmed(
    &self,
    operation_id: Uuid,
    mutation: Mutation,
    receipt: Receipt,
  ) -> Result<Outcome> {
    let tx_hash = receipt.tx_hash.clone();
    let confirmation = Confirmation { operation_id, receipt };

    let err = match self.store.apply(mutation, Some(confirmation)).await {
      Ok(outcome) => return Ok(outcome),
      Err(err) => err,
    };
    let reason = err.to_string();
    if let Ok(rule @ Rule::AlreadyApplied(_)) = err.into_domain() {
      return Err(rule.into());
    }

    error!(
      target: "reconciliation",
      %operation_id,
      %tx_hash,
      %reason,
      "chain confirmed but ledger write failed"
    );
    if let Err(e) = self.store.mark_diverged(operation_id, reason.clone()).await {
      error!(target: "reconciliation", %operation_id, error = %e, "could not mark operation diverged");
    }
    Err(Error::Reconciliation { operation_id, tx_hash, reason })
  }
}

fn unexpected(outcome: &Outcome) -> Error {
  Error::Store(format!("store returned an unexpected outcome: {outcome:?}").into())
}
