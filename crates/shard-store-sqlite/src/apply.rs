//! Synchronous mutation logic, run on the connection thread.
//!
//! [`run`] opens one `BEGIN IMMEDIATE` transaction per [`Mutation`]. Every
//! precondition is re-read inside it, and any error drops the transaction
//! uncommitted, so a mutation is either applied in full or not at all.

use chrono::Utc;
use rusqlite::{
  Connection, OptionalExtension as _, Transaction as SqlTx, TransactionBehavior,
  params,
};
use shard_core::{
  amount::Amount,
  audit::TransactionKind,
  chain::Receipt,
  fraction::{Fraction, SellProposal},
  operation::{Confirmation, Mutation, OperationStatus, Outcome},
  property::{Property, PropertyStatus},
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    FRACTION_COLUMNS, PROPERTY_COLUMNS, PROPOSAL_COLUMNS, RawFraction,
    RawProperty, RawProposal, encode_amount, encode_count,
    encode_dt, encode_uuid,
  },
};

type Domain = shard_core::Error;

/// Apply `mutation` atomically, claiming `confirmation`'s operation if given.
pub fn run(
  conn: &mut Connection,
  mutation: Mutation,
  confirmation: Option<Confirmation>,
) -> Result<Outcome> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let now = encode_dt(Utc::now());

  if let Some(c) = &confirmation {
    claim_operation(&tx, c)?;
  }

  let ctx = Ctx {
    tx:           &tx,
    now:          &now,
    confirmation: confirmation.as_ref(),
  };

  let outcome = match mutation {
    Mutation::RegisterProperty { property_id } => ctx.register(property_id)?,
    Mutation::Mint { property_id, wallet_id, quantity } => {
      ctx.mint(property_id, wallet_id, quantity)?
    }
    Mutation::Burn { fraction_id, amount, expected_supply } => {
      ctx.burn(fraction_id, amount, expected_supply)?
    }
    Mutation::Transfer { fraction_id, to_wallet, amount, expected_supply, kind } => {
      ctx.transfer(fraction_id, to_wallet, amount, expected_supply, kind)?
    }
    Mutation::Unlock { property_id, wallet_id } => {
      ctx.unlock(property_id, wallet_id)?
    }
    Mutation::OpenProposal {
      fraction_id,
      shards_for_sale,
      price_per_shard,
      expected_supply,
    } => ctx.open_proposal(
      fraction_id,
      shards_for_sale,
      price_per_shard,
      expected_supply,
    )?,
    Mutation::FillProposal {
      proposal_id,
      buyer_wallet,
      quantity,
      expected_remaining,
    } => ctx.fill_proposal(proposal_id, buyer_wallet, quantity, expected_remaining)?,
  };

  if let Some(c) = &confirmation {
    finish_operation(&tx, c, &now)?;
  }

  tx.commit()?;
  Ok(outcome)
}

// ─── Operation bookkeeping ───────────────────────────────────────────────────

/// The operation must be `submitted` with the receipt's hash.
fn claim_operation(tx: &SqlTx<'_>, c: &Confirmation) -> Result<()> {
  let row: Option<(String, Option<String>)> = tx
    .query_row(
      "SELECT status, tx_hash FROM chain_operations WHERE operation_id = ?1",
      params![encode_uuid(c.operation_id)],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  let Some((status, hash)) = row else {
    return Err(Domain::OperationNotFound(c.operation_id).into());
  };

  if status == OperationStatus::Applied.to_string() {
    return Err(Domain::AlreadyApplied(c.operation_id).into());
  }
  if status != OperationStatus::Submitted.to_string()
    || hash.as_deref() != Some(c.receipt.tx_hash.as_str())
  {
    return Err(Domain::InvalidOperationState(c.operation_id).into());
  }
  Ok(())
}

fn finish_operation(tx: &SqlTx<'_>, c: &Confirmation, now: &str) -> Result<()> {
  let changed = tx.execute(
    "UPDATE chain_operations
        SET status = ?1, block_number = ?2, updated_at = ?3
      WHERE operation_id = ?4 AND status = ?5",
    params![
      OperationStatus::Applied.to_string(),
      encode_count(c.receipt.block_number)?,
      now,
      encode_uuid(c.operation_id),
      OperationStatus::Submitted.to_string(),
    ],
  )?;
  if changed != 1 {
    return Err(Domain::InvalidOperationState(c.operation_id).into());
  }
  Ok(())
}

// ─── Mutations ───────────────────────────────────────────────────────────────

struct Ctx<'a> {
  tx:           &'a SqlTx<'a>,
  now:          &'a str,
  confirmation: Option<&'a Confirmation>,
}

struct Audit {
  wallet_id:   Uuid,
  property_id: Uuid,
  fraction_id: Option<Uuid>,
  kind:        TransactionKind,
  amount:      u64,
  value:       Option<Amount>,
}

impl Ctx<'_> {
  fn receipt(&self) -> Option<&Receipt> { self.confirmation.map(|c| &c.receipt) }

  fn register(&self, property_id: Uuid) -> Result<Outcome> {
    let property = load_property(self.tx, property_id)?;
    let Some(confirmation) = self.confirmation else {
      return Err(Domain::MissingChainOutput("registration receipt").into());
    };
    if property.status != PropertyStatus::Pending {
      return Err(Domain::InvalidOperationState(confirmation.operation_id).into());
    }
    let token_id = confirmation
      .receipt
      .output
      .clone()
      .ok_or(Domain::MissingChainOutput("token id"))?;

    self.tx.execute(
      "UPDATE properties SET status = ?1, token_id = ?2
        WHERE property_id = ?3 AND status = ?4",
      params![
        PropertyStatus::Verified.to_string(),
        token_id,
        encode_uuid(property_id),
        PropertyStatus::Pending.to_string(),
      ],
    )?;

    Ok(Outcome::PropertyRegistered(load_property(self.tx, property_id)?))
  }

  fn mint(&self, property_id: Uuid, wallet_id: Uuid, quantity: u64) -> Result<Outcome> {
    if quantity == 0 {
      return Err(Domain::InvalidQuantity.into());
    }
    let property = load_property(self.tx, property_id)?;
    match property.status {
      PropertyStatus::Pending => {
        return Err(Domain::PropertyNotVerified(property_id).into());
      }
      PropertyStatus::Fractionalised => {
        return Err(Domain::AlreadyFractionalised(property_id).into());
      }
      PropertyStatus::Verified => {}
    }
    if property.was_fractionalised() || count_fractions(self.tx, property_id)? > 0 {
      return Err(Domain::AlreadyFractionalised(property_id).into());
    }
    require_wallet(self.tx, wallet_id)?;
    let token_id = property
      .token_id
      .ok_or(Domain::PropertyNotVerified(property_id))?;

    let changed = self.tx.execute(
      "UPDATE properties SET status = ?1, shard_supply = ?2, fractionalised_at = ?3
        WHERE property_id = ?4 AND status = ?5 AND fractionalised_at IS NULL",
      params![
        PropertyStatus::Fractionalised.to_string(),
        encode_count(quantity)?,
        self.now,
        encode_uuid(property_id),
        PropertyStatus::Verified.to_string(),
      ],
    )?;
    if changed != 1 {
      return Err(Domain::AlreadyFractionalised(property_id).into());
    }

    let fraction = self.credit(property_id, wallet_id, &token_id, quantity)?;
    self.record(Audit {
      wallet_id,
      property_id,
      fraction_id: Some(fraction.fraction_id),
      kind: TransactionKind::Fractionalise,
      amount: quantity,
      value: None,
    })?;
    Ok(Outcome::Minted(fraction))
  }

  fn burn(&self, fraction_id: Uuid, amount: u64, expected: u64) -> Result<Outcome> {
    if amount == 0 {
      return Err(Domain::InvalidQuantity.into());
    }
    let fraction = load_fraction(self.tx, fraction_id)?;
    if amount > fraction.supply {
      return Err(
        Domain::BurnExceedsSupply { supply: fraction.supply, requested: amount }
          .into(),
      );
    }
    let remaining = self.debit(&fraction, amount, expected)?;

    let property = load_property(self.tx, fraction.property_id)?;
    let supply = property
      .shard_supply
      .checked_sub(amount)
      .ok_or(Domain::Overflow)?;
    // Status stays FRACTIONALISED even at zero supply.
    self.tx.execute(
      "UPDATE properties SET shard_supply = ?1 WHERE property_id = ?2",
      params![encode_count(supply)?, encode_uuid(property.property_id)],
    )?;

    self.record(Audit {
      wallet_id:   fraction.wallet_id,
      property_id: fraction.property_id,
      fraction_id: Some(fraction.fraction_id),
      kind:        TransactionKind::Burn,
      amount,
      value:       None,
    })?;

    Ok(Outcome::Burned {
      property: load_property(self.tx, fraction.property_id)?,
      remaining,
    })
  }

  fn transfer(
    &self,
    fraction_id: Uuid,
    to_wallet: Uuid,
    amount: u64,
    expected: u64,
    kind: TransactionKind,
  ) -> Result<Outcome> {
    if amount == 0 {
      return Err(Domain::InvalidQuantity.into());
    }
    let fraction = load_fraction(self.tx, fraction_id)?;
    if fraction.wallet_id == to_wallet {
      return Err(Domain::SelfTransfer.into());
    }
    require_wallet(self.tx, to_wallet)?;
    if amount > fraction.supply {
      return Err(
        Domain::InsufficientSupply { available: fraction.supply, requested: amount }
          .into(),
      );
    }

    let sender = self.debit(&fraction, amount, expected)?;
    let receiver =
      self.credit(fraction.property_id, to_wallet, &fraction.token_id, amount)?;

    self.record(Audit {
      wallet_id:   fraction.wallet_id,
      property_id: fraction.property_id,
      fraction_id: Some(fraction.fraction_id),
      kind,
      amount,
      value:       None,
    })?;

    Ok(Outcome::Transferred { sender, receiver })
  }

  fn unlock(&self, property_id: Uuid, wallet_id: Uuid) -> Result<Outcome> {
    let property = load_property(self.tx, property_id)?;
    if !property.is_fractionalised() {
      return Err(Domain::NotFractionalised(property_id).into());
    }

    let holdings = fractions_of(self.tx, property_id)?;
    let [holder] = holdings.as_slice() else {
      return Err(
        Domain::CannotUnlock { property_id, holders: holdings.len() }.into(),
      );
    };
    if holder.wallet_id != wallet_id {
      let address = wallet_address(self.tx, wallet_id)?
        .unwrap_or_else(|| wallet_id.to_string());
      return Err(Domain::UnlockHolderMismatch { property_id, address }.into());
    }
    let proposals = count_open_proposals(self.tx, property_id)?;
    if proposals > 0 {
      return Err(Domain::EscrowOpen { property_id, proposals }.into());
    }

    let pid = encode_uuid(property_id);
    self
      .tx
      .execute("DELETE FROM fractions WHERE property_id = ?1", params![pid])?;
    self.tx.execute(
      "UPDATE properties SET status = ?1, shard_supply = 0 WHERE property_id = ?2",
      params![PropertyStatus::Verified.to_string(), pid],
    )?;

    self.record(Audit {
      wallet_id,
      property_id,
      fraction_id: Some(holder.fraction_id),
      kind: TransactionKind::Unlock,
      amount: holder.supply,
      value: None,
    })?;

    Ok(Outcome::Unlocked(load_property(self.tx, property_id)?))
  }

  fn open_proposal(
    &self,
    fraction_id: Uuid,
    shards_for_sale: u64,
    price_per_shard: Amount,
    expected: u64,
  ) -> Result<Outcome> {
    if shards_for_sale == 0 {
      return Err(Domain::InvalidQuantity.into());
    }
    if price_per_shard.is_zero() {
      return Err(Domain::InvalidPrice.into());
    }
    let fraction = load_fraction(self.tx, fraction_id)?;
    if shards_for_sale > fraction.supply {
      return Err(
        Domain::Oversell { available: fraction.supply, requested: shards_for_sale }
          .into(),
      );
    }
    let chain_proposal_id = match self.receipt() {
      Some(receipt) => Some(
        receipt
          .output
          .clone()
          .ok_or(Domain::MissingChainOutput("proposal id"))?,
      ),
      None => None,
    };

    let seller = self.debit(&fraction, shards_for_sale, expected)?;

    let proposal = SellProposal {
      proposal_id: Uuid::new_v4(),
      property_id: fraction.property_id,
      fraction_id: fraction.fraction_id,
      wallet_id: fraction.wallet_id,
      shards_for_sale,
      remaining: shards_for_sale,
      price_per_shard,
      executed: false,
      chain_proposal_id,
      created_at: Utc::now(),
    };
    self.tx.execute(
      &format!(
        "INSERT INTO sell_proposals ({PROPOSAL_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
      ),
      params![
        encode_uuid(proposal.proposal_id),
        encode_uuid(proposal.property_id),
        encode_uuid(proposal.fraction_id),
        encode_uuid(proposal.wallet_id),
        encode_count(proposal.shards_for_sale)?,
        encode_count(proposal.remaining)?,
        encode_amount(proposal.price_per_shard),
        proposal.executed,
        proposal.chain_proposal_id,
        self.now,
      ],
    )?;

    self.record(Audit {
      wallet_id:   fraction.wallet_id,
      property_id: fraction.property_id,
      fraction_id: Some(fraction.fraction_id),
      kind:        TransactionKind::Sell,
      amount:      shards_for_sale,
      value:       None,
    })?;

    Ok(Outcome::ProposalOpened {
      proposal: load_proposal(self.tx, proposal.proposal_id)?,
      seller,
    })
  }

  fn fill_proposal(
    &self,
    proposal_id: Uuid,
    buyer_wallet: Uuid,
    quantity: u64,
    expected: u64,
  ) -> Result<Outcome> {
    if quantity == 0 {
      return Err(Domain::InvalidQuantity.into());
    }
    let proposal = load_proposal(self.tx, proposal_id)?;
    if proposal.executed {
      return Err(Domain::ProposalExecuted(proposal_id).into());
    }
    require_wallet(self.tx, buyer_wallet)?;
    if quantity > proposal.remaining {
      return Err(
        Domain::InsufficientRemaining {
          remaining: proposal.remaining,
          requested: quantity,
        }
        .into(),
      );
    }
    let total = proposal
      .price_per_shard
      .checked_mul_quantity(quantity)
      .ok_or(Domain::Overflow)?;

    let remaining = proposal.remaining - quantity;
    let changed = self.tx.execute(
      "UPDATE sell_proposals SET remaining = ?1, executed = ?2
        WHERE proposal_id = ?3 AND remaining = ?4 AND executed = 0",
      params![
        encode_count(remaining)?,
        remaining == 0,
        encode_uuid(proposal_id),
        encode_count(expected)?,
      ],
    )?;
    if changed != 1 {
      return Err(Domain::StaleProposal(proposal_id).into());
    }

    let property = load_property(self.tx, proposal.property_id)?;
    let token_id = property
      .token_id
      .ok_or(Domain::PropertyNotVerified(proposal.property_id))?;
    let buyer =
      self.credit(proposal.property_id, buyer_wallet, &token_id, quantity)?;

    self.record(Audit {
      wallet_id:   buyer_wallet,
      property_id: proposal.property_id,
      fraction_id: Some(buyer.fraction_id),
      kind:        TransactionKind::Buy,
      amount:      quantity,
      value:       Some(total),
    })?;

    Ok(Outcome::ProposalFilled {
      proposal: load_proposal(self.tx, proposal_id)?,
      buyer,
    })
  }

  // ── Primitives ────────────────────────────────────────────────────────

  /// Take `amount` out of `fraction`, deleting the row when it reaches zero.
  ///
  /// Only succeeds if the row still holds `expected` shards.
  fn debit(
    &self,
    fraction: &Fraction,
    amount: u64,
    expected: u64,
  ) -> Result<Option<Fraction>> {
    if fraction.supply != expected || amount > expected {
      return Err(Domain::StaleFraction(fraction.fraction_id).into());
    }
    let id = encode_uuid(fraction.fraction_id);
    let expected_sql = encode_count(expected)?;

    if amount == expected {
      let changed = self.tx.execute(
        "DELETE FROM fractions WHERE fraction_id = ?1 AND supply = ?2",
        params![id, expected_sql],
      )?;
      if changed != 1 {
        return Err(Domain::StaleFraction(fraction.fraction_id).into());
      }
      return Ok(None);
    }

    let changed = self.tx.execute(
      "UPDATE fractions SET supply = supply - ?1
        WHERE fraction_id = ?2 AND supply = ?3",
      params![encode_count(amount)?, id, expected_sql],
    )?;
    if changed != 1 {
      return Err(Domain::StaleFraction(fraction.fraction_id).into());
    }
    load_fraction(self.tx, fraction.fraction_id).map(Some)
  }

  /// Add `amount` to the wallet's holding, creating it if absent.
  fn credit(
    &self,
    property_id: Uuid,
    wallet_id: Uuid,
    token_id: &str,
    amount: u64,
  ) -> Result<Fraction> {
    if let Some(existing) = holding(self.tx, property_id, wallet_id)? {
      let supply = existing.supply.checked_add(amount).ok_or(Domain::Overflow)?;
      self.tx.execute(
        "UPDATE fractions SET supply = ?1 WHERE fraction_id = ?2",
        params![encode_count(supply)?, encode_uuid(existing.fraction_id)],
      )?;
      return load_fraction(self.tx, existing.fraction_id);
    }

    let fraction_id = Uuid::new_v4();
    self.tx.execute(
      &format!(
        "INSERT INTO fractions ({FRACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
      ),
      params![
        encode_uuid(fraction_id),
        encode_uuid(property_id),
        encode_uuid(wallet_id),
        encode_count(amount)?,
        token_id,
        self.now,
      ],
    )?;
    load_fraction(self.tx, fraction_id)
  }

  fn record(&self, audit: Audit) -> Result<()> {
    self.tx.execute(
      "INSERT INTO transactions (
         transaction_id, wallet_id, property_id, fraction_id, kind,
         amount, value, tx_hash, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      params![
        encode_uuid(Uuid::new_v4()),
        encode_uuid(audit.wallet_id),
        encode_uuid(audit.property_id),
        audit.fraction_id.map(encode_uuid),
        audit.kind.to_string(),
        encode_count(audit.amount)?,
        audit.value.map(encode_amount),
        self.receipt().map(|r| r.tx_hash.to_string()),
        self.now,
      ],
    )?;
    Ok(())
  }
}

// ─── Reads inside the transaction ────────────────────────────────────────────

fn load_property(tx: &SqlTx<'_>, property_id: Uuid) -> Result<Property> {
  tx.query_row(
    &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE property_id = ?1"),
    params![encode_uuid(property_id)],
    RawProperty::from_row,
  )
  .optional()?
  .ok_or(Domain::PropertyNotFound(property_id))?
  .into_property()
}

fn load_fraction(tx: &SqlTx<'_>, fraction_id: Uuid) -> Result<Fraction> {
  tx.query_row(
    &format!("SELECT {FRACTION_COLUMNS} FROM fractions WHERE fraction_id = ?1"),
    params![encode_uuid(fraction_id)],
    RawFraction::from_row,
  )
  .optional()?
  .ok_or(Domain::FractionNotFound(fraction_id))?
  .into_fraction()
}

fn load_proposal(tx: &SqlTx<'_>, proposal_id: Uuid) -> Result<SellProposal> {
  tx.query_row(
    &format!("SELECT {PROPOSAL_COLUMNS} FROM sell_proposals WHERE proposal_id = ?1"),
    params![encode_uuid(proposal_id)],
    RawProposal::from_row,
  )
  .optional()?
  .ok_or(Domain::ProposalNotFound(proposal_id))?
  .into_proposal()
}

fn holding(
  tx: &SqlTx<'_>,
  property_id: Uuid,
  wallet_id: Uuid,
) -> Result<Option<Fraction>> {
  tx.query_row(
    &format!(
      "SELECT {FRACTION_COLUMNS} FROM fractions
        WHERE property_id = ?1 AND wallet_id = ?2"
    ),
    params![encode_uuid(property_id), encode_uuid(wallet_id)],
    RawFraction::from_row,
  )
  .optional()?
  .map(RawFraction::into_fraction)
  .transpose()
}

fn fractions_of(tx: &SqlTx<'_>, property_id: Uuid) -> Result<Vec<Fraction>> {
  let mut stmt = tx.prepare(&format!(
    "SELECT {FRACTION_COLUMNS} FROM fractions
      WHERE property_id = ?1 ORDER BY created_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(property_id)], RawFraction::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawFraction::into_fraction).collect()
}

fn count_fractions(tx: &SqlTx<'_>, property_id: Uuid) -> Result<i64> {
  Ok(tx.query_row(
    "SELECT COUNT(*) FROM fractions WHERE property_id = ?1",
    params![encode_uuid(property_id)],
    |r| r.get(0),
  )?)
}

fn count_open_proposals(tx: &SqlTx<'_>, property_id: Uuid) -> Result<usize> {
  let n: i64 = tx.query_row(
    "SELECT COUNT(*) FROM sell_proposals
      WHERE property_id = ?1 AND executed = 0 AND remaining > 0",
    params![encode_uuid(property_id)],
    |r| r.get(0),
  )?;
  Ok(usize::try_from(n).unwrap_or(usize::MAX))
}

fn wallet_address(tx: &SqlTx<'_>, wallet_id: Uuid) -> Result<Option<String>> {
  Ok(
    tx.query_row(
      "SELECT address FROM wallets WHERE wallet_id = ?1",
      params![encode_uuid(wallet_id)],
      |r| r.get(0),
    )
    .optional()?,
  )
}

fn require_wallet(tx: &SqlTx<'_>, wallet_id: Uuid) -> Result<()> {
  let exists = tx
    .query_row(
      "SELECT 1 FROM wallets WHERE wallet_id = ?1",
      params![encode_uuid(wallet_id)],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if !exists {
    return Err(Domain::WalletNotFound(wallet_id.to_string()).into());
  }
  Ok(())
}
