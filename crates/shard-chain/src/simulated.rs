//! An in-process model of the property contract.
//!
//! Calls execute against in-memory balances the moment they are submitted;
//! a call the contract would reject is recorded as reverted instead. What
//! [`ChainGateway::status`] reports, and when, is driven by a FIFO script of
//! [`Behaviour`]s so tests can exercise slow confirmations, reverts and
//! refused submissions.

use std::{
  collections::{HashMap, VecDeque},
  sync::Mutex,
};

use sha2::{Digest, Sha256};
use shard_core::{
  address::{Address, TxHash},
  amount::Amount,
  chain::{ChainCall, ChainGateway, Receipt, TxStatus},
};
use tracing::debug;

use crate::{Error, Result};

/// How the next submitted transaction behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behaviour {
  /// Confirmed on the first status poll.
  Confirm,
  /// Reported pending for this many polls, then confirmed.
  ConfirmAfter(u32),
  /// Pending until [`SimulatedChain::release_held`] is called.
  Hold,
  /// Reverted with this reason, without touching contract state.
  Revert(String),
  /// Refused at submission; no hash is issued.
  RejectSubmit(String),
}

enum Release {
  AfterPolls(u32),
  Held,
}

struct Tx {
  outcome: std::result::Result<Receipt, String>,
  release: Release,
}

struct Listing {
  seller:    Address,
  token_id:  String,
  remaining: u64,
  price:     Amount,
}

#[derive(Default)]
struct State {
  nonce:         u64,
  block:         u64,
  next_token:    u64,
  next_proposal: u64,
  script:        VecDeque<Behaviour>,
  txs:           HashMap<TxHash, Tx>,
  balances:      HashMap<String, HashMap<Address, u64>>,
  listings:      HashMap<String, Listing>,
  calls:         Vec<ChainCall>,
}

/// In-memory chain gateway.
///
/// Uses `std::sync::Mutex` for interior mutability; the lock is never held
/// across an `.await`. A poisoned lock surfaces as [`Error::Poisoned`].
#[derive(Default)]
pub struct SimulatedChain {
  state: Mutex<State>,
}

impl SimulatedChain {
  pub fn new() -> Self { Self::default() }

  /// Queue the behaviour of a future submission. Unscripted submissions
  /// behave as [`Behaviour::Confirm`].
  pub fn push_behaviour(&self, behaviour: Behaviour) {
    if let Ok(mut state) = self.state.lock() {
      state.script.push_back(behaviour);
    }
  }

  /// Let every held transaction confirm on its next poll.
  pub fn release_held(&self) {
    if let Ok(mut state) = self.state.lock() {
      for tx in state.txs.values_mut() {
        if matches!(tx.release, Release::Held) {
          tx.release = Release::AfterPolls(0);
        }
      }
    }
  }

  /// On-chain shard balance of `holder` for `token_id`.
  pub fn balance_of(&self, token_id: &str, holder: &Address) -> u64 {
    self
      .state
      .lock()
      .ok()
      .and_then(|s| s.balances.get(token_id)?.get(holder).copied())
      .unwrap_or(0)
  }

  /// Every call accepted for broadcast, in submission order.
  pub fn submitted_calls(&self) -> Vec<ChainCall> {
    self
      .state
      .lock()
      .map(|s| s.calls.clone())
      .unwrap_or_default()
  }
}

impl ChainGateway for SimulatedChain {
  type Error = Error;

  async fn submit(&self, call: ChainCall) -> Result<TxHash> {
    let mut state = self.state.lock().map_err(|_| Error::Poisoned)?;
    let behaviour = state.script.pop_front().unwrap_or(Behaviour::Confirm);

    if let Behaviour::RejectSubmit(reason) = behaviour {
      return Err(Error::Rejected(reason));
    }

    state.nonce += 1;
    state.block += 1;
    let tx_hash = tx_hash_for(state.nonce, &call);
    let block_number = state.block;

    let outcome = match &behaviour {
      Behaviour::Revert(reason) => Err(reason.clone()),
      _ => state.execute(&call).map(|output| Receipt {
        tx_hash: tx_hash.clone(),
        block_number,
        output,
      }),
    };
    let release = match behaviour {
      Behaviour::ConfirmAfter(polls) => Release::AfterPolls(polls),
      Behaviour::Hold => Release::Held,
      _ => Release::AfterPolls(0),
    };

    debug!(method = call.method(), %tx_hash, "simulated submission");
    state.calls.push(call);
    state.txs.insert(tx_hash.clone(), Tx { outcome, release });
    Ok(tx_hash)
  }

  async fn status(&self, tx_hash: &TxHash) -> Result<TxStatus> {
    let mut state = self.state.lock().map_err(|_| Error::Poisoned)?;
    let tx = state
      .txs
      .get_mut(tx_hash)
      .ok_or_else(|| Error::UnknownTransaction(tx_hash.clone()))?;

    match &mut tx.release {
      Release::Held => return Ok(TxStatus::Pending),
      Release::AfterPolls(n) if *n > 0 => {
        *n -= 1;
        return Ok(TxStatus::Pending);
      }
      Release::AfterPolls(_) => {}
    }

    Ok(match &tx.outcome {
      Ok(receipt) => TxStatus::Confirmed(receipt.clone()),
      Err(reason) => TxStatus::Reverted { reason: reason.clone() },
    })
  }
}

fn tx_hash_for(nonce: u64, call: &ChainCall) -> TxHash {
  let mut hasher = Sha256::new();
  hasher.update(nonce.to_be_bytes());
  hasher.update(call.method().as_bytes());
  if let Ok(params) = serde_json::to_vec(call) {
    hasher.update(params);
  }
  let mut bytes = [0u8; 32];
  bytes.copy_from_slice(&hasher.finalize());
  TxHash::from_bytes(bytes)
}

// ─── Contract model ──────────────────────────────────────────────────────────

impl State {
  /// Run `call` against contract state. Returns the method's output, or the
  /// revert reason with state unchanged.
  fn execute(&mut self, call: &ChainCall) -> std::result::Result<Option<String>, String> {
    match call {
      ChainCall::CreateProperty { .. } => {
        self.next_token += 1;
        let token_id = self.next_token.to_string();
        self.balances.insert(token_id.clone(), HashMap::new());
        Ok(Some(token_id))
      }

      ChainCall::MintFractions { token_id, to, amount } => {
        let holders = self.token_mut(token_id)?;
        let balance = holders.entry(to.clone()).or_default();
        *balance = balance.checked_add(*amount).ok_or("balance overflow")?;
        Ok(None)
      }

      ChainCall::SafeTransferFrom { from, to, token_id, amount, .. } => {
        let holders = self.token_mut(token_id)?;
        debit(holders, from, *amount)?;
        *holders.entry(to.clone()).or_default() += amount;
        Ok(None)
      }

      ChainCall::CreateSellProposal { seller, fraction_token, amount, price_wei, .. } => {
        let holders = self.token_mut(fraction_token)?;
        debit(holders, seller, *amount)?;
        self.next_proposal += 1;
        let proposal_id = self.next_proposal.to_string();
        self.listings.insert(proposal_id.clone(), Listing {
          seller:    seller.clone(),
          token_id:  fraction_token.clone(),
          remaining: *amount,
          price:     *price_wei,
        });
        Ok(Some(proposal_id))
      }

      ChainCall::BuySellProposal { buyer, proposal_ref, quantity, value } => {
        let listing = self
          .listings
          .get_mut(proposal_ref)
          .ok_or("unknown proposal")?;
        if listing.remaining < *quantity {
          return Err("insufficient shards in proposal".into());
        }
        if &listing.seller == buyer {
          return Err("seller cannot buy own proposal".into());
        }
        let due = listing
          .price
          .checked_mul_quantity(*quantity)
          .ok_or("price overflow")?;
        if *value != due {
          return Err(format!("payment {value} does not match price {due}"));
        }
        listing.remaining -= quantity;
        let token_id = listing.token_id.clone();
        let holders = self.token_mut(&token_id)?;
        *holders.entry(buyer.clone()).or_default() += quantity;
        Ok(None)
      }

      ChainCall::UnlockProperty { token_id } => {
        if self
          .listings
          .values()
          .any(|l| &l.token_id == token_id && l.remaining > 0)
        {
          return Err("open sell proposals hold shards".into());
        }
        let holders = self.token_mut(token_id)?;
        if holders.values().filter(|b| **b > 0).count() > 1 {
          return Err("shards are held by more than one account".into());
        }
        holders.clear();
        Ok(None)
      }
    }
  }

  fn token_mut(
    &mut self,
    token_id: &str,
  ) -> std::result::Result<&mut HashMap<Address, u64>, String> {
    self
      .balances
      .get_mut(token_id)
      .ok_or_else(|| format!("unknown token {token_id}"))
  }
}

fn debit(
  holders: &mut HashMap<Address, u64>,
  from: &Address,
  amount: u64,
) -> std::result::Result<(), String> {
  match holders.get_mut(from) {
    Some(balance) if *balance >= amount => {
      *balance -= amount;
      Ok(())
    }
    _ => Err(format!("insufficient balance for {from}")),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
