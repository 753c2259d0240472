//! Service tests against an in-memory store and the simulated chain.

use std::{sync::Arc, time::Duration};

use shard_chain::{Behaviour, SimulatedChain};
use shard_core::{
  Error as Rule,
  address::Address,
  amount::Amount,
  audit::TransactionKind,
  chain::ChainCall,
  fraction::Fraction,
  operation::{Mutation, NewOperation, OperationStatus},
  property::{Property, PropertyStatus},
  store::{LedgerStore, Page, ProposalFilter, TransactionFilter},
};
use shard_store_sqlite::SqliteStore;

use crate::{
  BurnRequest, BuyRequest, ConfirmPolicy, Error, Ledger, MintRequest,
  ProposalRequest, ReconcileReport, RegisterProperty, TransferKind,
  TransferRequest, UnlockRequest,
};

type TestLedger = Ledger<SqliteStore, SimulatedChain>;

fn policy() -> ConfirmPolicy {
  ConfirmPolicy {
    timeout:       Duration::from_millis(100),
    poll_interval: Duration::from_millis(5),
  }
}

async fn ledger() -> TestLedger {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Ledger::new(Arc::new(store), Arc::new(SimulatedChain::new()), policy())
}

fn addr(n: u8) -> Address { format!("0x{n:040x}").parse().unwrap() }

fn rule(err: Error) -> Rule {
  match err {
    Error::Domain(e) => e,
    other => panic!("expected a ledger rule error, got {other:?}"),
  }
}

/// Connect wallets 1..=n, each for its own user.
async fn wallets(l: &TestLedger, n: u8) {
  for i in 1..=n {
    l.connect_wallet(&format!("user-{i}"), addr(i)).await.unwrap();
  }
}

async fn property(l: &TestLedger) -> Property {
  l.register_property("owner", RegisterProperty {
    title:       "12 Harbour Row".into(),
    description: "Two-bed flat".into(),
    valuation:   Amount::from_whole(250_000),
    nft_address: addr(0xaa),
    image_url:   None,
  })
  .await
  .unwrap()
  .value
}

/// A property with `quantity` shards minted to wallet 1.
async fn minted(l: &TestLedger, quantity: u64) -> (Property, Fraction) {
  let p = property(l).await;
  let fraction = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(1), quantity })
    .await
    .unwrap()
    .value;
  (p, fraction)
}

fn transfer(fraction: &Fraction, from: u8, to: u8, amount: u64) -> TransferRequest {
  TransferRequest {
    fraction_id:  fraction.fraction_id,
    from_address: addr(from),
    to_address:   addr(to),
    amount,
    kind:         TransferKind::Transfer,
  }
}

async fn assert_balanced(l: &TestLedger, property: &Property) {
  let supply = l.supply(property.property_id).await.unwrap();
  assert!(supply.is_balanced(), "unbalanced supply: {supply:?}");
}

// ─── Properties and minting ──────────────────────────────────────────────────

#[tokio::test]
async fn registration_confirms_and_verifies() {
  let l = ledger().await;
  let settled = l
    .register_property("owner", RegisterProperty {
      title:       "Mill House".into(),
      description: String::new(),
      valuation:   Amount::from_whole(1),
      nft_address: addr(0xaa),
      image_url:   Some("https://img.example/mill.png".into()),
    })
    .await
    .unwrap();

  assert_eq!(settled.value.status, PropertyStatus::Verified);
  assert_eq!(settled.value.token_id.as_deref(), Some("1"));
  let op = l.get_operation(settled.operation_id).await.unwrap();
  assert_eq!(op.status, OperationStatus::Applied);
  assert_eq!(op.tx_hash, Some(settled.tx_hash));
}

#[tokio::test]
async fn blank_title_is_rejected() {
  let l = ledger().await;
  let err = l
    .register_property("owner", RegisterProperty {
      title:       "  ".into(),
      description: String::new(),
      valuation:   Amount::from_whole(1),
      nft_address: addr(0xaa),
      image_url:   None,
    })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::EmptyField("title")));
  assert!(l.chain().submitted_calls().is_empty());
}

#[tokio::test]
async fn mint_credits_one_holder() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let (p, fraction) = minted(&l, 1000).await;

  assert_eq!(fraction.supply, 1000);
  let p = l.get_property(p.property_id).await.unwrap();
  assert_eq!(p.status, PropertyStatus::Fractionalised);
  assert_eq!(p.shard_supply, 1000);
  assert_eq!(l.chain().balance_of(&fraction.token_id, &addr(1)), 1000);
}

#[tokio::test]
async fn second_mint_is_rejected_before_submission() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, _) = minted(&l, 1000).await;
  let calls = l.chain().submitted_calls().len();

  let err = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(2), quantity: 5 })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::AlreadyFractionalised(_)));
  assert_eq!(l.chain().submitted_calls().len(), calls);
}

#[tokio::test]
async fn burned_out_property_cannot_be_minted_again() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let (p, a) = minted(&l, 100).await;
  l.burn(BurnRequest { property_id: p.property_id, amount: 100, wallet_address: None })
    .await
    .unwrap();
  let calls = l.chain().submitted_calls().len();

  let err = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(1), quantity: 50 })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::AlreadyFractionalised(_)));
  assert_eq!(l.chain().submitted_calls().len(), calls);

  let p = l.get_property(p.property_id).await.unwrap();
  assert_eq!(p.status, PropertyStatus::Fractionalised);
  assert_eq!(p.shard_supply, 0);
  assert_eq!(l.chain().balance_of(&a.token_id, &addr(1)), 100);
  assert_balanced(&l, &p).await;
}

#[tokio::test]
async fn unlocked_property_cannot_be_minted_again() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let (p, _) = minted(&l, 100).await;
  l.unlock(UnlockRequest { property_id: p.property_id, wallet_address: addr(1) })
    .await
    .unwrap();

  let err = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(1), quantity: 100 })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::AlreadyFractionalised(_)));

  let p = l.get_property(p.property_id).await.unwrap();
  assert_eq!(p.status, PropertyStatus::Verified);
  assert!(p.was_fractionalised());
  assert!(l.fractions_of(p.property_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn mint_validates_input() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let p = property(&l).await;

  let err = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(1), quantity: 0 })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::InvalidQuantity));

  let err = l
    .mint(MintRequest { property_id: p.property_id, to_address: addr(9), quantity: 10 })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::WalletNotFound(_)));
}

// ─── Transfers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_round_trip() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 1000).await;

  let (sender, b) = l.transfer(transfer(&a, 1, 2, 300)).await.unwrap().value;
  assert_eq!(sender.as_ref().map(|f| f.supply), Some(700));
  assert_eq!(b.supply, 300);

  let (_, back) = l.transfer(transfer(&b, 2, 1, 300)).await.unwrap().value;
  assert_eq!(back.fraction_id, a.fraction_id);
  assert_eq!(back.supply, 1000);

  let holdings = l.fractions_of(p.property_id).await.unwrap();
  assert_eq!(holdings.len(), 1);
  assert_balanced(&l, &p).await;

  let trail = l
    .transactions(
      TransactionFilter { property_id: Some(p.property_id), ..Default::default() },
      Page::default(),
    )
    .await
    .unwrap();
  let kinds: Vec<_> = trail.items.iter().map(|t| t.kind).collect();
  assert_eq!(kinds, [
    TransactionKind::Transfer,
    TransactionKind::Transfer,
    TransactionKind::Fractionalise,
  ]);
  assert!(trail.items.iter().all(|t| t.tx_hash.is_some()));
}

#[tokio::test]
async fn transfer_checks_ownership_and_supply() {
  let l = ledger().await;
  wallets(&l, 3).await;
  let (_, a) = minted(&l, 100).await;

  let err = l.transfer(transfer(&a, 2, 3, 10)).await.unwrap_err();
  assert!(matches!(rule(err), Rule::NotOwner { .. }));

  let err = l.transfer(transfer(&a, 1, 2, 101)).await.unwrap_err();
  assert!(matches!(
    rule(err),
    Rule::InsufficientSupply { available: 100, requested: 101 }
  ));

  let err = l.transfer(transfer(&a, 1, 1, 10)).await.unwrap_err();
  assert!(matches!(rule(err), Rule::SelfTransfer));
}

#[tokio::test]
async fn concurrent_transfers_cannot_overdraw() {
  let l = Arc::new(ledger().await);
  wallets(&l, 3).await;
  let (p, a) = minted(&l, 1000).await;

  let first = {
    let (l, req) = (Arc::clone(&l), transfer(&a, 1, 2, 600));
    tokio::spawn(async move { l.transfer(req).await })
  };
  let second = {
    let (l, req) = (Arc::clone(&l), transfer(&a, 1, 3, 600));
    tokio::spawn(async move { l.transfer(req).await })
  };
  let results = [first.await.unwrap(), second.await.unwrap()];

  let ok = results.iter().filter(|r| r.is_ok()).count();
  assert_eq!(ok, 1);
  let err = results.into_iter().find_map(Result::err).unwrap();
  assert!(matches!(
    rule(err),
    Rule::InsufficientSupply { available: 400, requested: 600 }
  ));
  assert_balanced(&l, &p).await;
}

#[tokio::test]
async fn concurrent_full_balance_transfers_have_one_winner() {
  let l = Arc::new(ledger().await);
  wallets(&l, 3).await;
  let (p, a) = minted(&l, 1000).await;

  let first = {
    let (l, req) = (Arc::clone(&l), transfer(&a, 1, 2, 1000));
    tokio::spawn(async move { l.transfer(req).await })
  };
  let second = {
    let (l, req) = (Arc::clone(&l), transfer(&a, 1, 3, 1000));
    tokio::spawn(async move { l.transfer(req).await })
  };
  let results = [first.await.unwrap(), second.await.unwrap()];

  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  let err = results.into_iter().find_map(Result::err).unwrap();
  assert!(matches!(
    rule(err),
    Rule::InsufficientSupply { available: 0, requested: 1000 }
  ));

  // The emptied holding is deleted, and only the winner holds shards.
  let holdings = l.fractions_of(p.property_id).await.unwrap();
  assert_eq!(holdings.len(), 1);
  assert_eq!(holdings[0].supply, 1000);
  assert_ne!(holdings[0].fraction_id, a.fraction_id);
  assert_balanced(&l, &p).await;
}

#[tokio::test]
async fn sell_label_is_recorded() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 10).await;

  let mut req = transfer(&a, 1, 2, 10);
  req.kind = TransferKind::Sell;
  let (sender, _) = l.transfer(req).await.unwrap().value;
  assert!(sender.is_none());

  let trail = l
    .transactions(
      TransactionFilter { property_id: Some(p.property_id), ..Default::default() },
      Page::new(1, 1).unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(trail.items[0].kind, TransactionKind::Sell);
  assert!(trail.pagination.has_next_page);
}

// ─── Burn and unlock ─────────────────────────────────────────────────────────

#[tokio::test]
async fn burn_is_ledger_only() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let (p, _) = minted(&l, 100).await;
  let calls = l.chain().submitted_calls().len();

  let (property, remaining) = l
    .burn(BurnRequest { property_id: p.property_id, amount: 40, wallet_address: None })
    .await
    .unwrap();
  assert_eq!(property.shard_supply, 60);
  assert_eq!(remaining.map(|f| f.supply), Some(60));
  assert_eq!(l.chain().submitted_calls().len(), calls);

  let err = l
    .burn(BurnRequest {
      property_id:    p.property_id,
      amount:         61,
      wallet_address: Some(addr(1)),
    })
    .await
    .unwrap_err();
  assert!(matches!(
    rule(err),
    Rule::BurnExceedsSupply { supply: 60, requested: 61 }
  ));

  let (property, remaining) = l
    .burn(BurnRequest { property_id: p.property_id, amount: 60, wallet_address: None })
    .await
    .unwrap();
  assert!(remaining.is_none());
  assert_eq!(property.status, PropertyStatus::Fractionalised);
  assert_eq!(property.shard_supply, 0);
  assert!(l.fractions_of(p.property_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unlock_needs_a_sole_holder() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 100).await;
  l.transfer(transfer(&a, 1, 2, 40)).await.unwrap();

  let err = l
    .unlock(UnlockRequest { property_id: p.property_id, wallet_address: addr(1) })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::CannotUnlock { holders: 2, .. }));

  let b = l.fractions_of(p.property_id).await.unwrap()[1].clone();
  l.transfer(transfer(&b, 2, 1, 40)).await.unwrap();

  let err = l
    .unlock(UnlockRequest { property_id: p.property_id, wallet_address: addr(2) })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::UnlockHolderMismatch { .. }));

  let unlocked = l
    .unlock(UnlockRequest { property_id: p.property_id, wallet_address: addr(1) })
    .await
    .unwrap()
    .value;
  assert_eq!(unlocked.status, PropertyStatus::Verified);
  assert!(l.fractions_of(p.property_id).await.unwrap().is_empty());
}

// ─── Sell proposals ──────────────────────────────────────────────────────────

#[tokio::test]
async fn proposal_fills_until_executed() {
  let l = ledger().await;
  wallets(&l, 3).await;
  let (p, a) = minted(&l, 1000).await;

  let proposal = l
    .create_sell_proposal(ProposalRequest {
      wallet_address:  addr(1),
      fraction_id:     a.fraction_id,
      shards_for_sale: 400,
      price_per_shard: Amount::from_whole(2),
    })
    .await
    .unwrap()
    .value;
  assert_eq!(proposal.remaining, 400);
  assert_eq!(l.get_fraction(a.fraction_id).await.unwrap().supply, 600);
  assert_balanced(&l, &p).await;

  let buy = |n: u8, quantity| BuyRequest {
    buyer_address: addr(n),
    proposal_id: proposal.proposal_id,
    quantity,
  };

  let (after, bought) = l.buy_sell_proposal(buy(2, 150)).await.unwrap().value;
  assert_eq!(after.remaining, 250);
  assert_eq!(bought.supply, 150);
  assert_eq!(l.chain().balance_of(&a.token_id, &addr(2)), 150);

  let err = l.buy_sell_proposal(buy(3, 251)).await.unwrap_err();
  assert!(matches!(
    rule(err),
    Rule::InsufficientRemaining { remaining: 250, requested: 251 }
  ));
  let err = l.buy_sell_proposal(buy(1, 1)).await.unwrap_err();
  assert!(matches!(rule(err), Rule::SelfTransfer));

  let (after, _) = l.buy_sell_proposal(buy(3, 250)).await.unwrap().value;
  assert!(after.executed);
  assert_balanced(&l, &p).await;

  let err = l.buy_sell_proposal(buy(2, 1)).await.unwrap_err();
  assert!(matches!(rule(err), Rule::ProposalExecuted(_)));

  let trail = l
    .transactions(
      TransactionFilter { property_id: Some(p.property_id), ..Default::default() },
      Page::default(),
    )
    .await
    .unwrap();
  let first_buy = trail
    .items
    .iter()
    .rev()
    .find(|t| t.kind == TransactionKind::Buy)
    .unwrap();
  assert_eq!(first_buy.value, Some(Amount::from_whole(300)));

  let open = l
    .list_sell_proposals(
      ProposalFilter { property_id: Some(p.property_id), open_only: true },
      Page::default(),
    )
    .await
    .unwrap();
  assert!(open.items.is_empty());
}

#[tokio::test]
async fn proposal_validates_offer() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 10).await;

  let offer = |wallet, shards, price| ProposalRequest {
    wallet_address:  addr(wallet),
    fraction_id:     a.fraction_id,
    shards_for_sale: shards,
    price_per_shard: price,
  };

  let err = l
    .create_sell_proposal(offer(1, 11, Amount::from_whole(1)))
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::Oversell { available: 10, requested: 11 }));

  let err = l
    .create_sell_proposal(offer(1, 5, Amount::from_whole(0)))
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::InvalidPrice));

  let err = l
    .create_sell_proposal(offer(2, 5, Amount::from_whole(1)))
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::NotOwner { .. }));

  l.create_sell_proposal(offer(1, 10, Amount::from_whole(1)))
    .await
    .unwrap();
  let err = l
    .unlock(UnlockRequest { property_id: p.property_id, wallet_address: addr(1) })
    .await
    .unwrap_err();
  assert!(matches!(rule(err), Rule::CannotUnlock { holders: 0, .. }));
}

// ─── Chain failures and reconciliation ───────────────────────────────────────

#[tokio::test]
async fn revert_leaves_ledger_untouched() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 100).await;

  l.chain().push_behaviour(Behaviour::Revert("out of gas".into()));
  let err = l.transfer(transfer(&a, 1, 2, 10)).await.unwrap_err();
  let Error::Reverted { operation_id, reason, .. } = err else {
    panic!("expected a revert, got {err:?}");
  };
  assert_eq!(reason, "out of gas");

  let op = l.get_operation(operation_id).await.unwrap();
  assert_eq!(op.status, OperationStatus::Failed);
  assert_eq!(l.get_fraction(a.fraction_id).await.unwrap().supply, 100);
  assert_balanced(&l, &p).await;
}

#[tokio::test]
async fn rejected_submission_is_a_chain_error() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (p, a) = minted(&l, 100).await;

  l.chain().push_behaviour(Behaviour::RejectSubmit("nonce too low".into()));
  let err = l.transfer(transfer(&a, 1, 2, 10)).await.unwrap_err();
  assert!(matches!(err, Error::Chain(_)));
  assert_eq!(l.store().open_operations(p.property_id).await.unwrap(), 0);

  // The property is free again.
  l.transfer(transfer(&a, 1, 2, 10)).await.unwrap();
}

#[tokio::test]
async fn slow_confirmation_settles_on_reconcile() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let p = property(&l).await;

  l.chain().push_behaviour(Behaviour::Hold);
  let req = MintRequest { property_id: p.property_id, to_address: addr(1), quantity: 50 };
  let err = l.mint(req.clone()).await.unwrap_err();
  let Error::Pending { operation_id, .. } = err else {
    panic!("expected pending, got {err:?}");
  };

  let err = l.mint(req).await.unwrap_err();
  assert!(matches!(rule(err), Rule::OperationPending(_)));
  assert_eq!(
    l.reconcile_pending().await.unwrap(),
    ReconcileReport { pending: 1, ..Default::default() }
  );

  l.chain().release_held();
  assert_eq!(
    l.reconcile_pending().await.unwrap(),
    ReconcileReport { applied: 1, ..Default::default() }
  );
  assert_eq!(
    l.get_operation(operation_id).await.unwrap().status,
    OperationStatus::Applied
  );
  let p = l.get_property(p.property_id).await.unwrap();
  assert_eq!(p.shard_supply, 50);
  assert_eq!(l.reconcile_pending().await.unwrap(), ReconcileReport::default());
}

#[tokio::test]
async fn unsubmitted_operation_is_failed_on_reconcile() {
  let l = ledger().await;
  wallets(&l, 1).await;
  let (p, _) = minted(&l, 100).await;

  // Recorded, but the process stopped before the hash was stored.
  let op = l
    .store()
    .begin_operation(NewOperation {
      property_id: p.property_id,
      call:        ChainCall::UnlockProperty { token_id: "1".into() },
      mutation:    Mutation::Unlock {
        property_id: p.property_id,
        wallet_id:   l.wallet(&addr(1)).await.unwrap().wallet_id,
      },
    })
    .await
    .unwrap();
  assert_eq!(op.status, OperationStatus::Preparing);

  assert_eq!(
    l.reconcile_pending().await.unwrap(),
    ReconcileReport { failed: 1, ..Default::default() }
  );
  let op = l.get_operation(op.operation_id).await.unwrap();
  assert_eq!(op.status, OperationStatus::Failed);
  assert!(op.detail.is_some());

  // The ledger is untouched and the property accepts new work.
  assert!(l.get_property(p.property_id).await.unwrap().is_fractionalised());
  assert_eq!(l.store().open_operations(p.property_id).await.unwrap(), 0);
}

#[tokio::test]
async fn confirmed_but_unappliable_is_diverged() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (_, a) = minted(&l, 100).await;

  l.chain().push_behaviour(Behaviour::Hold);
  let err = l.transfer(transfer(&a, 1, 2, 30)).await.unwrap_err();
  let Error::Pending { operation_id, .. } = err else {
    panic!("expected pending, got {err:?}");
  };

  // Move the holding out from under the open operation.
  l.store()
    .apply(
      Mutation::Burn { fraction_id: a.fraction_id, amount: 10, expected_supply: 100 },
      None,
    )
    .await
    .unwrap();

  l.chain().release_held();
  assert_eq!(
    l.reconcile_pending().await.unwrap(),
    ReconcileReport { diverged: 1, ..Default::default() }
  );
  let op = l.get_operation(operation_id).await.unwrap();
  assert_eq!(op.status, OperationStatus::Diverged);
  assert!(op.detail.is_some());
  assert_eq!(l.get_fraction(a.fraction_id).await.unwrap().supply, 90);
}

#[tokio::test]
async fn holdings_are_listed_by_address() {
  let l = ledger().await;
  wallets(&l, 2).await;
  let (_, a) = minted(&l, 100).await;
  minted(&l, 5).await;

  let held = l.holdings(&addr(1)).await.unwrap();
  assert_eq!(held.len(), 2);
  assert_eq!(held[0].fraction_id, a.fraction_id);

  assert!(l.holdings(&addr(2)).await.unwrap().is_empty());
  let err = l.holdings(&addr(7)).await.unwrap_err();
  assert!(matches!(rule(err), Rule::WalletNotFound(_)));
}
