//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::{sync::Arc, time::Duration};

use axum::{
  Extension, Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use shard_chain::{Behaviour, SimulatedChain};
use shard_ledger::{ConfirmPolicy, Ledger};
use shard_store_sqlite::SqliteStore;
use tower::ServiceExt as _;

use crate::{Caller, api_router};

type TestLedger = Ledger<SqliteStore, SimulatedChain>;

async fn ledger() -> Arc<TestLedger> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Arc::new(Ledger::new(
    Arc::new(store),
    Arc::new(SimulatedChain::new()),
    ConfirmPolicy {
      timeout:       Duration::from_millis(100),
      poll_interval: Duration::from_millis(5),
    },
  ))
}

fn app(ledger: &Arc<TestLedger>, user: &str) -> Router {
  api_router(Arc::clone(ledger)).layer(Extension(Caller(user.to_owned())))
}

fn addr(n: u8) -> String { format!("0x{n:040x}") }

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn connect(app: &Router, n: u8) {
  let (status, _) = call(app, "POST", "/wallets", Some(json!({ "address": addr(n) }))).await;
  assert_eq!(status, StatusCode::CREATED);
}

/// Register a property and mint `quantity` shards to wallet 1. Returns the
/// property id and the holding's fraction id.
async fn minted(app: &Router, quantity: u64) -> (String, String) {
  let (status, body) = call(
    app,
    "POST",
    "/properties",
    Some(json!({
      "title":       "12 Harbour Row",
      "valuation":   "250000",
      "nft_address": addr(0xaa),
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  assert_eq!(body["property"]["status"], "VERIFIED");
  let property_id = body["property"]["property_id"].as_str().unwrap().to_owned();

  let (status, body) = call(
    app,
    "POST",
    "/fractions/mint",
    Some(json!({
      "property_id": property_id,
      "to_address":  addr(1),
      "quantity":    quantity,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  assert!(body["tx_hash"].as_str().unwrap().starts_with("0x"));
  let fraction_id = body["fraction"]["fraction_id"].as_str().unwrap().to_owned();
  (property_id, fraction_id)
}

// ── Wallets ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn wallet_connect_is_idempotent_per_user() {
  let l = ledger().await;
  let alice = app(&l, "alice");

  let (status, first) =
    call(&alice, "POST", "/wallets", Some(json!({ "address": addr(0xab) }))).await;
  assert_eq!(status, StatusCode::CREATED);
  let upper = addr(0xab).to_uppercase().replacen("0X", "0x", 1);
  let (_, again) = call(&alice, "POST", "/wallets", Some(json!({ "address": upper }))).await;
  assert_eq!(first["wallet_id"], again["wallet_id"]);
  assert_eq!(again["address"], addr(0xab));

  let (status, body) =
    call(&app(&l, "bob"), "POST", "/wallets", Some(json!({ "address": addr(0xab) }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "conflict");

  let (status, body) = call(&alice, "GET", "/wallets", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_caller_is_unauthorized() {
  let l = ledger().await;
  let (status, body) = call(&api_router(l), "GET", "/wallets", None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["kind"], "unauthorized");
}

// ── Fractions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mint_then_transfer() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  connect(&app, 2).await;
  let (property_id, fraction_id) = minted(&app, 1000).await;

  let (status, body) = call(
    &app,
    "POST",
    "/fractions/transfer",
    Some(json!({
      "fraction_id":  fraction_id,
      "from_address": addr(1),
      "to_address":   addr(2),
      "amount":       300,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["sender"]["supply"], 700);
  assert_eq!(body["receiver"]["supply"], 300);

  let (status, body) =
    call(&app, "GET", &format!("/properties/{property_id}/supply"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["held"], 1000);
  assert_eq!(body["holders"], 2);

  let (_, body) = call(
    &app,
    "GET",
    &format!("/transactions?wallet_address={}&limit=1", addr(1)),
    None,
  )
  .await;
  assert_eq!(body["items"][0]["kind"], "TRANSFER");
  assert_eq!(body["pagination"]["total"], 2);
  assert_eq!(body["pagination"]["has_next_page"], true);
}

#[tokio::test]
async fn rule_violations_map_to_statuses() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  connect(&app, 2).await;
  let (property_id, fraction_id) = minted(&app, 10).await;

  // Already fractionalised.
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/mint",
    Some(json!({ "property_id": property_id, "to_address": addr(2), "quantity": 5 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "conflict");

  // Not the holder.
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/transfer",
    Some(json!({
      "fraction_id":  fraction_id,
      "from_address": addr(2),
      "to_address":   addr(1),
      "amount":       1,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "forbidden");

  // Unlock by someone other than the sole holder.
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/unlock",
    Some(json!({ "property_id": property_id, "wallet_address": addr(2) })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "conflict");

  // Burn more than held.
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/burn",
    Some(json!({ "property_id": property_id, "amount": 11 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");

  let (status, body) = call(
    &app,
    "GET",
    "/fractions/00000000-0000-0000-0000-000000000000",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
  let l = ledger().await;
  let app = app(&l, "alice");

  let resp = app
    .clone()
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/wallets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let (status, _) =
    call(&app, "POST", "/wallets", Some(json!({ "address": "0x1234" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = call(&app, "GET", "/sell-proposals?page=0", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");

  let (status, _) = call(&app, "GET", "/properties/not-a-uuid", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn burn_reports_the_remaining_holding() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  let (property_id, _) = minted(&app, 10).await;

  let (status, body) = call(
    &app,
    "POST",
    "/fractions/burn",
    Some(json!({ "property_id": property_id, "amount": 4, "wallet_address": addr(1) })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["fraction"]["supply"], 6);
  assert_eq!(body["property"]["shard_supply"], 6);
  assert_eq!(body["message"], "burned 4 shards");
}

// ── Sell proposals ──────────────────────────────────────────────────────────

#[tokio::test]
async fn proposal_create_list_and_buy() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  connect(&app, 2).await;
  let (property_id, fraction_id) = minted(&app, 100).await;

  let (status, body) = call(
    &app,
    "POST",
    "/sell-proposals",
    Some(json!({
      "wallet_address":  addr(1),
      "fraction_id":     fraction_id,
      "shards_for_sale": 40,
      "price_per_shard": "0.1",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  let proposal_id = body["proposal"]["proposal_id"].as_str().unwrap().to_owned();

  let (status, body) = call(
    &app,
    "POST",
    &format!("/sell-proposals/{proposal_id}/buy"),
    Some(json!({ "buyer_address": addr(2), "quantity": 3 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["proposal"]["remaining"], 37);
  assert_eq!(body["fraction"]["supply"], 3);

  let (status, body) = call(
    &app,
    "POST",
    &format!("/sell-proposals/{proposal_id}/buy"),
    Some(json!({ "buyer_address": addr(2), "quantity": 38 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "conflict");

  let (status, body) = call(
    &app,
    "GET",
    &format!("/sell-proposals?property_id={property_id}&open=true&limit=5"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["items"].as_array().unwrap().len(), 1);
  assert_eq!(body["pagination"]["page"], 1);
  assert_eq!(body["pagination"]["limit"], 5);

  let (_, body) = call(
    &app,
    "GET",
    &format!("/transactions?property_id={property_id}&wallet_address={}", addr(2)),
    None,
  )
  .await;
  assert_eq!(body["items"][0]["kind"], "BUY");
  assert_eq!(body["items"][0]["value"], "0.3");
}

// ── Chain outcomes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unconfirmed_transaction_is_accepted() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  connect(&app, 2).await;
  let (_, fraction_id) = minted(&app, 10).await;

  l.chain().push_behaviour(Behaviour::Hold);
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/transfer",
    Some(json!({
      "fraction_id":  fraction_id,
      "from_address": addr(1),
      "to_address":   addr(2),
      "amount":       5,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED, "{body}");
  assert_eq!(body["kind"], "pending");
  let operation_id = body["operation_id"].as_str().unwrap().to_owned();

  let (status, body) = call(&app, "GET", &format!("/operations/{operation_id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "submitted");
}

#[tokio::test]
async fn reverted_transaction_is_a_bad_gateway() {
  let l = ledger().await;
  let app = app(&l, "alice");
  connect(&app, 1).await;
  connect(&app, 2).await;
  let (_, fraction_id) = minted(&app, 10).await;

  l.chain().push_behaviour(Behaviour::Revert("paused".into()));
  let (status, body) = call(
    &app,
    "POST",
    "/fractions/transfer",
    Some(json!({
      "fraction_id":  fraction_id,
      "from_address": addr(1),
      "to_address":   addr(2),
      "amount":       5,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert_eq!(body["kind"], "chain");
  assert!(body["tx_hash"].is_string());
}
