//! Handlers for `/wallets` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/wallets` | Body: `{"address":"0x…"}`; idempotent per caller |
//! | `GET`  | `/wallets` | The caller's wallets |
//! | `GET`  | `/wallets/{address}/holdings` | 404 if no wallet at `address` |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use shard_core::{
  address::Address,
  chain::ChainGateway,
  fraction::Fraction,
  store::LedgerStore,
  wallet::Wallet,
};
use shard_ledger::Ledger;

use crate::{
  error::ApiError,
  extract::{Caller, JsonBody, PathParam},
};

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
  pub address: Address,
}

/// `POST /wallets`
pub async fn connect<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  Caller(user): Caller,
  JsonBody(body): JsonBody<ConnectBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let wallet = ledger.connect_wallet(&user, body.address).await?;
  Ok((StatusCode::CREATED, Json(wallet)))
}

/// `GET /wallets`
pub async fn list<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  Caller(user): Caller,
) -> Result<Json<Vec<Wallet>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.wallets_of(&user).await?))
}

/// `GET /wallets/{address}/holdings`
pub async fn holdings<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(address): PathParam<Address>,
) -> Result<Json<Vec<Fraction>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.holdings(&address).await?))
}
