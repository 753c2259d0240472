//! Handlers for `/fractions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/fractions/mint` | 201 with the new holding |
//! | `POST` | `/fractions/burn` | Ledger-only; no chain call |
//! | `POST` | `/fractions/transfer` | 403 if the sender does not hold the fraction |
//! | `POST` | `/fractions/unlock` | Needs a single holder of the whole supply |
//! | `GET`  | `/fractions/{id}` | |
//!
//! Chain-backed calls answer 202 with the operation id when the transaction
//! has not confirmed in time.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use shard_core::{chain::ChainGateway, fraction::Fraction, store::LedgerStore};
use shard_ledger::{BurnRequest, Ledger, MintRequest, TransferRequest, UnlockRequest};
use uuid::Uuid;

use crate::{
  error::ApiError,
  extract::{JsonBody, PathParam},
};

/// `POST /fractions/mint`
pub async fn mint<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  JsonBody(body): JsonBody<MintRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger.mint(body).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({
      "fraction":     settled.value,
      "tx_hash":      settled.tx_hash,
      "operation_id": settled.operation_id,
    })),
  ))
}

/// `POST /fractions/burn`
pub async fn burn<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  JsonBody(body): JsonBody<BurnRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let amount = body.amount;
  let (property, remaining) = ledger.burn(body).await?;
  Ok(Json(json!({
    "message":  format!("burned {amount} shards"),
    "property": property,
    "fraction": remaining,
  })))
}

/// `POST /fractions/transfer`
pub async fn transfer<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  JsonBody(body): JsonBody<TransferRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger.transfer(body).await?;
  let (sender, receiver) = settled.value;
  Ok(Json(json!({
    "tx_hash":      settled.tx_hash,
    "operation_id": settled.operation_id,
    "sender":       sender,
    "receiver":     receiver,
  })))
}

/// `POST /fractions/unlock`
pub async fn unlock<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  JsonBody(body): JsonBody<UnlockRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger.unlock(body).await?;
  Ok(Json(json!({
    "tx_hash":      settled.tx_hash,
    "operation_id": settled.operation_id,
    "property":     settled.value,
  })))
}

/// `GET /fractions/{id}`
pub async fn get_one<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Fraction>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.get_fraction(id).await?))
}
