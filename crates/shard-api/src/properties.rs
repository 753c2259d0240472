//! Handlers for `/properties` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/properties` | Registers on-chain; 201 once verified |
//! | `GET`  | `/properties` | `?page=&limit=` |
//! | `GET`  | `/properties/{id}` | |
//! | `GET`  | `/properties/{id}/fractions` | Holdings, oldest first |
//! | `GET`  | `/properties/{id}/supply` | Held and escrowed totals |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use shard_core::{
  chain::ChainGateway,
  fraction::{Fraction, SupplySummary},
  property::Property,
  store::{LedgerStore, Paginated},
};
use shard_ledger::{Ledger, RegisterProperty};
use uuid::Uuid;

use crate::{
  error::ApiError,
  extract::{Caller, JsonBody, PageParams, PathParam, QueryParams},
};

/// `POST /properties`
pub async fn register<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  Caller(user): Caller,
  JsonBody(body): JsonBody<RegisterProperty>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger.register_property(&user, body).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({
      "property":     settled.value,
      "tx_hash":      settled.tx_hash,
      "operation_id": settled.operation_id,
    })),
  ))
}

/// `GET /properties[?page=&limit=]`
pub async fn list<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  QueryParams(params): QueryParams<PageParams>,
) -> Result<Json<Paginated<Property>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.list_properties(params.page()?).await?))
}

/// `GET /properties/{id}`
pub async fn get_one<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Property>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.get_property(id).await?))
}

/// `GET /properties/{id}/fractions`
pub async fn fractions<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Vec<Fraction>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.fractions_of(id).await?))
}

/// `GET /properties/{id}/supply`
pub async fn supply<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<SupplySummary>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.supply(id).await?))
}
