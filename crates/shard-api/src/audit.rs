//! Handlers for the audit trail and chain operations.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/transactions` | `?wallet_address=&property_id=&page=&limit=`, newest first |
//! | `GET`  | `/operations/{id}` | Status of one chain operation |

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use shard_core::{
  address::Address,
  audit::Transaction,
  chain::ChainGateway,
  operation::ChainOperation,
  store::{LedgerStore, Paginated, TransactionFilter},
};
use shard_ledger::Ledger;
use uuid::Uuid;

use crate::{
  error::ApiError,
  extract::{PageParams, PathParam, QueryParams},
};

#[derive(Debug, Deserialize)]
pub struct TransactionParams {
  pub page:           Option<u32>,
  pub limit:          Option<u32>,
  pub wallet_address: Option<Address>,
  pub property_id:    Option<Uuid>,
}

/// `GET /transactions`
pub async fn transactions<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  QueryParams(params): QueryParams<TransactionParams>,
) -> Result<Json<Paginated<Transaction>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let page = PageParams { page: params.page, limit: params.limit }.page()?;
  let wallet_id = match &params.wallet_address {
    Some(address) => Some(ledger.wallet(address).await?.wallet_id),
    None => None,
  };
  let filter = TransactionFilter { wallet_id, property_id: params.property_id };
  Ok(Json(ledger.transactions(filter, page).await?))
}

/// `GET /operations/{id}`
pub async fn operation<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<ChainOperation>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.get_operation(id).await?))
}
