//! Handlers for `/sell-proposals` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sell-proposals` | Escrows the offered shards |
//! | `GET`  | `/sell-proposals` | `?page=&limit=&property_id=&open=true`, newest first |
//! | `GET`  | `/sell-proposals/{id}` | |
//! | `POST` | `/sell-proposals/{id}/buy` | Body: `{"buyer_address":"0x…","quantity":n}` |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use shard_core::{
  address::Address,
  chain::ChainGateway,
  fraction::SellProposal,
  store::{LedgerStore, Paginated, ProposalFilter},
};
use shard_ledger::{BuyRequest, Ledger, ProposalRequest};
use uuid::Uuid;

use crate::{
  error::ApiError,
  extract::{JsonBody, PageParams, PathParam, QueryParams},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /sell-proposals`
pub async fn create<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  JsonBody(body): JsonBody<ProposalRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger.create_sell_proposal(body).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({
      "proposal":     settled.value,
      "tx_hash":      settled.tx_hash,
      "operation_id": settled.operation_id,
    })),
  ))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub page:        Option<u32>,
  pub limit:       Option<u32>,
  pub property_id: Option<Uuid>,
  #[serde(default)]
  pub open:        bool,
}

/// `GET /sell-proposals`
pub async fn list<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Paginated<SellProposal>>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let page = PageParams { page: params.page, limit: params.limit }.page()?;
  let filter = ProposalFilter {
    property_id: params.property_id,
    open_only:   params.open,
  };
  Ok(Json(ledger.list_sell_proposals(filter, page).await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /sell-proposals/{id}`
pub async fn get_one<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<SellProposal>, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  Ok(Json(ledger.get_proposal(id).await?))
}

// ─── Buy ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BuyBody {
  pub buyer_address: Address,
  pub quantity:      u64,
}

/// `POST /sell-proposals/{id}/buy`
pub async fn buy<S, G>(
  State(ledger): State<Arc<Ledger<S, G>>>,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<BuyBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore,
  G: ChainGateway,
{
  let settled = ledger
    .buy_sell_proposal(BuyRequest {
      buyer_address: body.buyer_address,
      proposal_id:   id,
      quantity:      body.quantity,
    })
    .await?;
  let (proposal, fraction) = settled.value;
  Ok(Json(json!({
    "proposal":     proposal,
    "fraction":     fraction,
    "tx_hash":      settled.tx_hash,
    "operation_id": settled.operation_id,
  })))
}
