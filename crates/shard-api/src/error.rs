//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use shard_core::ErrorKind;
use shard_ledger::Error as LedgerError;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("no authenticated caller")]
  Unauthorized,
}

impl From<shard_core::Error> for ApiError {
  fn from(err: shard_core::Error) -> Self { Self::Ledger(err.into()) }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl ApiError {
  fn parts(&self) -> (StatusCode, &'static str, Value) {
    let message = self.to_string();
    match self {
      Self::BadRequest(_) => (
        StatusCode::BAD_REQUEST,
        "validation",
        json!({ "error": message }),
      ),
      Self::Unauthorized => (
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        json!({ "error": message }),
      ),
      Self::Ledger(err) => ledger_parts(err, message),
    }
  }
}

fn ledger_parts(err: &LedgerError, message: String) -> (StatusCode, &'static str, Value) {
  match err {
    LedgerError::Domain(rule) => {
      let (status, kind) = match rule.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Conflict => (StatusCode::BAD_REQUEST, "conflict"),
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
      };
      (status, kind, json!({ "error": message }))
    }
    LedgerError::Pending { operation_id, tx_hash } => (
      StatusCode::ACCEPTED,
      "pending",
      json!({
        "message":      "transaction submitted, awaiting confirmation",
        "operation_id": operation_id,
        "tx_hash":      tx_hash,
      }),
    ),
    LedgerError::Reverted { operation_id, tx_hash, .. } => (
      StatusCode::BAD_GATEWAY,
      "chain",
      json!({
        "error":        message,
        "operation_id": operation_id,
        "tx_hash":      tx_hash,
      }),
    ),
    LedgerError::Chain(_) => (StatusCode::BAD_GATEWAY, "chain", json!({ "error": message })),
    LedgerError::Reconciliation { operation_id, tx_hash, .. } => (
      StatusCode::INTERNAL_SERVER_ERROR,
      "reconciliation",
      json!({
        "error":        message,
        "operation_id": operation_id,
        "tx_hash":      tx_hash,
      }),
    ),
    LedgerError::Store(_) => (
      StatusCode::INTERNAL_SERVER_ERROR,
      "internal",
      json!({ "error": message }),
    ),
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind, mut body) = self.parts();
    if status.is_server_error() {
      error!(kind, error = %self, "request failed");
    }
    body["kind"] = kind.into();
    (status, Json(body)).into_response()
  }
}
