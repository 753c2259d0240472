//! JSON-over-HTTP gateway to a signing relay.
//!
//! The relay holds the signing key and broadcasts transactions; this side
//! only speaks two endpoints:
//!
//! - `POST {base}/tx` with a [`ChainCall`] body, answered by
//!   `{"tx_hash": "0x…"}`
//! - `GET {base}/tx/{hash}`, answered by a [`TxStatus`]

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use shard_core::{
  address::TxHash,
  chain::{ChainCall, ChainGateway, TxStatus},
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// Connection settings for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
  pub base_url:        String,
  /// Sent as a bearer token when set.
  pub api_token:       Option<String>,
  pub request_timeout: Duration,
}

#[derive(Deserialize)]
struct Submitted {
  tx_hash: TxHash,
}

/// Gateway that forwards calls to a signing relay.
///
/// Submissions are serialised so the relay sees them in the order this
/// process issued them; status polls run concurrently.
pub struct RelayGateway {
  client: Client,
  config: RelayConfig,
  submit: Mutex<()>,
}

impl RelayGateway {
  pub fn new(config: RelayConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.request_timeout).build()?;
    Ok(Self { client, config, submit: Mutex::new(()) })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.config.api_token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  async fn checked(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Relay { status: status.as_u16(), body })
  }
}

impl ChainGateway for RelayGateway {
  type Error = Error;

  async fn submit(&self, call: ChainCall) -> Result<TxHash> {
    let _order = self.submit.lock().await;
    let resp = self
      .auth(self.client.post(self.url("/tx")))
      .json(&call)
      .send()
      .await?;
    let body: Submitted = Self::checked(resp).await?.json().await?;
    debug!(method = call.method(), tx_hash = %body.tx_hash, "relay accepted call");
    Ok(body.tx_hash)
  }

  async fn status(&self, tx_hash: &TxHash) -> Result<TxStatus> {
    let resp = self
      .auth(self.client.get(self.url(&format!("/tx/{tx_hash}"))))
      .send()
      .await?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(Error::UnknownTransaction(tx_hash.clone()));
    }
    let text = Self::checked(resp).await?.text().await?;
    serde_json::from_str(&text).map_err(|e| Error::InvalidResponse(e.to_string()))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
