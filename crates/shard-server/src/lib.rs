//! HTTP server for the Shardhold ledger.
//!
//! Wraps the [`shard_api`] router in Basic auth and request tracing, selects a
//! chain gateway from configuration, and runs the background reconciler.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Json, Router, middleware, routing::get};
use serde::Deserialize;
use serde_json::{Value, json};
use shard_chain::{AnyChain, RelayConfig, RelayGateway, SimulatedChain};
use shard_core::{chain::ChainGateway, store::LedgerStore};
use shard_ledger::{ConfirmPolicy, Ledger};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SHARD_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                    String,
  #[serde(default = "default_port")]
  pub port:                    u16,
  pub database_path:           PathBuf,
  pub auth_username:           String,
  pub auth_password_hash:      String,
  #[serde(default)]
  pub chain:                   ChainConfig,
  #[serde(default)]
  pub confirmation:            ConfirmationConfig,
  #[serde(default = "default_reconcile_interval")]
  pub reconcile_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_reconcile_interval() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
  #[default]
  Simulated,
  Relay,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
  pub mode:                 ChainMode,
  pub relay_url:            Option<String>,
  pub api_token:            Option<String>,
  pub request_timeout_secs: u64,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      mode:                 ChainMode::Simulated,
      relay_url:            None,
      api_token:            None,
      request_timeout_secs: 10,
    }
  }
}

impl ChainConfig {
  /// Build the configured gateway.
  pub fn gateway(&self) -> Result<AnyChain, Error> {
    match self.mode {
      ChainMode::Simulated => Ok(AnyChain::Simulated(SimulatedChain::new())),
      ChainMode::Relay => {
        let base_url = self
          .relay_url
          .clone()
          .ok_or_else(|| Error::Config("chain.relay_url is required in relay mode".into()))?;
        let gateway = RelayGateway::new(RelayConfig {
          base_url,
          api_token: self.api_token.clone(),
          request_timeout: Duration::from_secs(self.request_timeout_secs),
        })?;
        Ok(AnyChain::Relay(gateway))
      }
    }
  }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConfirmationConfig {
  pub timeout_secs:     u64,
  pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
  fn default() -> Self {
    let policy = ConfirmPolicy::default();
    Self {
      timeout_secs:     policy.timeout.as_secs(),
      poll_interval_ms: policy.poll_interval.as_millis() as u64,
    }
  }
}

impl From<&ConfirmationConfig> for ConfirmPolicy {
  fn from(cfg: &ConfirmationConfig) -> Self {
    ConfirmPolicy {
      timeout:       Duration::from_secs(cfg.timeout_secs),
      poll_interval: Duration::from_millis(cfg.poll_interval_ms),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: `/health` plus the authenticated API
/// under `/api`.
pub fn router<S, G>(ledger: Arc<Ledger<S, G>>, auth: Arc<AuthConfig>) -> Router
where
  S: LedgerStore + 'static,
  G: ChainGateway + 'static,
{
  let api = shard_api::api_router(ledger)
    .layer(middleware::from_fn_with_state(auth, require_auth));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Run [`Ledger::reconcile_pending`] now and then every `every`.
pub fn spawn_reconciler<S, G>(ledger: Arc<Ledger<S, G>>, every: Duration) -> JoinHandle<()>
where
  S: LedgerStore + 'static,
  G: ChainGateway + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match ledger.reconcile_pending().await {
        Ok(report) if report.diverged > 0 => {
          warn!(diverged = report.diverged, "operations need operator review");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "reconciliation pass failed"),
      }
    }
  })
}

/// Log the effective configuration, minus secrets.
pub fn log_config(cfg: &ServerConfig) {
  info!(
    host = %cfg.host,
    port = cfg.port,
    database = %cfg.database_path.display(),
    chain = ?cfg.chain.mode,
    confirm_timeout_secs = cfg.confirmation.timeout_secs,
    reconcile_interval_secs = cfg.reconcile_interval_secs,
    "configuration loaded"
  );
}

// ─── Integration tests ────────────────────────────────────────────────────────
