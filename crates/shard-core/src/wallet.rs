//! Wallet: an on-chain account connected by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;

/// Every ledger row that refers to a holder stores `wallet_id`, never the raw
/// address; addresses are resolved to wallets at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
  pub wallet_id:  Uuid,
  pub address:    Address,
  pub user_id:    String,
  pub created_at: DateTime<Utc>,
}
