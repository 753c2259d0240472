//! Property: the tokenized real-estate asset that shards are carved from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{address::Address, amount::Amount};

/// Lifecycle of a property along the shard-ownership dimension.
///
/// `Pending → Verified` when the on-chain registration confirms,
/// `Verified → Fractionalised` on mint, and back to `Verified` on unlock.
/// Burning every shard leaves the property `Fractionalised` with no supply.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
  Pending,
  Verified,
  Fractionalised,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
  pub property_id:       Uuid,
  pub title:             String,
  pub description:       String,
  pub valuation:         Amount,
  /// Address of the NFT contract the property token lives in.
  pub nft_address:       Address,
  /// Assigned by the contract when registration confirms.
  pub token_id:          Option<String>,
  pub image_url:         Option<String>,
  pub status:            PropertyStatus,
  /// Identity of the user who registered the property.
  pub owner_id:          String,
  /// Shards currently in existence: minted minus burned.
  pub shard_supply:      u64,
  /// When the property was minted. Never cleared: a property is
  /// fractionalised at most once.
  pub fractionalised_at: Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
}

impl Property {
  pub fn is_fractionalised(&self) -> bool {
    self.status == PropertyStatus::Fractionalised
  }

  /// `true` once the property has been minted, even if it was later unlocked
  /// or burned down to nothing.
  pub fn was_fractionalised(&self) -> bool { self.fractionalised_at.is_some() }
}

/// Input to [`crate::store::LedgerStore::insert_pending_property`].
#[derive(Debug, Clone)]
pub struct NewProperty {
  pub title:       String,
  pub description: String,
  pub valuation:   Amount,
  pub nft_address: Address,
  pub image_url:   Option<String>,
  pub owner_id:    String,
}
