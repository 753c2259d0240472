//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`) so they
//! sort lexically. Amounts are stored as their raw 10⁻¹⁸ unit count in
//! decimal. UUIDs are hyphenated lowercase strings. Counts are `INTEGER`.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use shard_core::{
  address::{Address, TxHash},
  amount::Amount,
  audit::{Transaction, TransactionKind},
  fraction::{Fraction, SellProposal},
  operation::{ChainOperation, OperationStatus},
  property::{Property, PropertyStatus},
  wallet::Wallet,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode { column: "timestamp", reason: e.to_string() })
}

pub fn encode_amount(a: Amount) -> String { a.raw().to_string() }

pub fn decode_amount(s: &str) -> Result<Amount> {
  s.parse::<u128>()
    .map(Amount::from_raw)
    .map_err(|e| Error::Decode { column: "amount", reason: e.to_string() })
}

pub fn encode_count(n: u64) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::Core(shard_core::Error::Overflow))
}

pub fn decode_count(n: i64) -> Result<u64> {
  u64::try_from(n)
    .map_err(|_| Error::Decode { column: "count", reason: format!("negative value {n}") })
}

fn decode_address(s: &str) -> Result<Address> {
  s.parse()
    .map_err(|_| Error::Decode { column: "address", reason: s.to_owned() })
}

fn decode_tx_hash(s: &str) -> Result<TxHash> {
  s.parse()
    .map_err(|_| Error::Decode { column: "tx_hash", reason: s.to_owned() })
}

fn decode_enum<T: std::str::FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode { column, reason: format!("unknown value {s:?}") })
}

// ─── Wallet ──────────────────────────────────────────────────────────────────

pub const WALLET_COLUMNS: &str = "wallet_id, address, user_id, created_at";

pub struct RawWallet {
  pub wallet_id:  String,
  pub address:    String,
  pub user_id:    String,
  pub created_at: String,
}

impl RawWallet {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      wallet_id:  row.get(0)?,
      address:    row.get(1)?,
      user_id:    row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_wallet(self) -> Result<Wallet> {
    Ok(Wallet {
      wallet_id:  decode_uuid(&self.wallet_id)?,
      address:    decode_address(&self.address)?,
      user_id:    self.user_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Property ────────────────────────────────────────────────────────────────

pub const PROPERTY_COLUMNS: &str = "property_id, title, description, valuation, \
   nft_address, token_id, image_url, status, owner_id, shard_supply, created_at, \
   fractionalised_at";

pub struct RawProperty {
  pub property_id:       String,
  pub title:             String,
  pub description:       String,
  pub valuation:         String,
  pub nft_address:       String,
  pub token_id:          Option<String>,
  pub image_url:         Option<String>,
  pub status:            String,
  pub owner_id:          String,
  pub shard_supply:      i64,
  pub created_at:        String,
  pub fractionalised_at: Option<String>,
}

impl RawProperty {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      property_id:       row.get(0)?,
      title:             row.get(1)?,
      description:       row.get(2)?,
      valuation:         row.get(3)?,
      nft_address:       row.get(4)?,
      token_id:          row.get(5)?,
      image_url:         row.get(6)?,
      status:            row.get(7)?,
      owner_id:          row.get(8)?,
      shard_supply:      row.get(9)?,
      created_at:        row.get(10)?,
      fractionalised_at: row.get(11)?,
    })
  }

  pub fn into_property(self) -> Result<Property> {
    Ok(Property {
      property_id:       decode_uuid(&self.property_id)?,
      title:             self.title,
      description:       self.description,
      valuation:         decode_amount(&self.valuation)?,
      nft_address:       decode_address(&self.nft_address)?,
      token_id:          self.token_id,
      image_url:         self.image_url,
      status:            decode_enum::<PropertyStatus>("status", &self.status)?,
      owner_id:          self.owner_id,
      shard_supply:      decode_count(self.shard_supply)?,
      fractionalised_at: self.fractionalised_at.as_deref().map(decode_dt).transpose()?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

// ─── Fraction ────────────────────────────────────────────────────────────────

pub const FRACTION_COLUMNS: &str =
  "fraction_id, property_id, wallet_id, supply, token_id, created_at";

pub struct RawFraction {
  pub fraction_id: String,
  pub property_id: String,
  pub wallet_id:   String,
  pub supply:      i64,
  pub token_id:    String,
  pub created_at:  String,
}

impl RawFraction {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fraction_id: row.get(0)?,
      property_id: row.get(1)?,
      wallet_id:   row.get(2)?,
      supply:      row.get(3)?,
      token_id:    row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_fraction(self) -> Result<Fraction> {
    Ok(Fraction {
      fraction_id: decode_uuid(&self.fraction_id)?,
      property_id: decode_uuid(&self.property_id)?,
      wallet_id:   decode_uuid(&self.wallet_id)?,
      supply:      decode_count(self.supply)?,
      token_id:    self.token_id,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── SellProposal ────────────────────────────────────────────────────────────

pub const PROPOSAL_COLUMNS: &str = "proposal_id, property_id, fraction_id, \
   wallet_id, shards_for_sale, remaining, price_per_shard, executed, \
   chain_proposal_id, created_at";

pub struct RawProposal {
  pub proposal_id:       String,
  pub property_id:       String,
  pub fraction_id:       String,
  pub wallet_id:         String,
  pub shards_for_sale:   i64,
  pub remaining:         i64,
  pub price_per_shard:   String,
  pub executed:          bool,
  pub chain_proposal_id: Option<String>,
  pub created_at:        String,
}

impl RawProposal {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      proposal_id:       row.get(0)?,
      property_id:       row.get(1)?,
      fraction_id:       row.get(2)?,
      wallet_id:         row.get(3)?,
      shards_for_sale:   row.get(4)?,
      remaining:         row.get(5)?,
      price_per_shard:   row.get(6)?,
      executed:          row.get(7)?,
      chain_proposal_id: row.get(8)?,
      created_at:        row.get(9)?,
    })
  }

  pub fn into_proposal(self) -> Result<SellProposal> {
    Ok(SellProposal {
      proposal_id:       decode_uuid(&self.proposal_id)?,
      property_id:       decode_uuid(&self.property_id)?,
      fraction_id:       decode_uuid(&self.fraction_id)?,
      wallet_id:         decode_uuid(&self.wallet_id)?,
      shards_for_sale:   decode_count(self.shards_for_sale)?,
      remaining:         decode_count(self.remaining)?,
      price_per_shard:   decode_amount(&self.price_per_shard)?,
      executed:          self.executed,
      chain_proposal_id: self.chain_proposal_id,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

pub const TRANSACTION_COLUMNS: &str = "transaction_id, wallet_id, property_id, \
   fraction_id, kind, amount, value, tx_hash, created_at";

pub struct RawTransaction {
  pub transaction_id: String,
  pub wallet_id:      String,
  pub property_id:    String,
  pub fraction_id:    Option<String>,
  pub kind:           String,
  pub amount:         i64,
  pub value:          Option<String>,
  pub tx_hash:        Option<String>,
  pub created_at:     String,
}

impl RawTransaction {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      transaction_id: row.get(0)?,
      wallet_id:      row.get(1)?,
      property_id:    row.get(2)?,
      fraction_id:    row.get(3)?,
      kind:           row.get(4)?,
      amount:         row.get(5)?,
      value:          row.get(6)?,
      tx_hash:        row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_transaction(self) -> Result<Transaction> {
    Ok(Transaction {
      transaction_id: decode_uuid(&self.transaction_id)?,
      wallet_id:      decode_uuid(&self.wallet_id)?,
      property_id:    decode_uuid(&self.property_id)?,
      fraction_id:    self.fraction_id.as_deref().map(decode_uuid).transpose()?,
      kind:           decode_enum::<TransactionKind>("kind", &self.kind)?,
      amount:         decode_count(self.amount)?,
      value:          self.value.as_deref().map(decode_amount).transpose()?,
      tx_hash:        self.tx_hash.as_deref().map(decode_tx_hash).transpose()?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

// ─── ChainOperation ──────────────────────────────────────────────────────────

pub const OPERATION_COLUMNS: &str = "operation_id, property_id, status, tx_hash, \
   call_json, mutation_json, block_number, detail, created_at, updated_at";

pub struct RawOperation {
  pub operation_id:  String,
  pub property_id:   String,
  pub status:        String,
  pub tx_hash:       Option<String>,
  pub call_json:     String,
  pub mutation_json: String,
  pub block_number:  Option<i64>,
  pub detail:        Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawOperation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      operation_id:  row.get(0)?,
      property_id:   row.get(1)?,
      status:        row.get(2)?,
      tx_hash:       row.get(3)?,
      call_json:     row.get(4)?,
      mutation_json: row.get(5)?,
      block_number:  row.get(6)?,
      detail:        row.get(7)?,
      created_at:    row.get(8)?,
      updated_at:    row.get(9)?,
    })
  }

  pub fn into_operation(self) -> Result<ChainOperation> {
    Ok(ChainOperation {
      operation_id: decode_uuid(&self.operation_id)?,
      property_id:  decode_uuid(&self.property_id)?,
      status:       decode_enum::<OperationStatus>("status", &self.status)?,
      tx_hash:      self.tx_hash.as_deref().map(decode_tx_hash).transpose()?,
      call:         serde_json::from_str(&self.call_json)?,
      mutation:     serde_json::from_str(&self.mutation_json)?,
      block_number: self.block_number.map(decode_count).transpose()?,
      detail:       self.detail,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}
