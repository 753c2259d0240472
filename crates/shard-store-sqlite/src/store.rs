//! [`SqliteStore`]: the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, Row, params};
use uuid::Uuid;

use shard_core::{
  address::{Address, TxHash},
  audit::Transaction,
  fraction::{Fraction, SellProposal, SupplySummary},
  operation::{
    ChainOperation, Confirmation, Mutation, NewOperation, OperationStatus,
    Outcome,
  },
  property::{NewProperty, Property, PropertyStatus},
  store::{LedgerStore, Page, Paginated, ProposalFilter, TransactionFilter},
  wallet::Wallet,
};

use crate::{
  Error, Result, apply,
  encode::{
    FRACTION_COLUMNS, OPERATION_COLUMNS, PROPERTY_COLUMNS, PROPOSAL_COLUMNS,
    RawFraction, RawOperation, RawProperty, RawProposal, RawTransaction,
    RawWallet, TRANSACTION_COLUMNS, WALLET_COLUMNS, decode_count, encode_amount,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

type Domain = shard_core::Error;

const UNSETTLED: &[OperationStatus] =
  &[OperationStatus::Preparing, OperationStatus::Submitted];

// ─── Store ───────────────────────────────────────────────────────────────────

/// A shard ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Move an operation in one of the `from` states to `to`.
  async fn settle(
    &self,
    operation_id: Uuid,
    from: &[OperationStatus],
    to: OperationStatus,
    tx_hash: Option<String>,
    detail: Option<String>,
  ) -> Result<()> {
    let id = encode_uuid(operation_id);
    let now = encode_dt(Utc::now());
    let to = to.to_string();
    let allowed = from
      .iter()
      .map(|s| format!("'{s}'"))
      .collect::<Vec<_>>()
      .join(", ");

    let (changed, exists) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE chain_operations
                SET status = ?1,
                    tx_hash = COALESCE(?2, tx_hash),
                    detail = COALESCE(?3, detail),
                    updated_at = ?4
              WHERE operation_id = ?5 AND status IN ({allowed})"
          ),
          params![to, tx_hash, detail, now, id],
        )?;
        let exists = conn
          .query_row(
            "SELECT 1 FROM chain_operations WHERE operation_id = ?1",
            params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok((changed, exists))
      })
      .await?;

    match (changed, exists) {
      (1, _) => Ok(()),
      (_, false) => Err(Domain::OperationNotFound(operation_id).into()),
      (_, true) => Err(Domain::InvalidOperationState(operation_id).into()),
    }
  }
}

fn to_sql_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn select_all<T>(
  conn: &rusqlite::Connection,
  sql: &str,
  args: impl rusqlite::Params,
  map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(args, map)?.collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

enum Connect {
  Found(RawWallet),
  Claimed,
}

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Wallets ───────────────────────────────────────────────────────────────

  async fn connect_wallet(&self, user_id: String, address: Address) -> Result<Wallet> {
    let address_str = address.to_string();
    let new_id = encode_uuid(Uuid::new_v4());
    let now = encode_dt(Utc::now());

    let found = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE address = ?1");
        let existing = conn
          .query_row(&sql, params![address_str], RawWallet::from_row)
          .optional()?;

        match existing {
          Some(raw) if raw.user_id == user_id => return Ok(Connect::Found(raw)),
          Some(_) => return Ok(Connect::Claimed),
          None => {}
        }

        conn.execute(
          "INSERT INTO wallets (wallet_id, address, user_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![new_id, address_str, user_id, now],
        )?;
        Ok(Connect::Found(RawWallet {
          wallet_id:  new_id,
          address:    address_str,
          user_id,
          created_at: now,
        }))
      })
      .await?;

    match found {
      Connect::Found(raw) => raw.into_wallet(),
      Connect::Claimed => Err(Domain::WalletClaimed(address.to_string()).into()),
    }
  }

  async fn find_wallet(&self, address: &Address) -> Result<Option<Wallet>> {
    let address = address.to_string();
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE address = ?1");
        Ok(conn.query_row(&sql, params![address], RawWallet::from_row).optional()?)
      })
      .await?;
    raw.map(RawWallet::into_wallet).transpose()
  }

  async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>> {
    let user_id = user_id.to_owned();
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {WALLET_COLUMNS} FROM wallets
            WHERE user_id = ?1 ORDER BY created_at, rowid"
        );
        Ok(select_all(conn, &sql, params![user_id], RawWallet::from_row)?)
      })
      .await?;
    raws.into_iter().map(RawWallet::into_wallet).collect()
  }

  // ── Properties ────────────────────────────────────────────────────────────

  async fn insert_pending_property(&self, input: NewProperty) -> Result<Property> {
    if input.title.trim().is_empty() {
      return Err(Domain::EmptyField("title").into());
    }
    if input.owner_id.trim().is_empty() {
      return Err(Domain::EmptyField("owner_id").into());
    }

    let property = Property {
      property_id:       Uuid::new_v4(),
      title:             input.title,
      description:       input.description,
      valuation:         input.valuation,
      nft_address:       input.nft_address,
      token_id:          None,
      image_url:         input.image_url,
      status:            PropertyStatus::Pending,
      owner_id:          input.owner_id,
      shard_supply:      0,
      fractionalised_at: None,
      created_at:        Utc::now(),
    };

    let id_str      = encode_uuid(property.property_id);
    let title       = property.title.clone();
    let description = property.description.clone();
    let valuation   = encode_amount(property.valuation);
    let nft_address = property.nft_address.to_string();
    let image_url   = property.image_url.clone();
    let status      = property.status.to_string();
    let owner_id    = property.owner_id.clone();
    let at_str      = encode_dt(property.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO properties (
             property_id, title, description, valuation, nft_address,
             image_url, status, owner_id, shard_supply, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
          params![
            id_str,
            title,
            description,
            valuation,
            nft_address,
            image_url,
            status,
            owner_id,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(property)
  }

  async fn get_property(&self, property_id: Uuid) -> Result<Option<Property>> {
    let id = encode_uuid(property_id);
    let raw = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE property_id = ?1");
        Ok(conn.query_row(&sql, params![id], RawProperty::from_row).optional()?)
      })
      .await?;
    raw.map(RawProperty::into_property).transpose()
  }

  async fn list_properties(&self, page: Page) -> Result<Paginated<Property>> {
    let limit = i64::from(page.limit);
    let offset = to_sql_count(page.offset());

    let (raws, total): (Vec<RawProperty>, i64) = self
      .conn
      .call(move |conn| {
        let total = conn.query_row("SELECT COUNT(*) FROM properties", [], |r| r.get(0))?;
        let sql = format!(
          "SELECT {PROPERTY_COLUMNS} FROM properties
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2"
        );
        let rows = select_all(conn, &sql, params![limit, offset], RawProperty::from_row)?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawProperty::into_property)
      .collect::<Result<Vec<_>>>()?;
    Ok(Paginated::new(items, page, decode_count(total)?))
  }

  // ── Fractions ─────────────────────────────────────────────────────────────

  async fn get_fraction(&self, fraction_id: Uuid) -> Result<Option<Fraction>> {
    let id = encode_uuid(fraction_id);
    let raw = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {FRACTION_COLUMNS} FROM fractions WHERE fraction_id = ?1");
        Ok(conn.query_row(&sql, params![id], RawFraction::from_row).optional()?)
      })
      .await?;
    raw.map(RawFraction::into_fraction).transpose()
  }

  async fn list_fractions(&self, property_id: Uuid) -> Result<Vec<Fraction>> {
    let id = encode_uuid(property_id);
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {FRACTION_COLUMNS} FROM fractions
            WHERE property_id = ?1 ORDER BY created_at, rowid"
        );
        Ok(select_all(conn, &sql, params![id], RawFraction::from_row)?)
      })
      .await?;
    raws.into_iter().map(RawFraction::into_fraction).collect()
  }

  async fn list_holdings(&self, wallet_id: Uuid) -> Result<Vec<Fraction>> {
    let id = encode_uuid(wallet_id);
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {FRACTION_COLUMNS} FROM fractions
            WHERE wallet_id = ?1 ORDER BY created_at, rowid"
        );
        Ok(select_all(conn, &sql, params![id], RawFraction::from_row)?)
      })
      .await?;
    raws.into_iter().map(RawFraction::into_fraction).collect()
  }

  async fn find_holding(
    &self,
    property_id: Uuid,
    wallet_id: Uuid,
  ) -> Result<Option<Fraction>> {
    let pid = encode_uuid(property_id);
    let wid = encode_uuid(wallet_id);
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {FRACTION_COLUMNS} FROM fractions
            WHERE property_id = ?1 AND wallet_id = ?2"
        );
        Ok(conn.query_row(&sql, params![pid, wid], RawFraction::from_row).optional()?)
      })
      .await?;
    raw.map(RawFraction::into_fraction).transpose()
  }

  async fn supply_summary(&self, property_id: Uuid) -> Result<Option<SupplySummary>> {
    let id = encode_uuid(property_id);

    let row: Option<(i64, i64, i64, i64, i64)> = self
      .conn
      .call(move |conn| {
        let shard_supply: Option<i64> = conn
          .query_row(
            "SELECT shard_supply FROM properties WHERE property_id = ?1",
            params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(shard_supply) = shard_supply else {
          return Ok(None);
        };

        let (held, holders): (i64, i64) = conn.query_row(
          "SELECT COALESCE(SUM(supply), 0), COUNT(*)
             FROM fractions WHERE property_id = ?1",
          params![id],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let (escrowed, open): (i64, i64) = conn.query_row(
          "SELECT COALESCE(SUM(remaining), 0), COUNT(*)
             FROM sell_proposals
            WHERE property_id = ?1 AND executed = 0 AND remaining > 0",
          params![id],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(Some((shard_supply, held, holders, escrowed, open)))
      })
      .await?;

    let Some((shard_supply, held, holders, escrowed, open)) = row else {
      return Ok(None);
    };
    Ok(Some(SupplySummary {
      property_id,
      shard_supply:   decode_count(shard_supply)?,
      held:           decode_count(held)?,
      escrowed:       decode_count(escrowed)?,
      holders:        usize::try_from(holders).unwrap_or_default(),
      open_proposals: usize::try_from(open).unwrap_or_default(),
    }))
  }

  // ── Sell proposals ────────────────────────────────────────────────────────

  async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<SellProposal>> {
    let id = encode_uuid(proposal_id);
    let raw = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {PROPOSAL_COLUMNS} FROM sell_proposals WHERE proposal_id = ?1");
        Ok(conn.query_row(&sql, params![id], RawProposal::from_row).optional()?)
      })
      .await?;
    raw.map(RawProposal::into_proposal).transpose()
  }

  async fn list_proposals(
    &self,
    filter: ProposalFilter,
    page: Page,
  ) -> Result<Paginated<SellProposal>> {
    let property = filter.property_id.map(encode_uuid);
    let open_only = filter.open_only;
    let limit = i64::from(page.limit);
    let offset = to_sql_count(page.offset());

    let (raws, total): (Vec<RawProposal>, i64) = self
      .conn
      .call(move |conn| {
        let cond = "(?1 IS NULL OR property_id = ?1)
                AND (?2 = 0 OR (executed = 0 AND remaining > 0))";
        let total = conn.query_row(
          &format!("SELECT COUNT(*) FROM sell_proposals WHERE {cond}"),
          params![property, open_only],
          |r| r.get(0),
        )?;
        let sql = format!(
          "SELECT {PROPOSAL_COLUMNS} FROM sell_proposals
            WHERE {cond}
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4"
        );
        let rows = select_all(
          conn,
          &sql,
          params![property, open_only, limit, offset],
          RawProposal::from_row,
        )?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawProposal::into_proposal)
      .collect::<Result<Vec<_>>>()?;
    Ok(Paginated::new(items, page, decode_count(total)?))
  }

  // ── Audit trail ───────────────────────────────────────────────────────────

  async fn list_transactions(
    &self,
    filter: TransactionFilter,
    page: Page,
  ) -> Result<Paginated<Transaction>> {
    let wallet = filter.wallet_id.map(encode_uuid);
    let property = filter.property_id.map(encode_uuid);
    let limit = i64::from(page.limit);
    let offset = to_sql_count(page.offset());

    let (raws, total): (Vec<RawTransaction>, i64) = self
      .conn
      .call(move |conn| {
        let cond = "(?1 IS NULL OR wallet_id = ?1) AND (?2 IS NULL OR property_id = ?2)";
        let total = conn.query_row(
          &format!("SELECT COUNT(*) FROM transactions WHERE {cond}"),
          params![wallet, property],
          |r| r.get(0),
        )?;
        let sql = format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE {cond}
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4"
        );
        let rows = select_all(
          conn,
          &sql,
          params![wallet, property, limit, offset],
          RawTransaction::from_row,
        )?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawTransaction::into_transaction)
      .collect::<Result<Vec<_>>>()?;
    Ok(Paginated::new(items, page, decode_count(total)?))
  }

  // ── Chain operations ──────────────────────────────────────────────────────

  async fn begin_operation(&self, input: NewOperation) -> Result<ChainOperation> {
    let now = Utc::now();
    let op = ChainOperation {
      operation_id: Uuid::new_v4(),
      property_id:  input.property_id,
      status:       OperationStatus::Preparing,
      tx_hash:      None,
      call:         input.call,
      mutation:     input.mutation,
      block_number: None,
      detail:       None,
      created_at:   now,
      updated_at:   now,
    };

    let id = encode_uuid(op.operation_id);
    let property_id = encode_uuid(op.property_id);
    let status = op.status.to_string();
    let call_json = serde_json::to_string(&op.call)?;
    let mutation_json = serde_json::to_string(&op.mutation)?;
    let at = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO chain_operations (
             operation_id, property_id, status, call_json, mutation_json,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![id, property_id, status, call_json, mutation_json, at],
        )?;
        Ok(())
      })
      .await?;

    Ok(op)
  }

  async fn mark_submitted(&self, operation_id: Uuid, tx_hash: TxHash) -> Result<()> {
    self
      .settle(
        operation_id,
        &[OperationStatus::Preparing],
        OperationStatus::Submitted,
        Some(tx_hash.to_string()),
        None,
      )
      .await
  }

  async fn mark_failed(&self, operation_id: Uuid, detail: String) -> Result<()> {
    self
      .settle(operation_id, UNSETTLED, OperationStatus::Failed, None, Some(detail))
      .await
  }

  async fn mark_diverged(&self, operation_id: Uuid, detail: String) -> Result<()> {
    self
      .settle(operation_id, UNSETTLED, OperationStatus::Diverged, None, Some(detail))
      .await
  }

  async fn get_operation(&self, operation_id: Uuid) -> Result<Option<ChainOperation>> {
    let id = encode_uuid(operation_id);
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {OPERATION_COLUMNS} FROM chain_operations WHERE operation_id = ?1"
        );
        Ok(conn.query_row(&sql, params![id], RawOperation::from_row).optional()?)
      })
      .await?;
    raw.map(RawOperation::into_operation).transpose()
  }

  async fn unsettled_operations(&self) -> Result<Vec<ChainOperation>> {
    let preparing = OperationStatus::Preparing.to_string();
    let submitted = OperationStatus::Submitted.to_string();
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {OPERATION_COLUMNS} FROM chain_operations
            WHERE status IN (?1, ?2) ORDER BY created_at, rowid"
        );
        Ok(select_all(conn, &sql, params![preparing, submitted], RawOperation::from_row)?)
      })
      .await?;
    raws.into_iter().map(RawOperation::into_operation).collect()
  }

  async fn open_operations(&self, property_id: Uuid) -> Result<usize> {
    let id = encode_uuid(property_id);
    let preparing = OperationStatus::Preparing.to_string();
    let submitted = OperationStatus::Submitted.to_string();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM chain_operations
            WHERE property_id = ?1 AND status IN (?2, ?3)",
          params![id, preparing, submitted],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(n).unwrap_or_default())
  }

  // ── Mutation ──────────────────────────────────────────────────────────────

  async fn apply(
    &self,
    mutation: Mutation,
    confirmation: Option<Confirmation>,
  ) -> Result<Outcome> {
    self
      .conn
      .call(move |conn| Ok(apply::run(conn, mutation, confirmation)))
      .await?
  }
}
