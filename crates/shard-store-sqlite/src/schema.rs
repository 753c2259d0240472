//! SQL schema for the Shardhold SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS wallets (
    wallet_id   TEXT PRIMARY KEY,
    address     TEXT NOT NULL UNIQUE,   -- lowercase 0x-hex
    user_id     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    property_id       TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL,
    valuation         TEXT NOT NULL,         -- raw 10^-18 units, decimal string
    nft_address       TEXT NOT NULL,
    token_id          TEXT,
    image_url         TEXT,
    status            TEXT NOT NULL,         -- 'PENDING' | 'VERIFIED' | 'FRACTIONALISED'
    owner_id          TEXT NOT NULL,
    shard_supply      INTEGER NOT NULL DEFAULT 0 CHECK (shard_supply >= 0),
    fractionalised_at TEXT,                  -- first mint; never cleared
    created_at        TEXT NOT NULL
);

-- One row per (property, wallet). Empty holdings are deleted, never kept.
CREATE TABLE IF NOT EXISTS fractions (
    fraction_id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(property_id),
    wallet_id   TEXT NOT NULL REFERENCES wallets(wallet_id),
    supply      INTEGER NOT NULL CHECK (supply > 0),
    token_id    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (property_id, wallet_id)
);

-- fraction_id is not a foreign key: the seller's row may be
-- deleted once its whole supply is escrowed or transferred.
CREATE TABLE IF NOT EXISTS sell_proposals (
    proposal_id       TEXT PRIMARY KEY,
    property_id       TEXT NOT NULL REFERENCES properties(property_id),
    fraction_id       TEXT NOT NULL,
    wallet_id         TEXT NOT NULL REFERENCES wallets(wallet_id),
    shards_for_sale   INTEGER NOT NULL CHECK (shards_for_sale > 0),
    remaining         INTEGER NOT NULL,
    price_per_shard   TEXT NOT NULL,
    executed          INTEGER NOT NULL,
    chain_proposal_id TEXT,
    created_at        TEXT NOT NULL,
    CHECK (remaining >= 0 AND remaining <= shards_for_sale),
    CHECK (executed = (remaining = 0))
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against it.
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id TEXT PRIMARY KEY,
    wallet_id      TEXT NOT NULL REFERENCES wallets(wallet_id),
    property_id    TEXT NOT NULL REFERENCES properties(property_id),
    fraction_id    TEXT,
    kind           TEXT NOT NULL,
    amount         INTEGER NOT NULL,
    value          TEXT,
    tx_hash        TEXT,
    created_at     TEXT NOT NULL
);

-- Durable record of every chain submission; tx_hash is the idempotency key
-- for mirroring it into the tables above.
CREATE TABLE IF NOT EXISTS chain_operations (
    operation_id  TEXT PRIMARY KEY,
    property_id   TEXT NOT NULL,
    status        TEXT NOT NULL,        -- see OperationStatus
    tx_hash       TEXT UNIQUE,
    call_json     TEXT NOT NULL,
    mutation_json TEXT NOT NULL,
    block_number  INTEGER,
    detail        TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS fractions_property_idx    ON fractions(property_id);
CREATE INDEX IF NOT EXISTS fractions_wallet_idx      ON fractions(wallet_id);
CREATE INDEX IF NOT EXISTS proposals_property_idx    ON sell_proposals(property_id);
CREATE INDEX IF NOT EXISTS transactions_wallet_idx   ON transactions(wallet_id);
CREATE INDEX IF NOT EXISTS transactions_property_idx ON transactions(property_id);
CREATE INDEX IF NOT EXISTS operations_status_idx     ON chain_operations(status);

PRAGMA user_version = 1;
";
