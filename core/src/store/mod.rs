//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Ingestion, the simulator and the valuation engine call store methods;
//! they never execute SQL directly.
//!
//! A `LedgerStore` owns exactly one connection. Callers that run
//! concurrently (request handlers, the price scheduler) each hold their
//! own handle obtained through [`LedgerStore::reopen`].

use crate::{
    error::LedgerResult,
    fixedpoint::{micros_to_units, raw_to_money},
    types::{Account, RewardId, Symbol, UserId},
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod price;
mod reward;

pub use reward::NewReward;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for a private :memory: db
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open a private in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a named in-memory database that every handle opened with the
    /// same name shares, so `reopen` sees the same rows.
    pub fn shared_memory(name: &str) -> LedgerResult<Self> {
        Self::open(&format!("file:{name}?mode=memory&cache=shared"))
    }

    /// Open another connection to the same database.
    /// For a private in-memory database this returns a new, isolated one.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_rewards_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_price_points.sql"))?;
        Ok(())
    }

    // ── Users ──────────────────────────────────────────────────

    /// Create the user unless it already exists. Returns true on insert.
    pub fn ensure_user(&self, user_id: UserId, name: &str, at: DateTime<Utc>) -> LedgerResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO app_user (user_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, name, at.timestamp_millis()],
        )?;
        Ok(inserted == 1)
    }

    pub fn user(&self, user_id: UserId) -> LedgerResult<Option<UserRow>> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id, name, created_at FROM app_user WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRow {
                        user_id:    row.get(0)?,
                        name:       row.get(1)?,
                        created_at: millis_col(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

// ── Row types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub user_id:    UserId,
    pub name:       String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEventRow {
    pub id:              RewardId,
    pub user_id:         UserId,
    pub symbol:          Symbol,
    pub units:           Decimal,
    pub event_time:      DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryRow {
    pub id:         i64,
    pub reward_id:  RewardId,
    pub user_id:    UserId,
    pub account:    Account,
    pub symbol:     Option<Symbol>,
    pub units:      Option<Decimal>,
    pub amount:     Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub meta:       serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub symbol:      Symbol,
    pub price:       Decimal,
    pub observed_at: DateTime<Utc>,
    pub created_at:  DateTime<Utc>,
}

/// Units of one symbol summed over some set of rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolUnits {
    pub symbol: Symbol,
    pub units:  Decimal,
}

// ── Column decoding ────────────────────────────────────────────

fn millis_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn units_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    Ok(micros_to_units(row.get(idx)?))
}

fn money_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    Ok(raw_to_money(row.get(idx)?))
}

fn account_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Account> {
    let name: String = row.get(idx)?;
    Account::parse(&name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown account '{name}'").into())
    })
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
