use super::{
    account_col, json_col, millis_col, units_col, LedgerEntryRow, LedgerStore,
    RewardEventRow, SymbolUnits,
};
use crate::{
    error::{LedgerError, LedgerResult},
    fees::FeeBreakdown,
    fixedpoint::{micros_to_units, money_to_raw, raw_to_money, units_to_micros},
    types::{Account, RewardId, Symbol, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, OptionalExtension, TransactionBehavior};

/// A validated reward ready to be written.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id:         UserId,
    pub symbol:          Symbol,
    pub event_time:      DateTime<Utc>,
    /// `None` when the caller sent no key; never an empty string.
    pub idempotency_key: Option<String>,
}

const REWARD_COLUMNS: &str =
    "reward_id, user_id, symbol, units_micros, event_time, idempotency_key, created_at";

fn reward_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RewardEventRow> {
    Ok(RewardEventRow {
        id:              row.get(0)?,
        user_id:         row.get(1)?,
        symbol:          row.get(2)?,
        units:           units_col(row, 3)?,
        event_time:      millis_col(row, 4)?,
        idempotency_key: row.get(5)?,
        created_at:      millis_col(row, 6)?,
    })
}

impl LedgerStore {
    // ── Reward events ─────────────────────────────────────────────

    pub fn reward_id_for_key(&self, key: &str) -> LedgerResult<Option<RewardId>> {
        let id = self
            .conn
            .query_row(
                "SELECT reward_id FROM reward_event WHERE idempotency_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Write one reward event and its five ledger rows in a single
    /// transaction. Units come from `fees.units` so the persisted
    /// quantity is the one the fees were computed on.
    ///
    /// A unique-key violation means a concurrent request with the same
    /// idempotency key committed first; it surfaces as
    /// [`LedgerError::Conflict`] and nothing from this call survives.
    pub fn insert_reward_with_ledger(
        &mut self,
        reward: &NewReward,
        fees: &FeeBreakdown,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<RewardId> {
        match self.write_reward_tx(reward, fees, created_at) {
            Err(LedgerError::Database(e)) if is_unique_violation(&e) => {
                let key = reward.idempotency_key.clone().unwrap_or_default();
                let existing_id = self.reward_id_for_key(&key)?;
                Err(LedgerError::Conflict { key, existing_id })
            }
            other => other,
        }
    }

    fn write_reward_tx(
        &mut self,
        reward: &NewReward,
        fees: &FeeBreakdown,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<RewardId> {
        let units_micros = units_to_micros(fees.units)?;
        let created_ms = created_at.timestamp_millis();

        // Encode every amount before opening the transaction.
        let legs: [(Account, Option<&str>, Option<i64>, i64, &str); 5] = [
            (Account::StockUnits, Some(reward.symbol.as_str()), Some(units_micros), money_to_raw(fees.notional)?, "{}"),
            (Account::Cash,       None, None, money_to_raw(fees.total)?,     r#"{"reason":"purchase"}"#),
            (Account::Brokerage,  None, None, money_to_raw(fees.brokerage)?, "{}"),
            (Account::Stt,        None, None, money_to_raw(fees.stt)?,       "{}"),
            (Account::Gst,        None, None, money_to_raw(fees.gst)?,       "{}"),
        ];

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO reward_event (user_id, symbol, units_micros, event_time, idempotency_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reward.user_id,
                reward.symbol,
                units_micros,
                reward.event_time.timestamp_millis(),
                reward.idempotency_key,
                created_ms,
            ],
        )?;
        let reward_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO ledger_entry (reward_id, user_id, account, symbol, units_micros, amount_raw, created_at, meta)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (account, symbol, units, amount, meta) in legs {
                stmt.execute(params![
                    reward_id,
                    reward.user_id,
                    account.as_str(),
                    symbol,
                    units,
                    amount,
                    created_ms,
                    meta,
                ])?;
            }
        }

        tx.commit()?;
        Ok(reward_id)
    }

    pub fn reward(&self, reward_id: RewardId) -> LedgerResult<Option<RewardEventRow>> {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM reward_event WHERE reward_id = ?1");
        Ok(self.conn.query_row(&sql, params![reward_id], reward_row).optional()?)
    }

    /// Rewards with `start <= event_time < end`, oldest first.
    pub fn rewards_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<RewardEventRow>> {
        let sql = format!(
            "SELECT {REWARD_COLUMNS} FROM reward_event
             WHERE user_id = ?1 AND event_time >= ?2 AND event_time < ?3
             ORDER BY event_time ASC, reward_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, start.timestamp_millis(), end.timestamp_millis()],
            reward_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Rewards strictly before `end`, oldest first.
    pub fn rewards_before(&self, user_id: UserId, end: DateTime<Utc>) -> LedgerResult<Vec<RewardEventRow>> {
        let sql = format!(
            "SELECT {REWARD_COLUMNS} FROM reward_event
             WHERE user_id = ?1 AND event_time < ?2
             ORDER BY event_time ASC, reward_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, end.timestamp_millis()], reward_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All-time units per symbol for a user, ordered by symbol.
    pub fn holdings_by_symbol(&self, user_id: UserId) -> LedgerResult<Vec<SymbolUnits>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, SUM(units_micros) FROM reward_event
             WHERE user_id = ?1
             GROUP BY symbol ORDER BY symbol",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(SymbolUnits {
                symbol: row.get(0)?,
                units:  micros_to_units(row.get(1)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Units per symbol for rewards with `start <= event_time < end`.
    pub fn units_by_symbol_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<SymbolUnits>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, SUM(units_micros) FROM reward_event
             WHERE user_id = ?1 AND event_time >= ?2 AND event_time < ?3
             GROUP BY symbol ORDER BY symbol",
        )?;
        let rows = stmt.query_map(
            params![user_id, start.timestamp_millis(), end.timestamp_millis()],
            |row| {
                Ok(SymbolUnits {
                    symbol: row.get(0)?,
                    units:  micros_to_units(row.get(1)?),
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every symbol that appears in any reward, ordered.
    pub fn reward_symbols(&self) -> LedgerResult<Vec<Symbol>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT symbol FROM reward_event ORDER BY symbol")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn reward_count(&self, user_id: UserId) -> LedgerResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM reward_event WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    // ── Ledger entries ────────────────────────────────────────────

    pub fn ledger_entries_for_reward(&self, reward_id: RewardId) -> LedgerResult<Vec<LedgerEntryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, reward_id, user_id, account, symbol, units_micros, amount_raw, created_at, meta
             FROM ledger_entry WHERE reward_id = ?1
             ORDER BY entry_id ASC",
        )?;
        let rows = stmt.query_map(params![reward_id], |row| {
            Ok(LedgerEntryRow {
                id:         row.get(0)?,
                reward_id:  row.get(1)?,
                user_id:    row.get(2)?,
                account:    account_col(row, 3)?,
                symbol:     row.get(4)?,
                units:      row.get::<_, Option<i64>>(5)?.map(micros_to_units),
                amount:     row.get::<_, Option<i64>>(6)?.map(raw_to_money),
                created_at: millis_col(row, 7)?,
                meta:       json_col(row, 8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn ledger_entry_count(&self, user_id: UserId) -> LedgerResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entry WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error()
        .is_some_and(|e| e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
}
