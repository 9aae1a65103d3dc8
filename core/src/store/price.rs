use super::{millis_col, money_col, LedgerStore, PricePoint};
use crate::{error::LedgerResult, fixedpoint::money_to_raw};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{params, OptionalExtension};

fn price_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        symbol:      row.get(0)?,
        price:       money_col(row, 1)?,
        observed_at: millis_col(row, 2)?,
        created_at:  millis_col(row, 3)?,
    })
}

impl LedgerStore {
    // ── Price points ──────────────────────────────────────────────

    /// Append one observation. Prices are stored at four decimals.
    pub fn append_price(
        &self,
        symbol: &str,
        price: Decimal,
        observed_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO price_point (symbol, price_raw, observed_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                symbol,
                money_to_raw(price)?,
                observed_at.timestamp_millis(),
                created_at.timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent observation for `symbol`, if any.
    pub fn latest_price(&self, symbol: &str) -> LedgerResult<Option<PricePoint>> {
        let point = self
            .conn
            .query_row(
                "SELECT symbol, price_raw, observed_at, created_at FROM price_point
                 WHERE symbol = ?1
                 ORDER BY observed_at DESC, point_id DESC LIMIT 1",
                params![symbol],
                price_row,
            )
            .optional()?;
        Ok(point)
    }

    /// Most recent observation with `start <= observed_at < end`.
    pub fn latest_price_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Option<PricePoint>> {
        let point = self
            .conn
            .query_row(
                "SELECT symbol, price_raw, observed_at, created_at FROM price_point
                 WHERE symbol = ?1 AND observed_at >= ?2 AND observed_at < ?3
                 ORDER BY observed_at DESC, point_id DESC LIMIT 1",
                params![symbol, start.timestamp_millis(), end.timestamp_millis()],
                price_row,
            )
            .optional()?;
        Ok(point)
    }

    /// Full series for `symbol`, oldest first.
    pub fn price_history(&self, symbol: &str) -> LedgerResult<Vec<PricePoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, price_raw, observed_at, created_at FROM price_point
             WHERE symbol = ?1
             ORDER BY observed_at ASC, point_id ASC",
        )?;
        let rows = stmt.query_map(params![symbol], price_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
