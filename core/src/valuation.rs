//! Valuation engine: read-only aggregations over rewards and prices.
//!
//! Day buckets are local calendar days of the configured zone. Holdings
//! are valued at the latest stored price per symbol, falling back to the
//! configured default when a symbol has never been priced.

use crate::{
    clock::LocalClock,
    error::LedgerResult,
    fixedpoint::round_money,
    store::{LedgerStore, RewardEventRow, SymbolUnits},
    types::{Symbol, UserId},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayPositions {
    pub count: usize,
    pub items: Vec<RewardEventRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyValuation {
    pub day:         NaiveDate,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValue {
    pub symbol: Symbol,
    pub units:  Decimal,
    pub price:  Decimal,
    pub value:  Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub today_by_symbol:         Vec<SymbolUnits>,
    pub current_portfolio_value: Decimal,
    pub breakdown:               Vec<HoldingValue>,
}

pub struct ValuationEngine {
    store:          LedgerStore,
    clock:          LocalClock,
    fallback_price: Decimal,
}

impl ValuationEngine {
    pub fn new(store: LedgerStore, clock: LocalClock, fallback_price: Decimal) -> Self {
        Self {
            store,
            clock,
            fallback_price: round_money(fallback_price),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Rewards whose event time falls on today's local day, oldest first.
    pub fn today_positions(&self, user_id: UserId) -> LedgerResult<TodayPositions> {
        let (start, end) = self.clock.today_range();
        let items = self.store.rewards_between(user_id, start, end)?;
        Ok(TodayPositions { count: items.len(), items })
    }

    /// One row per past local day that has rewards: summed units per
    /// symbol valued at that symbol's last price observed on the same
    /// local day. Today is never included.
    pub fn historical_daily_valuation(&self, user_id: UserId) -> LedgerResult<Vec<DailyValuation>> {
        let today_start = self.clock.day_start(self.clock.today());
        let rewards = self.store.rewards_before(user_id, today_start)?;

        let mut units_by_day: BTreeMap<(NaiveDate, Symbol), Decimal> = BTreeMap::new();
        for reward in rewards {
            let day = self.clock.local_day(reward.event_time);
            *units_by_day.entry((day, reward.symbol)).or_default() += reward.units;
        }

        let mut value_by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for ((day, symbol), units) in units_by_day {
            let (start, end) = self.clock.day_range(day);
            let price = self
                .store
                .latest_price_between(&symbol, start, end)?
                .map(|p| p.price)
                .unwrap_or(self.fallback_price);
            *value_by_day.entry(day).or_default() += units * price;
        }

        Ok(value_by_day
            .into_iter()
            .map(|(day, total)| DailyValuation { day, total_value: round_money(total) })
            .collect())
    }

    /// Today's units per symbol plus the all-time holdings valuation.
    pub fn stats(&self, user_id: UserId) -> LedgerResult<Stats> {
        let (start, end) = self.clock.today_range();
        let today_by_symbol = self.store.units_by_symbol_between(user_id, start, end)?;
        let (breakdown, total) = self.value_holdings(user_id)?;
        Ok(Stats {
            today_by_symbol,
            current_portfolio_value: total,
            breakdown,
        })
    }

    /// All-time holdings per symbol at latest prices, ordered by symbol.
    pub fn portfolio(&self, user_id: UserId) -> LedgerResult<Vec<HoldingValue>> {
        Ok(self.value_holdings(user_id)?.0)
    }

    fn value_holdings(&self, user_id: UserId) -> LedgerResult<(Vec<HoldingValue>, Decimal)> {
        let holdings = self.store.holdings_by_symbol(user_id)?;
        let mut total = Decimal::ZERO;
        let mut rows = Vec::with_capacity(holdings.len());

        for SymbolUnits { symbol, units } in holdings {
            let price = self
                .store
                .latest_price(&symbol)?
                .map(|p| p.price)
                .unwrap_or(self.fallback_price);
            let value = units * price;
            total += value;
            rows.push(HoldingValue {
                symbol,
                units,
                price,
                value: round_money(value),
            });
        }

        Ok((rows, round_money(total)))
    }
}
