//! Price simulator: bounded random walk over the reward symbol universe.
//!
//! One tick appends one price point per symbol:
//!   - no history: seed uniformly in [seed_price_min, seed_price_max)
//!   - otherwise: latest stored price moved by a uniform step within
//!     ±max_step_pct of it
//!   - never below price_floor
//!
//! Appends are independent single-row inserts; a failure part-way
//! through a tick leaves the symbols already written in place.

use crate::{
    clock::LocalClock,
    config::SimulatorConfig,
    error::LedgerResult,
    fixedpoint::{round_money, MONEY_DP},
    rng::PriceRng,
    store::LedgerStore,
    types::{normalize_symbol, Symbol},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub observed_at: DateTime<Utc>,
    pub prices:      Vec<(Symbol, Decimal)>,
}

pub struct PriceSimulator {
    config: SimulatorConfig,
    rng:    PriceRng,
    clock:  LocalClock,
}

impl PriceSimulator {
    pub fn new(config: SimulatorConfig, clock: LocalClock) -> Self {
        let rng = PriceRng::from_config(config.rng_seed);
        log::debug!("pricing: simulator seeded with {}", rng.seed());
        Self { config, rng, clock }
    }

    /// Next price given the latest stored one, rounded to storage scale.
    pub fn next_price(&mut self, last: Option<Decimal>) -> Decimal {
        let base = match last {
            Some(p) => p,
            None => self.rng.uniform(self.config.seed_price_min, self.config.seed_price_max),
        };
        let step = self.config.max_step_pct;
        let delta = base * self.rng.uniform(-step, step);
        let mut next = round_money(base + delta);

        if last.is_some() {
            // Rounding must not carry the price outside the step band.
            let lo = (base * (Decimal::ONE - step))
                .round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToPositiveInfinity);
            let hi = (base * (Decimal::ONE + step))
                .round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToNegativeInfinity);
            next = next.clamp(lo, hi);
        }

        if next < self.config.price_floor {
            next = round_money(self.config.price_floor);
        }
        next
    }

    /// Symbols that appear in any reward, or the default set when none do.
    pub fn symbol_universe(&self, store: &LedgerStore) -> LedgerResult<Vec<Symbol>> {
        let symbols = store.reward_symbols()?;
        if !symbols.is_empty() {
            return Ok(symbols);
        }
        Ok(self
            .config
            .default_symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Append one price point per symbol at the current instant.
    pub fn run_tick(&mut self, store: &LedgerStore) -> LedgerResult<TickReport> {
        let symbols = self.symbol_universe(store)?;
        let observed_at = self.clock.now();
        let mut prices = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let last = store.latest_price(&symbol)?.map(|p| p.price);
            let next = self.next_price(last);
            store.append_price(&symbol, next, observed_at, observed_at)?;
            log::debug!("pricing: {symbol} {last:?} -> {next}");
            prices.push((symbol, next));
        }

        log::info!("pricing: updated prices for {} symbols", prices.len());
        Ok(TickReport { observed_at, prices })
    }
}
