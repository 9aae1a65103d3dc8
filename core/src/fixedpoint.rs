//! Fixed-point storage scales.
//!
//! Decimal values never touch SQLite as floats. Units are stored as
//! integer micros (1e-6) and money and prices at 1e-4,
//! so `SUM` and `GROUP BY` in SQL stay exact.
//!
//! Rounding is half-away-from-zero everywhere, matching how amounts are
//! displayed with a fixed number of decimals.

use crate::error::{LedgerError, LedgerResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for unit quantities.
pub const UNIT_DP: u32 = 6;

/// Decimal places kept for monetary amounts and prices.
pub const MONEY_DP: u32 = 4;

/// Round to `dp` places and pin the scale, so `10` prints as `10.0000`.
pub fn round_to(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

pub fn round_money(value: Decimal) -> Decimal {
    round_to(value, MONEY_DP)
}

pub fn round_units(value: Decimal) -> Decimal {
    round_to(value, UNIT_DP)
}

/// Encode a decimal as a scaled integer at `dp` places.
pub fn to_scaled(value: Decimal, dp: u32) -> LedgerResult<i64> {
    let rounded = round_to(value, dp);
    i64::try_from(rounded.mantissa())
        .map_err(|_| LedgerError::validation(format!("value {value} out of storable range")))
}

/// Decode a scaled integer written by [`to_scaled`].
pub fn from_scaled(raw: i64, dp: u32) -> Decimal {
    Decimal::new(raw, dp)
}

pub fn units_to_micros(units: Decimal) -> LedgerResult<i64> {
    to_scaled(units, UNIT_DP)
}

pub fn micros_to_units(raw: i64) -> Decimal {
    from_scaled(raw, UNIT_DP)
}

pub fn money_to_raw(amount: Decimal) -> LedgerResult<i64> {
    to_scaled(amount, MONEY_DP)
}

pub fn raw_to_money(raw: i64) -> Decimal {
    from_scaled(raw, MONEY_DP)
}
