//! Fee calculator: price × units → fee breakdown.
//!
//! Pure arithmetic on `Decimal`; nothing here touches the store.
//! Every component is computed from unrounded intermediates and only
//! rounded for the breakdown the caller sees and persists.

use crate::{
    config::FeeRates,
    error::{LedgerError, LedgerResult},
    fixedpoint::{round_money, round_units},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub price:     Decimal,
    pub units:     Decimal,
    pub notional:  Decimal,
    pub brokerage: Decimal,
    pub stt:       Decimal,
    pub gst:       Decimal,
    /// Notional plus every fee: the cash cost of the grant.
    pub total:     Decimal,
}

/// The fee rates echoed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePercentages {
    pub brokerage_pct: Decimal,
    pub stt_pct:       Decimal,
    pub gst_pct:       Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    rates: FeeRates,
}

impl FeeCalculator {
    pub fn new(rates: FeeRates) -> Self {
        Self { rates }
    }

    pub fn percentages(&self) -> FeePercentages {
        FeePercentages {
            brokerage_pct: self.rates.brokerage_pct,
            stt_pct:       self.rates.stt_pct,
            gst_pct:       self.rates.gst_pct,
        }
    }

    /// Callers reject non-positive inputs before getting here. A product
    /// too large for `Decimal` is a validation error, never a panic.
    pub fn compute(&self, price: Decimal, units: Decimal) -> LedgerResult<FeeBreakdown> {
        debug_assert!(price > Decimal::ZERO && units > Decimal::ZERO);

        let overflow = || LedgerError::validation(format!("{units} units at {price} is out of range"));
        let notional = price.checked_mul(units).ok_or_else(overflow)?;
        let brokerage = notional.checked_mul(self.rates.brokerage_pct).ok_or_else(overflow)?;
        let stt = notional.checked_mul(self.rates.stt_pct).ok_or_else(overflow)?;
        let gst = brokerage.checked_mul(self.rates.gst_pct).ok_or_else(overflow)?;
        let total = notional
            .checked_add(brokerage)
            .and_then(|t| t.checked_add(stt))
            .and_then(|t| t.checked_add(gst))
            .ok_or_else(overflow)?;

        Ok(FeeBreakdown {
            price:     round_money(price),
            units:     round_units(units),
            notional:  round_money(notional),
            brokerage: round_money(brokerage),
            stt:       round_money(stt),
            gst:       round_money(gst),
            total:     round_money(total),
        })
    }
}
