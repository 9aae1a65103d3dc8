//! Reward ingestion: idempotency guard, fee calculation and the
//! atomic ledger write, in that order.
//!
//! Validation happens before any store access that could write.
//! A retried request carrying an already-used idempotency key returns
//! the original reward id and writes nothing. Two concurrent requests
//! with the same fresh key both pass the guard; the store's unique
//! index lets exactly one commit and the other surfaces as a conflict.

use crate::{
    clock::LocalClock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    fees::{FeeBreakdown, FeeCalculator, FeePercentages},
    fixedpoint::{round_units, units_to_micros},
    store::{LedgerStore, NewReward},
    types::{normalize_symbol, RewardId, UserId},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ingestion input as the request layer receives it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequest {
    pub user_id:         UserId,
    pub symbol:          String,
    /// Positive decimal quantity, as text.
    pub units:           String,
    /// RFC 3339, or naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` read as UTC.
    /// Defaults to the current time.
    #[serde(default)]
    pub timestamp:       Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    DuplicateIgnored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub status:          IngestStatus,
    pub id:              RewardId,
    pub fee_percentages: FeePercentages,
    /// Present only when this call wrote the reward.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees:            Option<FeeBreakdown>,
}

pub struct RewardIngestor {
    store:          LedgerStore,
    fees:           FeeCalculator,
    fallback_price: Decimal,
    clock:          LocalClock,
}

impl RewardIngestor {
    pub fn new(store: LedgerStore, config: &LedgerConfig, clock: LocalClock) -> Self {
        Self {
            store,
            fees: FeeCalculator::new(config.fees.clone()),
            fallback_price: config.fallback_price,
            clock,
        }
    }

    pub fn ingest(&mut self, req: &RewardRequest) -> LedgerResult<IngestReceipt> {
        let (reward, units) = self.validate(req)?;

        if let Some(key) = &reward.idempotency_key {
            if let Some(existing) = self.store.reward_id_for_key(key)? {
                log::info!("reward: duplicate idempotency key {key}, returning reward {existing}");
                return Ok(IngestReceipt {
                    status:          IngestStatus::DuplicateIgnored,
                    id:              existing,
                    fee_percentages: self.fees.percentages(),
                    fees:            None,
                });
            }
        }

        let price = self
            .store
            .latest_price(&reward.symbol)?
            .map(|p| p.price)
            .unwrap_or(self.fallback_price);
        let fees = self.fees.compute(price, units)?;

        match self.store.insert_reward_with_ledger(&reward, &fees, self.clock.now()) {
            Ok(id) => {
                log::info!(
                    "reward: recorded {id} user={} symbol={} units={} total={}",
                    reward.user_id, reward.symbol, fees.units, fees.total
                );
                Ok(IngestReceipt {
                    status:          IngestStatus::Ok,
                    id,
                    fee_percentages: self.fees.percentages(),
                    fees:            Some(fees),
                })
            }
            Err(e @ LedgerError::Conflict { .. }) => {
                log::warn!("reward: {e}");
                Err(e)
            }
            Err(e) => {
                log::error!("reward: ledger transaction failed: {e}");
                Err(e)
            }
        }
    }

    fn validate(&self, req: &RewardRequest) -> LedgerResult<(NewReward, Decimal)> {
        if req.user_id <= 0 {
            return Err(LedgerError::validation("userId is required"));
        }
        let symbol = normalize_symbol(&req.symbol);
        if symbol.is_empty() {
            return Err(LedgerError::validation("symbol is required"));
        }
        let units = parse_units(&req.units)?;
        let event_time = match req.timestamp.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => parse_event_time(text)?,
            _ => self.clock.now(),
        };
        if self.store.user(req.user_id)?.is_none() {
            return Err(LedgerError::validation(format!("unknown user {}", req.user_id)));
        }
        let idempotency_key = req
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        Ok((
            NewReward {
                user_id: req.user_id,
                symbol,
                event_time,
                idempotency_key,
            },
            units,
        ))
    }
}

/// Parse a positive unit quantity, normalised to six decimals. The
/// quantity must also fit the ledger's micro-unit column.
pub fn parse_units(text: &str) -> LedgerResult<Decimal> {
    let parsed = Decimal::from_str(text.trim())
        .map_err(|_| LedgerError::validation(format!("units '{text}' is not a decimal number")))?;
    let units = round_units(parsed);
    if units <= Decimal::ZERO {
        return Err(LedgerError::validation("units must be positive"));
    }
    units_to_micros(units)?;
    Ok(units)
}

/// Parse an event timestamp: RFC 3339 with offset, or a naive ISO-8601
/// date-time taken as UTC.
pub fn parse_event_time(text: &str) -> LedgerResult<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| LedgerError::validation(format!("cannot parse timestamp '{text}'")))
}
