//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reward_ledger_core::{
    clock::LocalClock,
    config::LedgerConfig,
    ingest::{RewardIngestor, RewardRequest},
    store::LedgerStore,
    types::UserId,
    valuation::ValuationEngine,
};

pub const USER: UserId = 1;

pub struct Fixture {
    /// Keeps the shared in-memory database alive and gives tests direct
    /// store access.
    pub store:     LedgerStore,
    pub config:    LedgerConfig,
    pub clock:     LocalClock,
    pub ingestor:  RewardIngestor,
    pub valuation: ValuationEngine,
}

/// A migrated shared in-memory ledger with the demo user seeded.
/// `name` must be unique per test: tests run in parallel in one process.
pub fn fixture(name: &str, tz: Tz, now: &str) -> Fixture {
    let config = LedgerConfig::default_test();
    let clock = LocalClock::fixed(tz, utc(now));

    let store = LedgerStore::shared_memory(name).expect("shared store");
    store.migrate().expect("migration");
    store.ensure_user(USER, "Demo User", clock.now()).expect("seed user");

    let ingestor = RewardIngestor::new(store.reopen().unwrap(), &config, clock);
    let valuation = ValuationEngine::new(store.reopen().unwrap(), clock, config.fallback_price);
    Fixture { store, config, clock, ingestor, valuation }
}

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).expect("rfc3339").with_timezone(&Utc)
}

pub fn reward(symbol: &str, units: &str, timestamp: &str, key: Option<&str>) -> RewardRequest {
    RewardRequest {
        user_id:         USER,
        symbol:          symbol.into(),
        units:           units.into(),
        timestamp:       Some(timestamp.into()),
        idempotency_key: key.map(str::to_string),
    }
}
