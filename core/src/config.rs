use crate::error::{LedgerError, LedgerResult};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-percentage fee rates applied to every reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeRates {
    /// Share of notional charged as brokerage.
    pub brokerage_pct: Decimal,
    /// Securities transaction tax, share of notional.
    pub stt_pct: Decimal,
    /// Goods and services tax, share of brokerage.
    pub gst_pct: Decimal,
}

impl Default for FeeRates {
    fn default() -> Self {
        Self {
            brokerage_pct: dec!(0.005),
            stt_pct:       dec!(0.001),
            gst_pct:       dec!(0.18),
        }
    }
}

/// Random-walk parameters for the price simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub tick_interval_secs: u64,
    pub warmup_delay_secs:  u64,
    pub price_floor:        Decimal,
    pub seed_price_min:     Decimal,
    pub seed_price_max:     Decimal,
    /// Largest relative move per tick, either direction.
    pub max_step_pct:       Decimal,
    /// Universe used before any reward has been recorded.
    pub default_symbols:    Vec<String>,
    /// Fixed RNG seed. Absent in production; set in tests for a
    /// reproducible walk.
    pub rng_seed:           Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3600,
            warmup_delay_secs:  2,
            price_floor:        dec!(10),
            seed_price_min:     dec!(800),
            seed_price_max:     dec!(1400),
            max_step_pct:       dec!(0.03),
            default_symbols:    vec!["RELIANCE".into(), "TCS".into(), "INFY".into()],
            rng_seed:           None,
        }
    }
}

impl SimulatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_secs(self.warmup_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// IANA zone used for every "day" boundary.
    pub timezone:       String,
    pub db_path:        String,
    /// Price applied when a symbol has no stored price point.
    pub fallback_price: Decimal,
    pub fees:           FeeRates,
    pub simulator:      SimulatorConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timezone:       "Asia/Kolkata".into(),
            db_path:        "ledger.db".into(),
            fallback_price: dec!(1000.0000),
            fees:           FeeRates::default(),
            simulator:      SimulatorConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from the data/ directory, then apply environment overrides
    /// (`TZ`, `LEDGER_DB`). Fields absent from the file keep defaults.
    /// In tests, use LedgerConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/ledger.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;

        if let Some(tz) = env_override("TZ") {
            config.timezone = tz;
        }
        if let Some(db) = env_override("LEDGER_DB") {
            config.db_path = db;
        }
        config.validate()?;
        Ok(config)
    }

    /// Deterministic config for tests: UTC days, seeded RNG, in-memory db.
    pub fn default_test() -> Self {
        Self {
            timezone:  "UTC".into(),
            db_path:   ":memory:".into(),
            simulator: SimulatorConfig {
                rng_seed: Some(42),
                ..SimulatorConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn tz(&self) -> LedgerResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| LedgerError::Config(format!("unknown timezone '{}': {e}", self.timezone)))
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.tz()?;
        let sim = &self.simulator;
        if self.fallback_price <= Decimal::ZERO {
            return Err(LedgerError::Config("fallback_price must be positive".into()));
        }
        if sim.price_floor <= Decimal::ZERO {
            return Err(LedgerError::Config("price_floor must be positive".into()));
        }
        if sim.seed_price_min >= sim.seed_price_max {
            return Err(LedgerError::Config("seed_price_min must be below seed_price_max".into()));
        }
        if sim.max_step_pct < Decimal::ZERO || sim.max_step_pct >= Decimal::ONE {
            return Err(LedgerError::Config("max_step_pct must be in [0, 1)".into()));
        }
        if sim.tick_interval_secs == 0 {
            return Err(LedgerError::Config("tick_interval_secs must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_constants() {
        let config = LedgerConfig::default();
        assert_eq!(config.fallback_price.to_string(), "1000.0000");
        assert_eq!(config.simulator.tick_interval(), Duration::from_secs(3600));
        assert_eq!(config.simulator.warmup_delay(), Duration::from_secs(2));
        assert_eq!(config.simulator.default_symbols.len(), 3);
        assert_eq!(config.tz().unwrap(), chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "timezone": "Europe/London" }"#).unwrap();
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::London);
        assert_eq!(config.fees, FeeRates::default());
        assert_eq!(config.simulator.price_floor, dec!(10));
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let config = LedgerConfig { timezone: "Mars/Olympus".into(), ..LedgerConfig::default() };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }
}
