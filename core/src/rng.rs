//! Random source for the price simulator.
//!
//! RULE: The simulator never calls a platform RNG directly.
//! All draws flow through a PriceRng, seeded either from configuration
//! (reproducible walks in tests) or once from entropy at startup.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use rust_decimal::Decimal;

pub struct PriceRng {
    seed:  u64,
    inner: Pcg64Mcg,
}

impl PriceRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Use the configured seed, or draw one from the OS.
    pub fn from_config(seed: Option<u64>) -> Self {
        Self::new(seed.unwrap_or_else(rand::random))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Roll a decimal fraction in [0, 1) with 9 significant places.
    pub fn next_fraction(&mut self) -> Decimal {
        use rand::RngCore;
        const SCALE: u64 = 1_000_000_000;
        let draw = self.inner.next_u64() % SCALE;
        Decimal::new(draw as i64, 9)
    }

    /// Uniform decimal in [lo, hi).
    pub fn uniform(&mut self, lo: Decimal, hi: Decimal) -> Decimal {
        lo + (hi - lo) * self.next_fraction()
    }
}
