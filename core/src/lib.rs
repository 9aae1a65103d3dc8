//! Stock-reward ledger and valuation engine.
//!
//! Rewards are ingested exactly once per idempotency key, charged
//! deterministic fees and written as one event plus five ledger rows.
//! A scheduled random walk keeps a simulated price series per symbol,
//! and the valuation engine answers portfolio queries against both.

pub mod clock;
pub mod config;
pub mod error;
pub mod fees;
pub mod fixedpoint;
pub mod ingest;
pub mod pricing;
pub mod rng;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod valuation;
