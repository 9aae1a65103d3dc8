//! Shared primitive types used across the ledger.

use serde::{Deserialize, Serialize};

/// Identifier of a seeded user.
pub type UserId = i64;

/// Row id of a persisted reward event.
pub type RewardId = i64;

/// Ticker symbol, always stored uppercase and trimmed.
pub type Symbol = String;

/// Account tag of a ledger entry.
/// Variants are persisted by name. Never rename.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    StockUnits,
    Cash,
    Brokerage,
    Stt,
    Gst,
}

impl Account {
    /// Every account a single reward posts to, in posting order.
    pub const ALL: [Account; 5] = [
        Account::StockUnits,
        Account::Cash,
        Account::Brokerage,
        Account::Stt,
        Account::Gst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockUnits => "stock_units",
            Self::Cash       => "cash",
            Self::Brokerage  => "brokerage",
            Self::Stt        => "stt",
            Self::Gst        => "gst",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

/// Normalise a caller-supplied symbol: trimmed and uppercased.
pub fn normalize_symbol(raw: &str) -> Symbol {
    raw.trim().to_uppercase()
}
