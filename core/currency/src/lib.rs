//! Currency conversion for SpendSync.
//!
//! A pure function layer: amounts convert between currencies through a
//! mutable rate table with fixed per-currency defaults. No rounding is
//! performed here — callers apply display-level rounding.

pub mod rates;

pub use rates::RateTable;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported display currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Usd,
    Eur,
    Jpy,
    Inr,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Usd, Currency::Eur, Currency::Jpy, Currency::Inr];

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Jpy => "JPY",
            Currency::Inr => "INR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Jpy => "¥",
            Currency::Inr => "₹",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Currency::Usd => "US Dollar",
            Currency::Eur => "Euro",
            Currency::Jpy => "Japanese Yen",
            Currency::Inr => "Indian Rupee",
        }
    }

    /// Fixed fallback rate against USD, used until a refresh lands.
    pub fn default_rate(&self) -> f64 {
        match self {
            Currency::Usd => 1.0,
            Currency::Eur => 0.85,
            Currency::Jpy => 110.0,
            Currency::Inr => 74.0,
        }
    }

    /// Parse a currency code, case-insensitively.
    pub fn parse(code: &str) -> Option<Currency> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Convert an amount between currencies using the given rate table.
///
/// Identity conversions return the input unchanged, avoiding floating-point
/// noise on no-op conversions.
pub fn convert(table: &RateTable, amount: f64, from: &str, to: &str) -> f64 {
    if from == to {
        return amount;
    }
    amount / table.rate(from) * table.rate(to)
}
