//! Exchange rate table with per-currency default fallback.

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::Currency;

/// Mutable in-memory exchange rate table.
///
/// Rates are expressed against USD (USD = 1.0). Lookups for currencies the
/// table has no entry for fall back to the fixed default constant, so
/// conversion always produces an answer even before the first refresh.
pub struct RateTable {
    rates: RwLock<HashMap<String, f64>>,
}

impl RateTable {
    /// Create a table pre-seeded with the default rates.
    pub fn new() -> Self {
        let table = Self {
            rates: RwLock::new(HashMap::new()),
        };
        table.refresh_defaults();
        table
    }

    /// Create an empty table (lookups fall back to defaults).
    pub fn empty() -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Rate for a currency code; default constant when not refreshed.
    pub fn rate(&self, code: &str) -> f64 {
        if let Some(rate) = self.rates.read().unwrap_or_else(|e| e.into_inner()).get(code) {
            return *rate;
        }
        Currency::parse(code).map(|c| c.default_rate()).unwrap_or(1.0)
    }

    /// Install a rate for one currency.
    pub fn set_rate(&self, code: impl Into<String>, rate: f64) {
        self.rates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(code.into(), rate);
    }

    /// Replace the table contents with freshly fetched rates.
    ///
    /// Called after an asynchronous refresh from a remote source; until
    /// then defaults apply.
    pub fn apply(&self, fresh: HashMap<String, f64>) {
        debug!(count = fresh.len(), "applying refreshed exchange rates");
        *self.rates.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    /// Seed the table with the built-in default rates. Stands in for a
    /// remote rate fetch until one exists.
    pub fn refresh_defaults(&self) {
        let mut rates = self.rates.write().unwrap_or_else(|e| e.into_inner());
        for currency in Currency::ALL {
            rates.insert(currency.code().to_string(), currency.default_rate());
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}
