//! Normalized market data types.
//!
//! These types form the contract between exchange adapters, the merge engine
//! and downstream consumers. They are exchange-agnostic.
//!
//! - [`messages`] - Upstream [`WireMessage`]s produced by adapters and pollers
//! - [`events`] - Downstream [`DiffEvent`]s emitted by the merge engine

pub mod events;
pub mod messages;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub use events::{DiffEvent, LevelAction, LevelChange, Stream};
pub use messages::{
    Channel, LevelUpdate, MessageAction, OrderbookPayload, Payload, Resolved, Trade, TradeSide,
    WireMessage,
};

/// Price of a level
///
/// Decimal rather than floating point so that depletion arithmetic
/// (`5 - 2 == 3`) is exact and level lookups by price never miss.
pub type Price = rust_decimal::Decimal;

/// Quantity resting at a level or filled by a trade
pub type Quantity = rust_decimal::Decimal;

/// Exchange-provided sequence number. `0` means the source does not sequence.
pub type SequenceId = i64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Current wall-clock time in milliseconds since Unix epoch
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}

/// Canonical exchange-agnostic trading pair, `BASE/QUOTE`.
///
/// ```rust
/// use book_sync::types::Symbol;
///
/// let symbol: Symbol = "BTC/USDT".parse().unwrap();
/// assert_eq!(symbol.base(), "BTC");
/// assert_eq!(symbol.quote(), "USDT");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Build a symbol from base and quote assets
    pub fn new(base: &str, quote: &str) -> Result<Self, Error> {
        format!("{}/{}", base, quote).parse()
    }

    /// Base asset (`BTC` in `BTC/USDT`)
    pub fn base(&self) -> &str {
        self.0.split_once('/').map(|(b, _)| b).unwrap_or(&self.0)
    }

    /// Quote asset (`USDT` in `BTC/USDT`)
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or("")
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('/') =>
            {
                Ok(Symbol(format!(
                    "{}/{}",
                    base.to_ascii_uppercase(),
                    quote.to_ascii_uppercase()
                )))
            }
            _ => Err(Error::InvalidSymbol(s.to_string())),
        }
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_parse() {
        let symbol: Symbol = "eth/usdc".parse().unwrap();
        assert_eq!(symbol.as_str(), "ETH/USDC");
        assert_eq!(symbol.base(), "ETH");
        assert_eq!(symbol.quote(), "USDC");
    }

    #[test]
    fn test_symbol_rejects_bad_format() {
        assert!("BTCUSDT".parse::<Symbol>().is_err());
        assert!("/USDT".parse::<Symbol>().is_err());
        assert!("BTC/".parse::<Symbol>().is_err());
        assert!("A/B/C".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_symbol_serde() {
        let symbol = Symbol::new("BTC", "USDT").unwrap();
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BTC/USDT\"");

        let bad: Result<Symbol, _> = serde_json::from_str("\"BTCUSDT\"");
        assert!(bad.is_err());
    }
}
