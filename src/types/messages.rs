//! Upstream message types.
//!
//! A [`WireMessage`] is what an exchange adapter or poller hands to the
//! ingestion queue once the exchange's own wire format has been decoded.
//! Field names follow the camelCase JSON contract shared by all adapters.

use serde::{Deserialize, Serialize};

use super::{Price, Quantity, SequenceId, Symbol, TimestampMs};
use crate::error::Error;

/// Logical feed a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Book snapshots and diffs
    Orderbook,
    /// Trade executions
    Trade,
}

/// What the message asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    /// Full book replacement
    Snapshot,
    /// Incremental level changes
    Diff,
    /// Trade batch
    Trade,
    /// REST-polled data: a full book or a trade batch depending on payload
    Polling,
}

/// Side of the book a trade executed against.
///
/// `Sell` means resting asks were lifted, `Buy` means resting bids were hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Resting bid liquidity was consumed
    Buy,
    /// Resting ask liquidity was consumed
    Sell,
}

/// Absolute quantity for one price level.
///
/// A quantity of zero removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    /// Level price
    pub price: Price,
    /// New absolute quantity at `price`
    pub quantity: Quantity,
}

impl LevelUpdate {
    /// Set the level at `price` to `quantity`
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Remove the level at `price`
    pub fn delete(price: Price) -> Self {
        Self {
            price,
            quantity: Quantity::ZERO,
        }
    }
}

/// A single public trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Execution price
    pub price: Price,
    /// Executed quantity
    pub quantity: Quantity,
    /// Book side the resting liquidity was on
    pub side: TradeSide,
    /// Trade sequence number
    pub sequence_id: SequenceId,
    /// Execution time
    #[serde(default)]
    pub timestamp_ms: TimestampMs,
}

/// Book levels carried by a snapshot or diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookPayload {
    /// Ask levels
    #[serde(default)]
    pub asks: Vec<LevelUpdate>,
    /// Bid levels
    #[serde(default)]
    pub bids: Vec<LevelUpdate>,
}

/// Message body
///
/// `Trades` is tried first: serde would otherwise accept `[]` as an empty
/// positional `OrderbookPayload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Trade batch
    Trades(Vec<Trade>),
    /// Book levels
    Orderbook(OrderbookPayload),
}

/// A normalized message from any adapter or poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Exchange the message came from
    pub exchange: String,
    /// Canonical symbol
    pub symbol: Symbol,
    /// Feed the message belongs to
    pub channel: Channel,
    /// Requested operation
    pub action: MessageAction,
    /// Message-level sequence number (0 when the exchange doesn't sequence)
    #[serde(default)]
    pub sequence_id: SequenceId,
    /// Decoded body
    pub payload: Payload,
}

/// A [`WireMessage`] after validation, with `polling` resolved to what it carries
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// Replace the whole book
    Snapshot(&'a OrderbookPayload),
    /// Merge level changes
    Diff(&'a OrderbookPayload),
    /// Deplete the book with trades
    Trades(&'a [Trade]),
}

impl WireMessage {
    /// Build a full book snapshot message
    pub fn snapshot(
        exchange: impl Into<String>,
        symbol: Symbol,
        sequence_id: SequenceId,
        asks: Vec<LevelUpdate>,
        bids: Vec<LevelUpdate>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol,
            channel: Channel::Orderbook,
            action: MessageAction::Snapshot,
            sequence_id,
            payload: Payload::Orderbook(OrderbookPayload { asks, bids }),
        }
    }

    /// Build an incremental diff message
    pub fn diff(
        exchange: impl Into<String>,
        symbol: Symbol,
        sequence_id: SequenceId,
        asks: Vec<LevelUpdate>,
        bids: Vec<LevelUpdate>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol,
            channel: Channel::Orderbook,
            action: MessageAction::Diff,
            sequence_id,
            payload: Payload::Orderbook(OrderbookPayload { asks, bids }),
        }
    }

    /// Build a trade batch message. The message sequence is the highest trade sequence.
    pub fn trades(exchange: impl Into<String>, symbol: Symbol, trades: Vec<Trade>) -> Self {
        let sequence_id = trades.iter().map(|t| t.sequence_id).max().unwrap_or(0);
        Self {
            exchange: exchange.into(),
            symbol,
            channel: Channel::Trade,
            action: MessageAction::Trade,
            sequence_id,
            payload: Payload::Trades(trades),
        }
    }

    /// Re-tag a message as coming from the REST poller
    #[must_use]
    pub fn into_polling(mut self) -> Self {
        self.action = MessageAction::Polling;
        self
    }

    /// Whether this message is an order book diff
    pub fn is_diff(&self) -> bool {
        self.action == MessageAction::Diff && matches!(self.payload, Payload::Orderbook(_))
    }

    /// Whether this message replaces the whole book
    pub fn is_snapshot(&self) -> bool {
        matches!(
            (self.action, &self.payload),
            (MessageAction::Snapshot, Payload::Orderbook(_))
                | (MessageAction::Polling, Payload::Orderbook(_))
        )
    }

    /// Validate the message and resolve what it asks the engine to do.
    ///
    /// Rejects channel/action/payload mismatches, non-positive prices,
    /// negative level quantities and non-positive trade quantities.
    pub fn resolve(&self) -> Result<Resolved<'_>, Error> {
        let resolved = match (self.channel, self.action, &self.payload) {
            (Channel::Orderbook, MessageAction::Snapshot | MessageAction::Polling, Payload::Orderbook(book)) => {
                Resolved::Snapshot(book)
            }
            (Channel::Orderbook, MessageAction::Diff, Payload::Orderbook(book)) => Resolved::Diff(book),
            (Channel::Trade, MessageAction::Trade | MessageAction::Polling, Payload::Trades(trades)) => {
                Resolved::Trades(trades)
            }
            (channel, action, _) => {
                return Err(self.malformed(format!(
                    "payload does not match channel {:?} / action {:?}",
                    channel, action
                )))
            }
        };

        match resolved {
            Resolved::Snapshot(book) | Resolved::Diff(book) => {
                for level in book.asks.iter().chain(book.bids.iter()) {
                    if level.price <= Price::ZERO {
                        return Err(self.malformed(format!("non-positive price {}", level.price)));
                    }
                    if level.quantity < Quantity::ZERO {
                        return Err(self.malformed(format!(
                            "negative quantity {} at {}",
                            level.quantity, level.price
                        )));
                    }
                }
            }
            Resolved::Trades(trades) => {
                for trade in trades {
                    if trade.price <= Price::ZERO || trade.quantity <= Quantity::ZERO {
                        return Err(self.malformed(format!(
                            "trade {} has price {} quantity {}",
                            trade.sequence_id, trade.price, trade.quantity
                        )));
                    }
                }
            }
        }

        Ok(resolved)
    }

    fn malformed(&self, reason: String) -> Error {
        Error::MalformedPayload {
            exchange: self.exchange.clone(),
            symbol: self.symbol.to_string(),
            reason,
        }
    }
}
