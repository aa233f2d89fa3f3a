//! Downstream event types.
//!
//! A [`DiffEvent`] is the minimal change-set published after one merge step.
//! Consumers treat [`Stream::Snapshot`] as authoritative replace and the two
//! diff streams as apply-on-top. Quantities are absolute, so applying the
//! same event twice is a no-op.

use serde::{Deserialize, Serialize};

use super::{Price, Quantity, SequenceId, Symbol};
use crate::orderbook::BookState;

/// Which merge step produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Full book state; replaces whatever the consumer holds
    Snapshot,
    /// Level changes from an order book diff
    Diffbooks,
    /// Level changes inferred from trades
    Difftrade,
}

/// What happened to a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelAction {
    /// New level
    Insert,
    /// Quantity changed
    Update,
    /// Level removed
    Delete,
}

/// One level transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    /// Transition kind
    pub action: LevelAction,
    /// Level price
    pub price: Price,
    /// New absolute quantity (zero for deletes)
    pub quantity: Quantity,
}

impl LevelChange {
    /// A new level
    pub fn insert(price: Price, quantity: Quantity) -> Self {
        Self {
            action: LevelAction::Insert,
            price,
            quantity,
        }
    }

    /// A changed level
    pub fn update(price: Price, quantity: Quantity) -> Self {
        Self {
            action: LevelAction::Update,
            price,
            quantity,
        }
    }

    /// A removed level
    pub fn delete(price: Price) -> Self {
        Self {
            action: LevelAction::Delete,
            price,
            quantity: Quantity::ZERO,
        }
    }
}

/// Change-set published downstream after a merge step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEvent {
    /// Source exchange
    pub exchange: String,
    /// Canonical symbol
    pub symbol: Symbol,
    /// Producing merge step
    pub stream: Stream,
    /// Book sequence for snapshot/diffbooks, trade sequence for difftrade
    pub sequence_id: SequenceId,
    /// Ask transitions, ascending by price
    pub asks: Vec<LevelChange>,
    /// Bid transitions, descending by price
    pub bids: Vec<LevelChange>,
    /// Total ask quantity after the step
    pub ask_sum_qty: Quantity,
    /// Total bid quantity after the step
    pub bid_sum_qty: Quantity,
}

impl DiffEvent {
    /// Full-state event with every level tagged `insert`
    pub fn snapshot_of(exchange: &str, symbol: &Symbol, book: &BookState) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.clone(),
            stream: Stream::Snapshot,
            sequence_id: book.sequence_id(),
            asks: book.asks().map(|(p, q)| LevelChange::insert(p, q)).collect(),
            bids: book.bids().map(|(p, q)| LevelChange::insert(p, q)).collect(),
            ask_sum_qty: book.total_ask_quantity(),
            bid_sum_qty: book.total_bid_quantity(),
        }
    }

    /// Number of level transitions carried
    pub fn len(&self) -> usize {
        self.asks.len() + self.bids.len()
    }

    /// Whether the event carries no level transitions
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Apply this event to a downstream replica.
    ///
    /// Snapshots clear the replica first. The replica's sequence follows
    /// book-stream events only.
    pub fn apply_to(&self, replica: &mut BookState) {
        if self.stream == Stream::Snapshot {
            replica.clear();
        }
        for change in &self.asks {
            replica.set_ask(change.price, change.quantity);
        }
        for change in &self.bids {
            replica.set_bid(change.price, change.quantity);
        }
        if self.stream != Stream::Difftrade {
            replica.set_sequence_id(self.sequence_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_event_serialization() {
        let event = DiffEvent {
            exchange: "binance".to_string(),
            symbol: "BTC/USDT".parse().unwrap(),
            stream: Stream::Diffbooks,
            sequence_id: 12,
            asks: vec![LevelChange::update(100.into(), 3.into())],
            bids: vec![LevelChange::delete(99.into())],
            ask_sum_qty: 6.into(),
            bid_sum_qty: Quantity::ZERO,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stream"], "diffbooks");
        assert_eq!(json["sequenceId"], 12);
        assert_eq!(json["asks"][0]["action"], "update");
        assert_eq!(json["bids"][0]["action"], "delete");
        assert_eq!(json["askSumQty"], "6");
    }

    #[test]
    fn test_apply_snapshot_replaces_replica() {
        let mut replica = BookState::new();
        replica.set_ask(105.into(), 1.into());

        let mut source = BookState::new();
        source.set_ask(100.into(), 5.into());
        source.set_bid(99.into(), 4.into());
        source.set_sequence_id(8);

        let event = DiffEvent::snapshot_of("test", &"BTC/USDT".parse().unwrap(), &source);
        event.apply_to(&mut replica);

        assert_eq!(replica, source);
    }

    #[test]
    fn test_apply_diff_is_idempotent() {
        let mut replica = BookState::new();
        replica.set_ask(100.into(), 5.into());

        let event = DiffEvent {
            exchange: "test".to_string(),
            symbol: "BTC/USDT".parse().unwrap(),
            stream: Stream::Difftrade,
            sequence_id: 3,
            asks: vec![LevelChange::update(100.into(), 3.into())],
            bids: vec![],
            ask_sum_qty: 3.into(),
            bid_sum_qty: Quantity::ZERO,
        };

        event.apply_to(&mut replica);
        let once = replica.clone();
        event.apply_to(&mut replica);

        assert_eq!(replica, once);
        assert_eq!(replica.best_ask(), Some((Price::from(100), Quantity::from(3))));
    }
}
