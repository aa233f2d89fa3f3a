//! Merge engine.
//!
//! Turns validated [`WireMessage`]s into mutations of the [`BookStore`] and
//! the minimal [`DiffEvent`] describing each mutation. The engine knows
//! nothing about where a message came from: push feed and poller output go
//! through the same path.
//!
//! - `snapshot` - wholesale install
//! - `diff` - incremental merge, periodic resync, trade/book cross-validation
//! - `trades` - trade-driven depletion
//!
//! Every step runs inside the symbol's critical section
//! ([`BookStore::with_entry`]) and returns the event to the caller, which
//! publishes it after the lock is released.

mod diff;
mod snapshot;
mod trades;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::orderbook::{BookSide, BookState, BookStore, ReconciliationSettings};
use crate::types::{DiffEvent, LevelChange, Price, Resolved, SequenceId, Stream, Symbol, WireMessage};
use crate::Result;

/// How a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    /// State changed; an event was produced
    Applied,
    /// Accepted but nothing changed
    NoChange,
    /// Sequence at or behind the book (or trade stream); skipped
    Stale,
    /// Diff already reflected by trade depletion; suppressed
    Redundant,
    /// Diff disagreed with trade depletion and overwrote it
    Conflict,
}

/// Result of applying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// How the message was handled
    pub outcome: ApplyOutcome,
    /// Event to publish, if any
    pub event: Option<DiffEvent>,
}

impl Merged {
    pub(crate) fn applied(event: DiffEvent) -> Self {
        Self {
            outcome: ApplyOutcome::Applied,
            event: Some(event),
        }
    }

    pub(crate) fn skipped(outcome: ApplyOutcome) -> Self {
        Self { outcome, event: None }
    }
}

/// Level changes accumulated during one merge step; per price, the last change wins.
#[derive(Debug, Default)]
struct ChangeSet {
    asks: BTreeMap<Price, LevelChange>,
    bids: BTreeMap<Price, LevelChange>,
}

impl ChangeSet {
    fn record(&mut self, side: BookSide, change: Option<LevelChange>) {
        if let Some(change) = change {
            let changes = match side {
                BookSide::Ask => &mut self.asks,
                BookSide::Bid => &mut self.bids,
            };
            changes.insert(change.price, change);
        }
    }

    fn extend(&mut self, side: BookSide, changes: Vec<LevelChange>) {
        for change in changes {
            self.record(side, Some(change));
        }
    }

    fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Remember every changed price as trade-depleted
    fn mark_depleted(&self, settings: &mut ReconciliationSettings) {
        for &price in self.asks.keys() {
            settings.record_depleted(BookSide::Ask, price);
        }
        for &price in self.bids.keys() {
            settings.record_depleted(BookSide::Bid, price);
        }
    }

    /// Whether any change lands on a level that trades depleted
    fn contradicts(&self, settings: &ReconciliationSettings) -> bool {
        self.asks.keys().any(|&p| settings.was_depleted(BookSide::Ask, p))
            || self.bids.keys().any(|&p| settings.was_depleted(BookSide::Bid, p))
    }

    fn into_event(
        self,
        exchange: &str,
        symbol: &Symbol,
        stream: Stream,
        sequence_id: SequenceId,
        book: &BookState,
    ) -> DiffEvent {
        DiffEvent {
            exchange: exchange.to_string(),
            symbol: symbol.clone(),
            stream,
            sequence_id,
            asks: self.asks.into_values().collect(),
            bids: self.bids.into_values().rev().collect(),
            ask_sum_qty: book.total_ask_quantity(),
            bid_sum_qty: book.total_bid_quantity(),
        }
    }
}

/// Applies messages to a [`BookStore`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use book_sync::engine::{ApplyOutcome, MergeEngine};
/// use book_sync::orderbook::BookStore;
/// use book_sync::types::{LevelUpdate, Stream, WireMessage};
///
/// let store = Arc::new(BookStore::new());
/// let engine = MergeEngine::new(store.clone(), 2);
/// let symbol = "BTC/USDT".parse().unwrap();
///
/// let msg = WireMessage::snapshot(
///     "binance",
///     symbol,
///     1,
///     vec![LevelUpdate::new(100.into(), 5.into())],
///     vec![LevelUpdate::new(99.into(), 4.into())],
/// );
///
/// let merged = engine.apply(&msg).unwrap();
/// assert_eq!(merged.outcome, ApplyOutcome::Applied);
/// assert_eq!(merged.event.unwrap().stream, Stream::Snapshot);
/// ```
#[derive(Debug, Clone)]
pub struct MergeEngine {
    store: Arc<BookStore>,
    resync_threshold: u32,
}

impl MergeEngine {
    /// Create an engine over `store`. A `resync_threshold` below 1 behaves as 1.
    pub fn new(store: Arc<BookStore>, resync_threshold: u32) -> Self {
        Self {
            store,
            resync_threshold: resync_threshold.max(1),
        }
    }

    /// The store this engine mutates
    pub fn store(&self) -> &Arc<BookStore> {
        &self.store
    }

    /// Diffs published per symbol between full snapshots
    pub fn resync_threshold(&self) -> u32 {
        self.resync_threshold
    }

    /// Validate and apply one message.
    ///
    /// Malformed messages are rejected before any state is touched.
    pub fn apply(&self, msg: &WireMessage) -> Result<Merged> {
        let merged = match msg.resolve()? {
            Resolved::Snapshot(book) => self.install_snapshot(msg, book),
            Resolved::Diff(book) => self.merge_diff(msg, book),
            Resolved::Trades(trades) => self.apply_trades(msg, trades),
        };

        trace!(
            exchange = %msg.exchange,
            symbol = %msg.symbol,
            sequence_id = msg.sequence_id,
            outcome = ?merged.outcome,
            "Message applied"
        );

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{LevelUpdate, Symbol};

    fn btc() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    #[test]
    fn test_threshold_clamped() {
        let engine = MergeEngine::new(Arc::new(BookStore::new()), 0);
        assert_eq!(engine.resync_threshold(), 1);
    }

    #[test]
    fn test_malformed_message_leaves_state_untouched() {
        let store = Arc::new(BookStore::new());
        let engine = MergeEngine::new(store.clone(), 2);

        let msg = WireMessage::diff(
            "test",
            btc(),
            1,
            vec![
                LevelUpdate::new(100.into(), 1.into()),
                LevelUpdate::new(101.into(), (-2).into()),
            ],
            vec![],
        );

        assert!(matches!(engine.apply(&msg), Err(Error::MalformedPayload { .. })));
        assert!(store.is_empty());
    }
}
