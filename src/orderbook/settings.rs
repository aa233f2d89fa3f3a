//! Per-symbol reconciliation bookkeeping.

use std::collections::BTreeSet;

use super::BookSide;
use crate::types::{Price, Quantity, SequenceId, TimestampMs};

/// State that drives resync cadence and trade/book cross-validation for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSettings {
    /// Wall-clock time of the last snapshot or diff that touched the book
    pub last_order_book_timestamp: TimestampMs,
    /// Diffs published since the last full snapshot
    pub update_counter: u32,
    /// Highest trade sequence applied
    pub last_trade_sequence_id: SequenceId,
    /// Ask total captured before the first unconfirmed trade batch
    pub before_trade_ask_qty: Quantity,
    /// Bid total captured before the first unconfirmed trade batch
    pub before_trade_bid_qty: Quantity,
    /// Trades have depleted the book since the last book diff
    pub trades_applied: bool,
    /// Ask prices changed by trades since the last book diff
    pub depleted_asks: BTreeSet<Price>,
    /// Bid prices changed by trades since the last book diff
    pub depleted_bids: BTreeSet<Price>,
}

impl ReconciliationSettings {
    /// Fresh settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset after a snapshot re-anchors the book.
    ///
    /// The trade sequence is kept: the trade stream is independent of book snapshots.
    pub fn reset_for_snapshot(&mut self, now: TimestampMs) {
        self.last_order_book_timestamp = now;
        self.update_counter = 0;
        self.clear_trade_marks();
    }

    /// Record pre-depletion totals, unless a previous batch already did.
    pub fn mark_trades_applied(&mut self, ask_total: Quantity, bid_total: Quantity) {
        if !self.trades_applied {
            self.before_trade_ask_qty = ask_total;
            self.before_trade_bid_qty = bid_total;
            self.trades_applied = true;
        }
    }

    /// Remember that a trade changed the level at `price`
    pub fn record_depleted(&mut self, side: BookSide, price: Price) {
        match side {
            BookSide::Ask => self.depleted_asks.insert(price),
            BookSide::Bid => self.depleted_bids.insert(price),
        };
    }

    /// Whether a trade changed the level at `price` since the last book diff
    pub fn was_depleted(&self, side: BookSide, price: Price) -> bool {
        match side {
            BookSide::Ask => self.depleted_asks.contains(&price),
            BookSide::Bid => self.depleted_bids.contains(&price),
        }
    }

    /// Forget pending trade depletion
    pub fn clear_trade_marks(&mut self) {
        self.trades_applied = false;
        self.before_trade_ask_qty = Quantity::ZERO;
        self.before_trade_bid_qty = Quantity::ZERO;
        self.depleted_asks.clear();
        self.depleted_bids.clear();
    }

    /// Count one published diff. Returns `true` when a full resync is due,
    /// in which case the counter is reset.
    pub fn count_update(&mut self, threshold: u32) -> bool {
        self.update_counter += 1;
        if self.update_counter >= threshold.max(1) {
            self.update_counter = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_update_threshold() {
        let mut settings = ReconciliationSettings::new();
        assert!(!settings.count_update(3));
        assert!(!settings.count_update(3));
        assert!(settings.count_update(3));
        assert_eq!(settings.update_counter, 0);
    }

    #[test]
    fn test_zero_threshold_always_resyncs() {
        let mut settings = ReconciliationSettings::new();
        assert!(settings.count_update(0));
        assert!(settings.count_update(0));
    }

    #[test]
    fn test_mark_trades_keeps_first_totals() {
        let mut settings = ReconciliationSettings::new();
        settings.mark_trades_applied(8.into(), 4.into());
        settings.mark_trades_applied(6.into(), 4.into());

        assert!(settings.trades_applied);
        assert_eq!(settings.before_trade_ask_qty, Quantity::from(8));

        settings.reset_for_snapshot(1_000);
        assert!(!settings.trades_applied);
        assert_eq!(settings.last_order_book_timestamp, 1_000);
    }

    #[test]
    fn test_depleted_levels_cleared_with_marks() {
        let mut settings = ReconciliationSettings::new();
        settings.record_depleted(BookSide::Ask, 100.into());

        assert!(settings.was_depleted(BookSide::Ask, 100.into()));
        assert!(!settings.was_depleted(BookSide::Bid, 100.into()));

        settings.clear_trade_marks();
        assert!(!settings.was_depleted(BookSide::Ask, 100.into()));
    }
}
