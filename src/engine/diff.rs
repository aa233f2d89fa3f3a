//! Incremental diff merge.

use tracing::debug;

use super::{ApplyOutcome, ChangeSet, MergeEngine, Merged};
use crate::orderbook::{BookSide, BookState};
use crate::types::{now_ms, DiffEvent, OrderbookPayload, Stream, WireMessage};

impl MergeEngine {
    /// Merge the level changes in `msg` into the symbol's book.
    ///
    /// A diff for a symbol without a book installs its levels as the initial
    /// state and publishes a snapshot. Every `resync_threshold`th diff that
    /// changes something is published as a full snapshot instead.
    ///
    /// After trades, the diff is checked against the levels they depleted:
    /// changing one of those is a conflict, changing nothing is redundant.
    pub(crate) fn merge_diff(&self, msg: &WireMessage, payload: &OrderbookPayload) -> Merged {
        let sequence_id = msg.sequence_id;
        let threshold = self.resync_threshold;

        self.store.with_entry(&msg.symbol, |entry| {
            let book = match entry.book.as_mut() {
                Some(book) => book,
                None => {
                    let mut book = BookState::new();
                    book.install(&payload.asks, &payload.bids, sequence_id);
                    entry.settings.reset_for_snapshot(now_ms());

                    debug!(
                        exchange = %msg.exchange,
                        symbol = %msg.symbol,
                        sequence_id,
                        "Diff for untracked symbol installed as initial book"
                    );

                    let event = DiffEvent::snapshot_of(&msg.exchange, &msg.symbol, &book);
                    entry.book = Some(book);
                    return Merged::applied(event);
                }
            };

            if sequence_id != 0 && sequence_id <= book.sequence_id() {
                debug!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    sequence_id,
                    current = book.sequence_id(),
                    "Skipping stale diff"
                );
                return Merged::skipped(ApplyOutcome::Stale);
            }

            let mut changes = ChangeSet::default();
            for level in &payload.asks {
                changes.record(BookSide::Ask, book.apply_level(BookSide::Ask, level.price, level.quantity));
            }
            for level in &payload.bids {
                changes.record(BookSide::Bid, book.apply_level(BookSide::Bid, level.price, level.quantity));
            }
            if sequence_id != 0 {
                book.set_sequence_id(sequence_id);
            }

            let settings = &mut entry.settings;
            settings.last_order_book_timestamp = now_ms();

            let trades_applied = settings.trades_applied;
            let conflicting = trades_applied && changes.contradicts(settings);
            let (before_ask, before_bid) = (settings.before_trade_ask_qty, settings.before_trade_bid_qty);
            settings.clear_trade_marks();

            if changes.is_empty() {
                if trades_applied {
                    debug!(
                        exchange = %msg.exchange,
                        symbol = %msg.symbol,
                        sequence_id,
                        "Diff already reflected by trade depletion, suppressed"
                    );
                    return Merged::skipped(ApplyOutcome::Redundant);
                }
                return Merged::skipped(ApplyOutcome::NoChange);
            }

            let outcome = if conflicting {
                debug!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    sequence_id,
                    before_ask = %before_ask,
                    before_bid = %before_bid,
                    after_ask = %book.total_ask_quantity(),
                    after_bid = %book.total_bid_quantity(),
                    "Diff conflicts with trade depletion, diff wins"
                );
                ApplyOutcome::Conflict
            } else {
                ApplyOutcome::Applied
            };

            let event = if settings.count_update(threshold) {
                debug!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    sequence_id,
                    "Resync threshold reached, publishing snapshot"
                );
                DiffEvent::snapshot_of(&msg.exchange, &msg.symbol, book)
            } else {
                changes.into_event(&msg.exchange, &msg.symbol, Stream::Diffbooks, book.sequence_id(), book)
            };

            Merged {
                outcome,
                event: Some(event),
            }
        })
    }
}
