//! Wholesale snapshot install.

use tracing::debug;

use super::{ApplyOutcome, MergeEngine, Merged};
use crate::orderbook::BookState;
use crate::types::{now_ms, DiffEvent, OrderbookPayload, WireMessage};

impl MergeEngine {
    /// Replace the symbol's book with the snapshot in `msg`.
    ///
    /// A sequenced snapshot older than a sequenced book is skipped.
    pub(crate) fn install_snapshot(&self, msg: &WireMessage, payload: &OrderbookPayload) -> Merged {
        let sequence_id = msg.sequence_id;

        self.store.with_entry(&msg.symbol, |entry| {
            if let Some(book) = &entry.book {
                let current = book.sequence_id();
                if sequence_id != 0 && current != 0 && sequence_id < current {
                    debug!(
                        exchange = %msg.exchange,
                        symbol = %msg.symbol,
                        sequence_id,
                        current,
                        "Skipping stale snapshot"
                    );
                    return Merged::skipped(ApplyOutcome::Stale);
                }
            }

            let book = entry.book.get_or_insert_with(BookState::new);
            book.install(&payload.asks, &payload.bids, sequence_id);
            entry.settings.reset_for_snapshot(now_ms());

            Merged::applied(DiffEvent::snapshot_of(&msg.exchange, &msg.symbol, book))
        })
    }
}
