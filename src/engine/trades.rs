//! Trade-driven book depletion.
//!
//! A trade proves two things about the book: the level it executed against
//! lost the traded quantity, and nothing on either side can rest inside the
//! traded price. Both are applied immediately, ahead of the exchange's own
//! book diff, and later cross-checked against that diff.

use tracing::debug;

use super::{ApplyOutcome, ChangeSet, MergeEngine, Merged};
use crate::orderbook::BookSide;
use crate::types::{Stream, Trade, WireMessage};

impl MergeEngine {
    /// Deplete the symbol's book with a trade batch, in trade sequence order.
    pub(crate) fn apply_trades(&self, msg: &WireMessage, trades: &[Trade]) -> Merged {
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.sequence_id);

        self.store.with_entry(&msg.symbol, |entry| {
            let settings = &mut entry.settings;
            let totals_before = entry
                .book
                .as_ref()
                .map(|b| (b.total_ask_quantity(), b.total_bid_quantity()));

            let mut changes = ChangeSet::default();
            let mut accepted = 0usize;

            for trade in ordered {
                if trade.sequence_id != 0 && trade.sequence_id <= settings.last_trade_sequence_id {
                    debug!(
                        exchange = %msg.exchange,
                        symbol = %msg.symbol,
                        sequence_id = trade.sequence_id,
                        last = settings.last_trade_sequence_id,
                        "Skipping stale trade"
                    );
                    continue;
                }
                accepted += 1;
                settings.last_trade_sequence_id = settings.last_trade_sequence_id.max(trade.sequence_id);

                let Some(book) = entry.book.as_mut() else {
                    continue;
                };

                let side = BookSide::from(trade.side);
                changes.record(side, book.deplete(side, trade.price, trade.quantity));

                let (asks, bids) = book.purge_inside(trade.price);
                changes.extend(BookSide::Ask, asks);
                changes.extend(BookSide::Bid, bids);
            }

            if accepted == 0 && !trades.is_empty() {
                return Merged::skipped(ApplyOutcome::Stale);
            }

            let (Some(book), Some((ask_total, bid_total))) = (entry.book.as_ref(), totals_before) else {
                debug!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    last_trade_sequence_id = settings.last_trade_sequence_id,
                    "Trades for symbol without a book, sequence advanced only"
                );
                return Merged::skipped(ApplyOutcome::NoChange);
            };

            if changes.is_empty() {
                return Merged::skipped(ApplyOutcome::NoChange);
            }

            settings.mark_trades_applied(ask_total, bid_total);
            changes.mark_depleted(settings);

            Merged::applied(changes.into_event(
                &msg.exchange,
                &msg.symbol,
                Stream::Difftrade,
                settings.last_trade_sequence_id,
                book,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::engine::{ApplyOutcome, MergeEngine};
    use crate::orderbook::{BookSide, BookStore};
    use crate::types::{LevelChange, LevelUpdate, Price, Quantity, Stream, Symbol, Trade, TradeSide, WireMessage};

    fn btc() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    fn trade(seq: i64, price: i64, qty: i64, side: TradeSide) -> Trade {
        Trade {
            price: Price::from(price),
            quantity: Quantity::from(qty),
            side,
            sequence_id: seq,
            timestamp_ms: 0,
        }
    }

    fn seeded() -> (Arc<BookStore>, MergeEngine) {
        let store = Arc::new(BookStore::new());
        let engine = MergeEngine::new(store.clone(), 2);
        let snapshot = WireMessage::snapshot(
            "test",
            btc(),
            1,
            vec![
                LevelUpdate::new(100.into(), 5.into()),
                LevelUpdate::new(101.into(), 3.into()),
            ],
            vec![
                LevelUpdate::new(99.into(), 4.into()),
                LevelUpdate::new(98.into(), 2.into()),
            ],
        );
        engine.apply(&snapshot).unwrap();
        (store, engine)
    }

    fn apply(engine: &MergeEngine, trades: Vec<Trade>) -> crate::engine::Merged {
        engine.apply(&WireMessage::trades("test", btc(), trades)).unwrap()
    }

    #[test]
    fn test_partial_fill_updates_level() {
        let (store, engine) = seeded();

        let merged = apply(&engine, vec![trade(1, 100, 2, TradeSide::Sell)]);
        let event = merged.event.unwrap();

        assert_eq!(event.stream, Stream::Difftrade);
        assert_eq!(event.sequence_id, 1);
        assert_eq!(event.asks, vec![LevelChange::update(100.into(), 3.into())]);
        assert!(event.bids.is_empty());

        let settings = store.get_settings(&btc()).unwrap();
        assert!(settings.trades_applied);
        assert_eq!(settings.before_trade_ask_qty, Quantity::from(8));
        assert_eq!(settings.before_trade_bid_qty, Quantity::from(6));
        assert!(settings.was_depleted(BookSide::Ask, 100.into()));
        assert!(!settings.was_depleted(BookSide::Ask, 101.into()));
    }

    #[test]
    fn test_full_fill_deletes_level() {
        let (store, engine) = seeded();

        let event = apply(&engine, vec![trade(1, 99, 7, TradeSide::Buy)]).event.unwrap();

        assert_eq!(event.bids, vec![LevelChange::delete(99.into())]);
        let book = store.get_book(&btc()).unwrap();
        assert_eq!(book.best_bid(), Some((Price::from(98), Quantity::from(2))));
    }

    #[test]
    fn test_trade_purges_inside_levels() {
        let (store, engine) = seeded();

        let event = apply(&engine, vec![trade(1, 101, 1, TradeSide::Sell)]).event.unwrap();

        assert_eq!(
            event.asks,
            vec![
                LevelChange::delete(100.into()),
                LevelChange::update(101.into(), 2.into()),
            ]
        );
        let book = store.get_book(&btc()).unwrap();
        assert_eq!(book.best_ask(), Some((Price::from(101), Quantity::from(2))));
    }

    #[test]
    fn test_trade_without_level_still_purges() {
        let (_, engine) = seeded();

        let event = apply(&engine, vec![trade(1, 97, 1, TradeSide::Buy)]).event.unwrap();

        assert!(event.asks.is_empty());
        assert_eq!(
            event.bids,
            vec![LevelChange::delete(99.into()), LevelChange::delete(98.into())]
        );
    }

    #[test]
    fn test_stale_trade_skipped() {
        let (store, engine) = seeded();
        apply(&engine, vec![trade(5, 100, 1, TradeSide::Sell)]);
        let before = store.get_book(&btc()).unwrap();

        for seq in [5, 3] {
            let merged = apply(&engine, vec![trade(seq, 100, 1, TradeSide::Sell)]);
            assert_eq!(merged.outcome, ApplyOutcome::Stale);
            assert!(merged.event.is_none());
        }

        assert_eq!(store.get_book(&btc()).unwrap(), before);
        assert_eq!(store.get_settings(&btc()).unwrap().last_trade_sequence_id, 5);
    }

    #[test]
    fn test_batch_applied_in_sequence_order() {
        let (store, engine) = seeded();

        let event = apply(
            &engine,
            vec![trade(3, 100, 1, TradeSide::Sell), trade(2, 100, 1, TradeSide::Sell)],
        )
        .event
        .unwrap();

        assert_eq!(event.sequence_id, 3);
        assert_eq!(event.asks, vec![LevelChange::update(100.into(), 3.into())]);
        assert_eq!(
            store.get_book(&btc()).unwrap().level(BookSide::Ask, 100.into()),
            Some(Quantity::from(3))
        );
    }

    #[test]
    fn test_trades_for_unknown_symbol_advance_sequence() {
        let store = Arc::new(BookStore::new());
        let engine = MergeEngine::new(store.clone(), 2);

        let merged = apply(&engine, vec![trade(4, 100, 1, TradeSide::Buy)]);

        assert_eq!(merged.outcome, ApplyOutcome::NoChange);
        assert!(store.get_book(&btc()).is_none());
        assert_eq!(store.get_settings(&btc()).unwrap().last_trade_sequence_id, 4);
    }

    #[test]
    fn test_second_batch_keeps_first_totals() {
        let (store, engine) = seeded();

        apply(&engine, vec![trade(1, 100, 1, TradeSide::Sell)]);
        apply(&engine, vec![trade(2, 100, 1, TradeSide::Sell)]);

        let settings = store.get_settings(&btc()).unwrap();
        assert_eq!(settings.before_trade_ask_qty, Quantity::from(8));
        assert_eq!(settings.last_trade_sequence_id, 2);
    }
}
