//! Concurrent symbol state store.
//!
//! This module provides [`BookStore`], a thread-safe map from [`Symbol`] to
//! that symbol's [`BookState`] and [`ReconciliationSettings`].
//!
//! # Design
//!
//! The store uses `parking_lot::RwLock` for the symbol map and a second
//! `RwLock` per symbol. Only the processing loop mutates entries, so
//! per-symbol write locks see no contention; readers receive cloned copies
//! and never hold a lock across an await point.

use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::types::{Price, Quantity, Symbol, TimestampMs};

use super::{BookState, ReconciliationSettings};

/// Everything the engine tracks for one symbol
#[derive(Debug, Clone, Default)]
pub struct SymbolEntry {
    /// `None` until the first snapshot or insert-only diff arrives
    pub book: Option<BookState>,
    /// Resync and cross-validation state
    pub settings: ReconciliationSettings,
}

/// Thread-safe container for every symbol's book state.
///
/// # Example
///
/// ```rust
/// use book_sync::orderbook::BookStore;
///
/// let store = BookStore::new();
/// let symbol = "BTC/USDT".parse().unwrap();
///
/// assert!(store.get_book(&symbol).is_none());
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct BookStore {
    /// Entries by symbol
    entries: RwLock<FxHashMap<Symbol, RwLock<SymbolEntry>>>,
}

impl BookStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the symbol's entry, creating the entry
    /// if it doesn't exist yet.
    ///
    /// The per-symbol lock is held for the duration of `f` only; callers must
    /// not publish or perform I/O inside it.
    pub fn with_entry<R>(&self, symbol: &Symbol, f: impl FnOnce(&mut SymbolEntry) -> R) -> R {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(symbol) {
                return f(&mut entry.write());
            }
        }

        let mut entries = self.entries.write();
        let entry = entries
            .entry(symbol.clone())
            .or_insert_with(|| RwLock::new(SymbolEntry::default()));
        f(entry.get_mut())
    }

    /// Run `f` with shared access to the symbol's entry, if tracked
    pub fn read_entry<R>(&self, symbol: &Symbol, f: impl FnOnce(&SymbolEntry) -> R) -> Option<R> {
        let entries = self.entries.read();
        entries.get(symbol).map(|e| f(&e.read()))
    }

    /// Get a copy of a symbol's book
    ///
    /// Returns a cloned copy for safe reading without holding locks.
    pub fn get_book(&self, symbol: &Symbol) -> Option<BookState> {
        self.read_entry(symbol, |e| e.book.clone()).flatten()
    }

    /// Get a copy of a symbol's reconciliation settings
    pub fn get_settings(&self, symbol: &Symbol) -> Option<ReconciliationSettings> {
        self.read_entry(symbol, |e| e.settings.clone())
    }

    /// Get best bid for a symbol
    pub fn best_bid(&self, symbol: &Symbol) -> Option<(Price, Quantity)> {
        self.read_entry(symbol, |e| e.book.as_ref().and_then(BookState::best_bid))
            .flatten()
    }

    /// Get best ask for a symbol
    pub fn best_ask(&self, symbol: &Symbol) -> Option<(Price, Quantity)> {
        self.read_entry(symbol, |e| e.book.as_ref().and_then(BookState::best_ask))
            .flatten()
    }

    /// Get mid price for a symbol
    pub fn mid_price(&self, symbol: &Symbol) -> Option<Price> {
        self.read_entry(symbol, |e| e.book.as_ref().and_then(BookState::mid_price))
            .flatten()
    }

    /// Get spread for a symbol
    pub fn spread(&self, symbol: &Symbol) -> Option<Price> {
        self.read_entry(symbol, |e| e.book.as_ref().and_then(BookState::spread))
            .flatten()
    }

    /// Symbols whose book hasn't been touched for longer than `max_age`,
    /// including symbols that only ever saw trades.
    pub fn stale_symbols(&self, max_age: Duration, now: TimestampMs) -> Vec<Symbol> {
        let max_age_ms = max_age.as_millis() as TimestampMs;
        let entries = self.entries.read();
        let mut stale: Vec<Symbol> = entries
            .iter()
            .filter(|(_, entry)| {
                let e = entry.read();
                e.book.is_none()
                    || now.saturating_sub(e.settings.last_order_book_timestamp) > max_age_ms
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Stop tracking a symbol
    pub fn remove_symbol(&self, symbol: &Symbol) -> Option<BookState> {
        let mut entries = self.entries.write();
        entries.remove(symbol).and_then(|e| e.into_inner().book)
    }

    /// Whether the symbol has a materialized book
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.read_entry(symbol, |e| e.book.is_some()).unwrap_or(false)
    }

    /// Drop every symbol
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Get number of tracked symbols
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store tracks no symbols
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All tracked symbols, sorted
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.entries.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::LevelUpdate;

    fn sym(s: &str) -> Symbol {
        s.parse().unwrap()
    }

    fn install(store: &BookStore, symbol: &Symbol, now: TimestampMs) {
        store.with_entry(symbol, |entry| {
            let mut book = BookState::new();
            book.install(
                &[LevelUpdate::new(101.into(), 2.into())],
                &[LevelUpdate::new(99.into(), 3.into())],
                1,
            );
            entry.book = Some(book);
            entry.settings.reset_for_snapshot(now);
        });
    }

    #[test]
    fn test_with_entry_creates_once() {
        let store = BookStore::new();
        let btc = sym("BTC/USDT");

        store.with_entry(&btc, |e| e.settings.last_trade_sequence_id = 5);
        store.with_entry(&btc, |e| e.settings.last_trade_sequence_id += 1);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_settings(&btc).unwrap().last_trade_sequence_id, 6);
        assert!(!store.contains(&btc));
    }

    #[test]
    fn test_copy_on_read() {
        let store = BookStore::new();
        let btc = sym("BTC/USDT");
        install(&store, &btc, 0);

        let mut copy = store.get_book(&btc).unwrap();
        copy.clear();

        assert_eq!(store.best_bid(&btc), Some((Price::from(99), Quantity::from(3))));
        assert_eq!(store.best_ask(&btc), Some((Price::from(101), Quantity::from(2))));
        assert_eq!(store.mid_price(&btc), Some(Price::from(100)));
        assert_eq!(store.spread(&btc), Some(Price::from(2)));
    }

    #[test]
    fn test_stale_symbols() {
        let store = BookStore::new();
        let btc = sym("BTC/USDT");
        let eth = sym("ETH/USDT");
        let sol = sym("SOL/USDT");

        install(&store, &btc, 1_000);
        install(&store, &eth, 9_000);
        store.with_entry(&sol, |_| ());

        let stale = store.stale_symbols(Duration::from_secs(5), 10_000);
        assert_eq!(stale, vec![btc, sol]);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = BookStore::new();
        let btc = sym("BTC/USDT");
        install(&store, &btc, 0);
        install(&store, &sym("ETH/USDT"), 0);

        assert!(store.remove_symbol(&btc).is_some());
        assert_eq!(store.symbols(), vec![sym("ETH/USDT")]);

        store.clear();
        assert!(store.is_empty());
    }
}
