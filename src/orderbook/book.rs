//! Per-symbol book state.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(1) access to best bid/ask (via `first_key_value` / `last_key_value`)
//! - Range scans for purging levels inside a traded price

use std::collections::BTreeMap;

use crate::types::events::LevelChange;
use crate::types::messages::{LevelUpdate, TradeSide};
use crate::types::{Price, Quantity, SequenceId};

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookSide {
    /// Sell orders, best = lowest price
    Ask,
    /// Buy orders, best = highest price
    Bid,
}

impl From<TradeSide> for BookSide {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Sell => BookSide::Ask,
            TradeSide::Buy => BookSide::Bid,
        }
    }
}

/// The locally materialized order book for one symbol.
///
/// # Invariants
///
/// No stored level ever has a quantity `<= 0`. Every mutator either removes
/// the level or refuses to store it.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The
/// [`BookStore`](super::BookStore) wraps each instance in a per-symbol mutex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookState {
    /// Ask levels: price -> quantity
    /// Sorted ascending by price (best ask = lowest = first)
    asks: BTreeMap<Price, Quantity>,

    /// Bid levels: price -> quantity
    /// Sorted ascending by price (best bid = highest = last)
    bids: BTreeMap<Price, Quantity>,

    /// Last accepted book sequence
    sequence_id: SequenceId,
}

impl BookState {
    /// Create a new empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current book sequence
    #[must_use]
    pub const fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Set the book sequence
    pub fn set_sequence_id(&mut self, sequence_id: SequenceId) {
        self.sequence_id = sequence_id;
    }

    /// Replace the entire book state.
    ///
    /// Levels with a non-positive quantity are not stored.
    pub fn install(&mut self, asks: &[LevelUpdate], bids: &[LevelUpdate], sequence_id: SequenceId) {
        self.asks.clear();
        self.bids.clear();

        for level in asks {
            if level.quantity > Quantity::ZERO {
                self.asks.insert(level.price, level.quantity);
            }
        }
        for level in bids {
            if level.quantity > Quantity::ZERO {
                self.bids.insert(level.price, level.quantity);
            }
        }

        self.sequence_id = sequence_id;
    }

    fn side_mut(&mut self, side: BookSide) -> &mut BTreeMap<Price, Quantity> {
        match side {
            BookSide::Ask => &mut self.asks,
            BookSide::Bid => &mut self.bids,
        }
    }

    fn side(&self, side: BookSide) -> &BTreeMap<Price, Quantity> {
        match side {
            BookSide::Ask => &self.asks,
            BookSide::Bid => &self.bids,
        }
    }

    /// Apply one absolute level update using the canonical transition rule.
    ///
    /// | quantity | level exists | result |
    /// |---|---|---|
    /// | 0 | yes | `delete` |
    /// | 0 | no | nothing |
    /// | > 0 | no | `insert` |
    /// | > 0, differs | yes | `update` |
    /// | > 0, same | yes | nothing |
    ///
    /// Negative quantities are treated as removal; callers validate first.
    pub fn apply_level(&mut self, side: BookSide, price: Price, quantity: Quantity) -> Option<LevelChange> {
        let book = self.side_mut(side);

        if quantity <= Quantity::ZERO {
            return book.remove(&price).map(|_| LevelChange::delete(price));
        }

        match book.get_mut(&price) {
            Some(current) if *current == quantity => None,
            Some(current) => {
                *current = quantity;
                Some(LevelChange::update(price, quantity))
            }
            None => {
                book.insert(price, quantity);
                Some(LevelChange::insert(price, quantity))
            }
        }
    }

    /// Reduce the level at `price` by `quantity`.
    ///
    /// Returns `None` when no level rests at `price`. A fill that consumes the
    /// whole level removes it.
    pub fn deplete(&mut self, side: BookSide, price: Price, quantity: Quantity) -> Option<LevelChange> {
        let book = self.side_mut(side);
        let current = book.get_mut(&price)?;

        if *current <= quantity {
            book.remove(&price);
            Some(LevelChange::delete(price))
        } else {
            *current -= quantity;
            Some(LevelChange::update(price, *current))
        }
    }

    /// Remove levels a trade at `price` proves stale: asks strictly below it
    /// and bids strictly above it.
    ///
    /// Returns `(ask_deletes, bid_deletes)`.
    pub fn purge_inside(&mut self, price: Price) -> (Vec<LevelChange>, Vec<LevelChange>) {
        let stale_asks: Vec<Price> = self.asks.range(..price).map(|(&p, _)| p).collect();
        let stale_bids: Vec<Price> = self
            .bids
            .range(price..)
            .map(|(&p, _)| p)
            .filter(|&p| p > price)
            .collect();

        for p in &stale_asks {
            self.asks.remove(p);
        }
        for p in &stale_bids {
            self.bids.remove(p);
        }

        (
            stale_asks.into_iter().map(LevelChange::delete).collect(),
            stale_bids.into_iter().map(LevelChange::delete).collect(),
        )
    }

    /// Set an ask level directly. Zero or negative quantity removes the level.
    pub fn set_ask(&mut self, price: Price, quantity: Quantity) {
        self.apply_level(BookSide::Ask, price, quantity);
    }

    /// Set a bid level directly. Zero or negative quantity removes the level.
    pub fn set_bid(&mut self, price: Price, quantity: Quantity) {
        self.apply_level(BookSide::Bid, price, quantity);
    }

    /// Quantity resting at `price`, if any
    #[must_use]
    pub fn level(&self, side: BookSide, price: Price) -> Option<Quantity> {
        self.side(side).get(&price).copied()
    }

    /// Get the best bid (highest bid)
    ///
    /// Returns `(price, quantity)` or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.last_key_value().map(|(&p, &q)| (p, q))
    }

    /// Get the best ask (lowest ask)
    ///
    /// Returns `(price, quantity)` or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.first_key_value().map(|(&p, &q)| (p, q))
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is missing.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Price::TWO),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.bids.iter().rev().map(|(&p, &q)| (p, q))
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.asks.iter().map(|(&p, &q)| (p, q))
    }

    /// Get the top N bid levels
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.bids().take(n).collect()
    }

    /// Get total bid quantity
    #[must_use]
    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.values().sum()
    }

    /// Get total ask quantity
    #[must_use]
    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.values().sum()
    }

    /// Total quantity for one side
    #[must_use]
    pub fn total_quantity(&self, side: BookSide) -> Quantity {
        self.side(side).values().sum()
    }

    /// Clear the book
    pub fn clear(&mut self) {
        self.asks.clear();
        self.bids.clear();
        self.sequence_id = 0;
    }

    /// Check if the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Get the number of price levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Whether every stored level has a strictly positive quantity
    #[must_use]
    pub fn has_no_ghost_levels(&self) -> bool {
        self.asks
            .values()
            .chain(self.bids.values())
            .all(|q| *q > Quantity::ZERO)
    }
}
