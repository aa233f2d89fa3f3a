//! Local order book replicas.
//!
//! - [`book`] - [`BookState`], one symbol's price levels with the no-ghost-level invariant
//! - [`settings`] - [`ReconciliationSettings`], resync cadence and trade/book cross-validation state
//! - [`store`] - [`BookStore`], the concurrent symbol map the merge engine mutates
//!
//! # Example
//!
//! ```rust
//! use book_sync::orderbook::{BookSide, BookState};
//!
//! let mut book = BookState::new();
//!
//! book.apply_level(BookSide::Ask, 101.into(), 3.into());
//! book.apply_level(BookSide::Bid, 99.into(), 4.into());
//!
//! if let Some((price, qty)) = book.best_bid() {
//!     println!("Best bid: {} @ {}", qty, price);
//! }
//! ```

pub mod book;
pub mod settings;
pub mod store;

pub use book::{BookSide, BookState};
pub use settings::ReconciliationSettings;
pub use store::{BookStore, SymbolEntry};
