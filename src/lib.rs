//! # book-sync
//!
//! Exchange-agnostic order book synchronization and reconciliation.
//!
//! Ingests snapshots, incremental diffs and trades from many exchanges,
//! normalizes them into a canonical per-symbol book and publishes the minimal
//! change-set after every step so downstream consumers can keep an exact
//! replica.
//!
//! ## Features
//!
//! - **Merge Engine** - Snapshot install, incremental diffs, trade-driven depletion
//! - **Reconciliation** - Periodic full resync, trade/book cross-validation
//! - **Push and Poll** - WebSocket feeds with reconnect, REST polling with rate-limit backoff
//! - **Backpressure** - Bounded ingestion queue with coalescing
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use book_sync::engine::MergeEngine;
//! use book_sync::orderbook::BookStore;
//! use book_sync::types::{LevelUpdate, Price, Quantity, Trade, TradeSide, WireMessage};
//!
//! let store = Arc::new(BookStore::new());
//! let engine = MergeEngine::new(store.clone(), 2);
//! let btc: book_sync::types::Symbol = "BTC/USDT".parse().unwrap();
//!
//! engine.apply(&WireMessage::snapshot(
//!     "binance",
//!     btc.clone(),
//!     1,
//!     vec![LevelUpdate::new(100.into(), 5.into())],
//!     vec![LevelUpdate::new(99.into(), 4.into())],
//! )).unwrap();
//!
//! let trade = Trade {
//!     price: 100.into(),
//!     quantity: 2.into(),
//!     side: TradeSide::Sell,
//!     sequence_id: 1,
//!     timestamp_ms: 0,
//! };
//! let merged = engine.apply(&WireMessage::trades("binance", btc.clone(), vec![trade])).unwrap();
//!
//! assert_eq!(store.best_ask(&btc), Some((Price::from(100), Quantity::from(3))));
//! assert_eq!(merged.event.unwrap().asks.len(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Normalized upstream messages and downstream events
//! - [`orderbook`] - Per-symbol book state and the concurrent store
//! - [`engine`] - The merge engine
//! - [`pipeline`] - Ingestion queue, consumer loop, publisher
//! - [`transport`] - Exchange adapters, push feed, poller
//! - [`context`] - Per-instance wiring and lifecycle
//! - [`config`] - Configuration
//! - [`error`] - Error types for the crate
//!
//! ## Concurrency
//!
//! - Many producers, exactly one consumer per [`SyncContext`]
//! - `parking_lot` locks, per-symbol write locks, copy-on-read
//! - `FxHashMap` keyed by symbol
//! - Decimal prices and quantities, `BTreeMap` price levels

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod orderbook;
pub mod pipeline;
pub mod transport;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::{Config, FeedMode};
pub use context::SyncContext;
pub use engine::{ApplyOutcome, MergeEngine};
pub use error::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
