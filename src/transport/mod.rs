//! Getting data in.
//!
//! - [`adapter`] - [`ExchangeAdapter`] decoding seam and [`NormalizedJsonAdapter`]
//! - [`feed`] - [`PushFeed`], WebSocket with reconnect and subscription replay
//! - [`poller`] - [`Poller`], REST fallback with rate-limit backoff
//! - [`backoff`] - [`BackoffPolicy`] shared by both
//!
//! Transport errors stay here. The merge engine only ever sees decoded
//! [`WireMessage`](crate::types::WireMessage)s.

pub mod adapter;
pub mod backoff;
pub mod feed;
pub mod poller;

pub use adapter::{ExchangeAdapter, NormalizedJsonAdapter};
pub use backoff::BackoffPolicy;
pub use feed::PushFeed;
pub use poller::{PollBackoff, Poller};
