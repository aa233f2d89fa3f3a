//! Ingestion and publishing.
//!
//! - [`queue`] - [`IngestionQueue`], the bounded FIFO every producer pushes into
//! - [`processor`] - [`Processor`], the single consumer applying messages through the engine
//! - [`publisher`] - [`Publisher`] sink and the channel-backed [`ChannelPublisher`]

pub mod processor;
pub mod publisher;
pub mod queue;

pub use processor::Processor;
pub use publisher::{ChannelPublisher, Publisher, PublisherEvent};
pub use queue::{IngestionQueue, OverflowPolicy};
