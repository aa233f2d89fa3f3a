//! Downstream sink for merge results.

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::types::DiffEvent;

/// Receives every event the engine produces and every error surfaced by the
/// processing loop, feeds and pollers.
///
/// Implementations must not block: they are called from the consumer loop.
pub trait Publisher: Send + Sync {
    /// Publish one change-set
    fn publish(&self, event: DiffEvent);

    /// Surface an error that was handled (message dropped, reconnect, backoff)
    fn publish_error(&self, error: Error);
}

/// Item delivered by [`ChannelPublisher`]
#[derive(Debug)]
pub enum PublisherEvent {
    /// A change-set
    Diff(DiffEvent),
    /// A surfaced error
    Error(Error),
}

/// [`Publisher`] backed by an unbounded tokio channel.
///
/// # Example
///
/// ```rust
/// use book_sync::pipeline::{ChannelPublisher, Publisher, PublisherEvent};
/// use book_sync::Error;
///
/// let (publisher, mut rx) = ChannelPublisher::new();
/// publisher.publish_error(Error::Timeout);
///
/// assert!(matches!(rx.try_recv(), Ok(PublisherEvent::Error(Error::Timeout))));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<PublisherEvent>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublisherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PublisherEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!(event = ?e.0, "Publisher receiver dropped, event discarded");
        }
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, event: DiffEvent) {
        self.send(PublisherEvent::Diff(event));
    }

    fn publish_error(&self, error: Error) {
        self.send(PublisherEvent::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::BookState;

    #[test]
    fn test_channel_publisher_delivers_in_order() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let event = DiffEvent::snapshot_of("test", &"BTC/USDT".parse().unwrap(), &BookState::new());

        publisher.publish(event.clone());
        publisher.publish_error(Error::ConnectionClosed);

        match rx.try_recv().unwrap() {
            PublisherEvent::Diff(received) => assert_eq!(received, event),
            other => panic!("Expected diff, got {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            PublisherEvent::Error(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (publisher, rx) = ChannelPublisher::new();
        drop(rx);

        publisher.publish_error(Error::Timeout);
    }
}
