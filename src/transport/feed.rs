//! WebSocket push feed.
//!
//! [`PushFeed`] owns one WebSocket connection for an adapter: it subscribes,
//! answers pings, decodes frames through the adapter and pushes the results
//! into the ingestion queue. Lost connections are re-established with
//! exponential backoff and subscriptions are replayed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{BackoffPolicy, ExchangeAdapter};
use crate::config::Config;
use crate::error::Error;
use crate::pipeline::{IngestionQueue, Publisher};
use crate::types::Symbol;
use crate::Result;

/// How a connected session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown was requested
    Shutdown,
    /// Server closed the connection
    Closed,
}

/// WebSocket feed with automatic reconnection.
///
/// The reader and writer halves live in the same task; nothing else touches
/// the socket.
pub struct PushFeed {
    adapter: Arc<dyn ExchangeAdapter>,
    symbols: Vec<Symbol>,
    queue: Arc<IngestionQueue>,
    publisher: Arc<dyn Publisher>,
    backoff: BackoffPolicy,
    connect_timeout: Duration,
}

impl std::fmt::Debug for PushFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushFeed")
            .field("exchange", &self.adapter.exchange())
            .field("url", &self.adapter.websocket_url())
            .field("symbols", &self.symbols)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl PushFeed {
    /// Create a feed for `symbols`
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        symbols: Vec<Symbol>,
        queue: Arc<IngestionQueue>,
        publisher: Arc<dyn Publisher>,
        config: &Config,
    ) -> Self {
        Self {
            adapter,
            symbols,
            queue,
            publisher,
            backoff: config.backoff().clone(),
            connect_timeout: config.request_timeout(),
        }
    }

    /// Run until shutdown or until the backoff policy gives up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the adapter has no WebSocket URL and
    /// [`Error::ConnectionClosed`] once `max_retries` consecutive attempts failed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let exchange = self.adapter.exchange();
        let url = self
            .adapter
            .websocket_url()
            .ok_or_else(|| Error::Config(format!("{} has no WebSocket endpoint", exchange)))?;

        let mut attempt = 0u32;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.session(url, &mut shutdown, &mut attempt).await {
                Ok(SessionEnd::Shutdown) => {
                    info!(exchange, "Push feed stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => {
                    info!(exchange, url, "Connection closed by server");
                }
                Err(e) => {
                    warn!(exchange, url, attempt, error = %e, "Push feed connection failed");
                    self.publisher.publish_error(e);
                }
            }

            if self.backoff.exhausted(attempt) {
                error!(exchange, url, attempt, "Giving up on push feed");
                return Err(Error::ConnectionClosed);
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            attempt += 1;
            debug!(exchange, delay_ms = delay.as_millis() as u64, attempt, "Reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One connection: connect, subscribe, read until it ends.
    async fn session(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> Result<SessionEnd> {
        let exchange = self.adapter.exchange();

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url)).await??;
        let (mut write, mut read) = ws_stream.split();

        let frames = self.adapter.subscribe_frames(&self.symbols);
        for frame in &frames {
            write.send(Message::Text(frame.clone())).await?;
        }
        info!(exchange, url, symbols = self.symbols.len(), frames = frames.len(), "Subscribed");
        *attempt = 0;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let messages = match self.adapter.decode_frame(text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(exchange = self.adapter.exchange(), error = %e, "Undecodable frame skipped");
                self.publisher.publish_error(e);
                return;
            }
        };

        for msg in messages {
            if let Err(e) = self.queue.push(msg) {
                self.publisher.publish_error(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ChannelPublisher, OverflowPolicy, PublisherEvent};
    use crate::transport::NormalizedJsonAdapter;

    fn feed(adapter: NormalizedJsonAdapter) -> (PushFeed, Arc<IngestionQueue>, tokio::sync::mpsc::UnboundedReceiver<PublisherEvent>) {
        let queue = Arc::new(IngestionQueue::new(16, OverflowPolicy::Reject));
        let (publisher, rx) = ChannelPublisher::new();
        let config = Config::new().with_backoff(
            BackoffPolicy::new()
                .base(Duration::from_millis(1))
                .max(Duration::from_millis(5))
                .max_retries(2),
        );
        let feed = PushFeed::new(
            Arc::new(adapter),
            vec!["BTC/USDT".parse().unwrap()],
            queue.clone(),
            Arc::new(publisher),
            &config,
        );
        (feed, queue, rx)
    }

    #[test]
    fn test_handle_frame_enqueues_and_surfaces_errors() {
        let (feed, queue, mut rx) = feed(NormalizedJsonAdapter::new("mock"));

        feed.handle_frame(
            r#"{"exchange":"mock","symbol":"BTC/USDT","channel":"orderbook","action":"snapshot","payload":{}}"#,
        );
        feed.handle_frame("garbage");

        assert_eq!(queue.len(), 1);
        assert!(matches!(rx.try_recv(), Ok(PublisherEvent::Error(Error::Json(_)))));
    }

    #[tokio::test]
    async fn test_missing_url_is_config_error() {
        let (feed, _, _rx) = feed(NormalizedJsonAdapter::new("mock"));
        let (_tx, shutdown) = watch::channel(false);

        assert!(matches!(feed.run(shutdown).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        // Nothing listens on port 9 locally
        let adapter = NormalizedJsonAdapter::new("mock")
            .with_websocket_url("ws://127.0.0.1:9/ws")
            .unwrap();
        let (feed, _, mut rx) = feed(adapter);
        let (_tx, shutdown) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(10), feed.run(shutdown))
            .await
            .unwrap();

        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(matches!(rx.try_recv(), Ok(PublisherEvent::Error(_))));
    }
}
