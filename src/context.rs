//! Per-exchange-instance owner of queue, store, publisher and shutdown signal.
//!
//! Nothing in this crate is global: two [`SyncContext`]s never share state,
//! so several exchanges (or several test cases) can run in one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::engine::MergeEngine;
use crate::error::Error;
use crate::orderbook::BookStore;
use crate::pipeline::{ChannelPublisher, IngestionQueue, Processor, Publisher, PublisherEvent};
use crate::transport::{ExchangeAdapter, Poller, PushFeed};
use crate::types::Symbol;
use crate::Result;

/// Wires one instance together and owns its tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use book_sync::{Config, SyncContext};
/// use book_sync::transport::NormalizedJsonAdapter;
///
/// # async fn example() -> book_sync::Result<()> {
/// let (ctx, mut events) = SyncContext::with_channel(Config::new())?;
/// let adapter = NormalizedJsonAdapter::new("mock").with_websocket_url("wss://example.com/ws")?;
///
/// ctx.start(Arc::new(adapter), vec!["BTC/USDT".parse()?])?;
///
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
///
/// ctx.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncContext {
    config: Config,
    queue: Arc<IngestionQueue>,
    store: Arc<BookStore>,
    publisher: Arc<dyn Publisher>,
    shutdown_tx: watch::Sender<bool>,
    processor_started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("queue_len", &self.queue.len())
            .field("symbols", &self.store.len())
            .field("processor_started", &self.processor_started.load(Ordering::Relaxed))
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}

impl SyncContext {
    /// Create a context publishing to `publisher`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` doesn't validate.
    pub fn new(config: Config, publisher: Arc<dyn Publisher>) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            queue: Arc::new(IngestionQueue::new(config.queue_capacity(), config.overflow_policy())),
            store: Arc::new(BookStore::new()),
            publisher,
            shutdown_tx,
            processor_started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Create a context with a [`ChannelPublisher`], returning its receiver
    pub fn with_channel(config: Config) -> Result<(Self, mpsc::UnboundedReceiver<PublisherEvent>)> {
        let (publisher, rx) = ChannelPublisher::new();
        Ok((Self::new(config, Arc::new(publisher))?, rx))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the ingestion queue. Any task may push into it.
    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    /// Get the symbol store. Reads return copies.
    pub fn store(&self) -> &Arc<BookStore> {
        &self.store
    }

    /// Get the publisher
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Build an engine over this context's store
    pub fn engine(&self) -> MergeEngine {
        MergeEngine::new(self.store.clone(), self.config.resync_threshold())
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Spawn the consumer loop.
    ///
    /// A context has exactly one consumer, so this succeeds once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the processor was already spawned.
    pub fn spawn_processor(&self) -> Result<()> {
        if self.processor_started.swap(true, Ordering::AcqRel) {
            return Err(Error::Config("processor already running".to_string()));
        }

        let processor = Processor::new(
            self.queue.clone(),
            self.engine(),
            self.publisher.clone(),
            self.config.idle_backoff(),
        );
        let shutdown = self.shutdown_tx.subscribe();

        self.track(tokio::spawn(async move {
            processor.run(shutdown).await;
        }));
        Ok(())
    }

    /// Spawn a push feed for `symbols`
    pub fn spawn_feed(&self, adapter: Arc<dyn ExchangeAdapter>, symbols: Vec<Symbol>) {
        let feed = PushFeed::new(adapter, symbols, self.queue.clone(), self.publisher.clone(), &self.config);
        let publisher = self.publisher.clone();
        let shutdown = self.shutdown_tx.subscribe();

        self.track(tokio::spawn(async move {
            if let Err(e) = feed.run(shutdown).await {
                error!(error = %e, "Push feed terminated");
                publisher.publish_error(e);
            }
        }));
    }

    /// Spawn a REST poller for `symbols`.
    ///
    /// With `stale_only`, each round covers only symbols whose book is missing
    /// or older than the configured `stale_after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn spawn_poller(
        &self,
        adapter: Arc<dyn ExchangeAdapter>,
        symbols: Vec<Symbol>,
        stale_only: bool,
    ) -> Result<()> {
        let mut poller = Poller::new(adapter, symbols, self.queue.clone(), self.publisher.clone(), &self.config)?;
        if stale_only {
            poller = poller.only_stale(self.store.clone(), self.config.stale_after());
        }
        let shutdown = self.shutdown_tx.subscribe();

        self.track(tokio::spawn(async move {
            poller.run(shutdown).await;
        }));
        Ok(())
    }

    /// Spawn the consumer loop plus whatever the configured mode calls for.
    ///
    /// In hybrid mode the poller only re-anchors stale symbols.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called a second time, or an error if
    /// the HTTP client cannot be initialized.
    pub fn start(&self, adapter: Arc<dyn ExchangeAdapter>, symbols: Vec<Symbol>) -> Result<()> {
        let mode = self.config.mode();
        info!(exchange = adapter.exchange(), symbols = symbols.len(), ?mode, "Starting sync");

        self.spawn_processor()?;
        if mode.uses_push() {
            self.spawn_feed(adapter.clone(), symbols.clone());
        }
        if mode.uses_poll() {
            self.spawn_poller(adapter, symbols, mode.uses_push())?;
        }
        Ok(())
    }

    /// Signal shutdown and wait for every spawned task to finish.
    ///
    /// In-flight messages complete; anything still queued stays in
    /// [`queue`](Self::queue).
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Task failed during shutdown");
            }
        }

        info!(tasks = count, pending = self.queue.len(), "Sync context shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::FeedMode;
    use crate::transport::NormalizedJsonAdapter;
    use crate::types::{LevelUpdate, Stream, WireMessage};

    #[test]
    fn test_rejects_invalid_config() {
        let result = SyncContext::with_channel(Config::new().with_queue_capacity(0));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let (a, _rx_a) = SyncContext::with_channel(Config::new()).unwrap();
        let (b, _rx_b) = SyncContext::with_channel(Config::new()).unwrap();

        let msg = WireMessage::snapshot("test", "BTC/USDT".parse().unwrap(), 1, vec![], vec![]);
        a.engine().apply(&msg).unwrap();

        assert_eq!(a.store().len(), 1);
        assert!(b.store().is_empty());
    }

    #[tokio::test]
    async fn test_processor_lifecycle() {
        let (ctx, mut rx) = SyncContext::with_channel(Config::new()).unwrap();
        ctx.spawn_processor().unwrap();

        ctx.queue()
            .push(WireMessage::snapshot(
                "test",
                "BTC/USDT".parse().unwrap(),
                1,
                vec![LevelUpdate::new(100.into(), 1.into())],
                vec![],
            ))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, PublisherEvent::Diff(ref e) if e.stream == Stream::Snapshot));

        tokio::time::timeout(Duration::from_secs(5), ctx.shutdown()).await.unwrap();
        assert!(ctx.is_shutting_down());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (ctx, _rx) = SyncContext::with_channel(Config::new().with_mode(FeedMode::Poll)).unwrap();
        let adapter = Arc::new(NormalizedJsonAdapter::new("mock"));

        ctx.start(adapter.clone(), vec![]).unwrap();
        let tasks = ctx.tasks.lock().len();

        assert!(matches!(ctx.start(adapter, vec![]), Err(Error::Config(_))));
        assert!(matches!(ctx.spawn_processor(), Err(Error::Config(_))));
        assert_eq!(ctx.tasks.lock().len(), tasks);

        tokio::time::timeout(Duration::from_secs(5), ctx.shutdown()).await.unwrap();
    }
}
