//! The single consumer loop.
//!
//! [`Processor::run`] is the only code path that mutates the
//! [`BookStore`](crate::orderbook::BookStore) of an instance, which is what
//! makes per-symbol ordering hold without a reordering buffer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{IngestionQueue, Publisher};
use crate::engine::{ApplyOutcome, MergeEngine};
use crate::error::Error;
use crate::types::WireMessage;

/// Messages applied between cooperative yields
const YIELD_EVERY: u64 = 128;

/// Pops messages, applies them and publishes the results.
pub struct Processor {
    queue: Arc<IngestionQueue>,
    engine: MergeEngine,
    publisher: Arc<dyn Publisher>,
    idle_backoff: Duration,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("queue_len", &self.queue.len())
            .field("engine", &self.engine)
            .field("idle_backoff", &self.idle_backoff)
            .finish()
    }
}

impl Processor {
    /// Create a processor
    pub fn new(
        queue: Arc<IngestionQueue>,
        engine: MergeEngine,
        publisher: Arc<dyn Publisher>,
        idle_backoff: Duration,
    ) -> Self {
        Self {
            queue,
            engine,
            publisher,
            idle_backoff,
        }
    }

    /// Apply one message and publish its event.
    ///
    /// Returns `None` when the message was dropped: malformed payloads and
    /// panics are logged and surfaced to the publisher instead. A panic in
    /// [`Publisher::publish`] is caught the same way as one in the engine.
    pub fn process(&self, msg: &WireMessage) -> Option<ApplyOutcome> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let merged = self.engine.apply(msg)?;
            if let Some(event) = merged.event {
                self.publisher.publish(event);
            }
            Ok::<_, Error>(merged.outcome)
        }));

        match result {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                error!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    sequence_id = msg.sequence_id,
                    error = %e,
                    "Dropping message"
                );
                self.publisher.publish_error(e);
                None
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(
                    exchange = %msg.exchange,
                    symbol = %msg.symbol,
                    sequence_id = msg.sequence_id,
                    panic = %reason,
                    "Message processing panicked"
                );
                self.publisher.publish_error(Error::Panicked(reason));
                None
            }
        }
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The signal is checked between messages, so an in-flight message is
    /// always completed. Messages still queued at shutdown stay in the queue.
    /// Returns the number of messages processed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            resync_threshold = self.engine.resync_threshold(),
            idle_backoff_ms = self.idle_backoff.as_millis() as u64,
            "Processor started"
        );

        let mut processed = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.pop() {
                Some(msg) => {
                    self.process(&msg);
                    processed += 1;
                    if processed % YIELD_EVERY == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.queue.wait(self.idle_backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                debug!("Shutdown sender dropped");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(processed, pending = self.queue.len(), "Processor stopped");
        processed
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
