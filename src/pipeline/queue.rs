//! Bounded ingestion queue.
//!
//! Every producer of one instance (push feeds, pollers, tests) pushes
//! [`WireMessage`]s here; a single consumer pops them in arrival order.
//! When the queue is full the configured [`OverflowPolicy`] decides what gets
//! shed. Shedding is counted and logged, never silent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::error::Error;
use crate::types::{LevelUpdate, Payload, WireMessage};

/// What to do with a push that finds the queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fold diffs into the newest pending diff for the same symbol, drop
    /// diffs superseded by an incoming snapshot, then fall back to dropping
    /// the oldest message.
    #[default]
    Coalesce,
    /// Drop the oldest pending message
    DropOldest,
    /// Refuse the incoming message with [`Error::QueueFull`]
    Reject,
}

/// Thread-safe bounded FIFO of pending messages.
///
/// # Example
///
/// ```rust
/// use book_sync::pipeline::{IngestionQueue, OverflowPolicy};
/// use book_sync::types::WireMessage;
///
/// let queue = IngestionQueue::new(2, OverflowPolicy::DropOldest);
/// let symbol = "BTC/USDT".parse().unwrap();
///
/// queue.push(WireMessage::snapshot("binance", symbol, 1, vec![], vec![])).unwrap();
/// assert_eq!(queue.len(), 1);
/// assert!(queue.pop().is_some());
/// ```
#[derive(Debug)]
pub struct IngestionQueue {
    /// Pending messages, oldest first
    buffer: Mutex<VecDeque<WireMessage>>,
    /// Wakes the consumer after a push
    notify: Notify,
    /// Maximum pending messages
    capacity: usize,
    /// Overflow handling
    policy: OverflowPolicy,
    /// Messages dropped or folded away because of overflow
    shed: AtomicU64,
}

impl IngestionQueue {
    /// Create a queue. A capacity of zero is raised to one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            capacity,
            policy,
            shed: AtomicU64::new(0),
        }
    }

    /// Enqueue a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] under [`OverflowPolicy::Reject`]. Under
    /// [`OverflowPolicy::Coalesce`] a malformed message that finds the queue
    /// full is shed with its [`Error::MalformedPayload`] instead of displacing
    /// valid data.
    pub fn push(&self, msg: WireMessage) -> Result<(), Error> {
        let exchange = msg.exchange.clone();
        let symbol = msg.symbol.clone();

        let shed = {
            let mut buffer = self.buffer.lock();
            if buffer.len() < self.capacity {
                buffer.push_back(msg);
                0
            } else {
                match self.policy {
                    OverflowPolicy::Reject => {
                        drop(buffer);
                        self.shed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            exchange = %exchange,
                            symbol = %symbol,
                            capacity = self.capacity,
                            "Ingestion queue full, message rejected"
                        );
                        return Err(Error::QueueFull {
                            capacity: self.capacity,
                        });
                    }
                    OverflowPolicy::DropOldest => {
                        buffer.pop_front();
                        buffer.push_back(msg);
                        1
                    }
                    OverflowPolicy::Coalesce => {
                        if let Some(e) = msg.resolve().err() {
                            drop(buffer);
                            self.shed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                exchange = %exchange,
                                symbol = %symbol,
                                error = %e,
                                "Ingestion queue full, malformed message shed"
                            );
                            return Err(e);
                        }
                        coalesce(&mut buffer, msg, self.capacity)
                    }
                }
            }
        };

        if shed > 0 {
            let total = self.shed.fetch_add(shed, Ordering::Relaxed) + shed;
            warn!(
                exchange = %exchange,
                symbol = %symbol,
                policy = ?self.policy,
                shed,
                total_shed = total,
                "Ingestion queue full, messages shed"
            );
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the oldest message
    pub fn pop(&self) -> Option<WireMessage> {
        self.buffer.lock().pop_front()
    }

    /// Wait until a push happens or `timeout` elapses, whichever is first.
    ///
    /// A push that happened while nobody was waiting completes the next wait
    /// immediately.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Remove and return every pending message
    pub fn drain(&self) -> Vec<WireMessage> {
        self.buffer.lock().drain(..).collect()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Maximum pending messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured overflow policy
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Messages shed since creation
    pub fn shed_count(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }
}

/// Make room for a valid `msg` in a full buffer. Returns how many messages were shed.
///
/// A diff folds into the newest pending diff from the same source unless it is
/// behind it, in which case the incoming diff is dropped. A sequenced snapshot
/// drops pending diffs it covers.
fn coalesce(buffer: &mut VecDeque<WireMessage>, msg: WireMessage, capacity: usize) -> u64 {
    let same_source = |m: &WireMessage| m.exchange == msg.exchange && m.symbol == msg.symbol;

    if msg.is_diff() {
        if let Some(pending) = buffer.iter_mut().rev().find(|m| same_source(&**m)) {
            if pending.is_diff() && pending.resolve().is_ok() {
                if msg.sequence_id != 0 && msg.sequence_id <= pending.sequence_id {
                    return 1;
                }
                fold_diff(pending, &msg);
                return 1;
            }
        }
    }

    let mut shed = 0;
    if msg.is_snapshot() && msg.sequence_id != 0 {
        let covered = |m: &WireMessage| {
            same_source(m) && m.is_diff() && m.sequence_id != 0 && m.sequence_id <= msg.sequence_id
        };
        let before = buffer.len();
        buffer.retain(|m| !covered(m));
        shed = (before - buffer.len()) as u64;
    }

    while buffer.len() >= capacity {
        buffer.pop_front();
        shed += 1;
    }
    buffer.push_back(msg);
    shed
}

/// Merge the levels of `newer` into `pending`; per price, `newer` wins.
fn fold_diff(pending: &mut WireMessage, newer: &WireMessage) {
    let (Payload::Orderbook(into), Payload::Orderbook(from)) = (&mut pending.payload, &newer.payload) else {
        return;
    };
    fold_levels(&mut into.asks, &from.asks);
    fold_levels(&mut into.bids, &from.bids);
    pending.sequence_id = pending.sequence_id.max(newer.sequence_id);
}

fn fold_levels(into: &mut Vec<LevelUpdate>, from: &[LevelUpdate]) {
    for level in from {
        match into.iter_mut().find(|l| l.price == level.price) {
            Some(existing) => existing.quantity = level.quantity,
            None => into.push(*level),
        }
    }
}
