//! Configuration for a synchronization instance.
//!
//! This module provides the [`Config`] struct consumed by
//! [`SyncContext`](crate::SyncContext): resync cadence, queue bounds,
//! push/poll mode and backoff.

use std::time::Duration;

use crate::error::Error;
use crate::pipeline::OverflowPolicy;
use crate::transport::BackoffPolicy;

/// How an instance sources its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// WebSocket push only
    #[default]
    Push,
    /// REST polling only
    Poll,
    /// Push feed with a polling safety net
    Hybrid,
}

impl FeedMode {
    /// Whether a push feed should run
    pub fn uses_push(self) -> bool {
        matches!(self, FeedMode::Push | FeedMode::Hybrid)
    }

    /// Whether a poller should run
    pub fn uses_poll(self) -> bool {
        matches!(self, FeedMode::Poll | FeedMode::Hybrid)
    }
}

/// Configuration for one exchange instance
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use book_sync::config::{Config, FeedMode};
///
/// let config = Config::new()
///     .with_resync_threshold(10)
///     .with_mode(FeedMode::Hybrid)
///     .with_polling_interval(Duration::from_secs(2));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Published diffs per symbol before a full re-snapshot
    resync_threshold: u32,

    /// Maximum pending messages in the ingestion queue
    queue_capacity: usize,

    /// What to do when the queue is full
    overflow_policy: OverflowPolicy,

    /// How long the consumer waits on an empty queue before re-checking
    idle_backoff: Duration,

    /// Push, poll or both
    mode: FeedMode,

    /// Delay between REST polls
    polling_interval: Duration,

    /// HTTP request timeout
    request_timeout: Duration,

    /// Reconnect and rate-limit backoff
    backoff: BackoffPolicy,

    /// A book not updated for this long is considered stale
    stale_after: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resync_threshold: 2,
            queue_capacity: 100_000,
            overflow_policy: OverflowPolicy::default(),
            idle_backoff: Duration::from_millis(10),
            mode: FeedMode::default(),
            polling_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
            stale_after: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resync threshold. Values below 1 behave as 1.
    #[must_use]
    pub fn with_resync_threshold(mut self, threshold: u32) -> Self {
        self.resync_threshold = threshold;
        self
    }

    /// Set the ingestion queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the queue overflow policy
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the empty-queue backoff
    #[must_use]
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Set push/poll mode
    #[must_use]
    pub fn with_mode(mut self, mode: FeedMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the backoff policy
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the staleness horizon
    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Check for values the instance can't run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.polling_interval.is_zero() {
            return Err(Error::Config("polling_interval must be non-zero".to_string()));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff multiplier {} must be >= 1.0",
                self.backoff.multiplier
            )));
        }
        Ok(())
    }

    /// Get the effective resync threshold (never below 1)
    pub fn resync_threshold(&self) -> u32 {
        self.resync_threshold.max(1)
    }

    /// Get the queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the overflow policy
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Get the empty-queue backoff
    pub fn idle_backoff(&self) -> Duration {
        self.idle_backoff
    }

    /// Get the feed mode
    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// Get the polling interval
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Get the HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Get the backoff policy
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Get the staleness horizon
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}
