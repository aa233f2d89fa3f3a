//! REST polling fallback.
//!
//! [`Poller`] fetches full snapshots (and optionally recent trades) through
//! an adapter's REST endpoints on a timer and pushes them into the same
//! ingestion queue as the push feed, tagged `polling`. The engine treats them
//! like any other message.
//!
//! Exchanges signal rate limits with 429, 403 or 418. The poller honours
//! `Retry-After` or a rate-limit reset header when present and otherwise
//! backs off exponentially; a successful poll resets the backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{BackoffPolicy, ExchangeAdapter};
use crate::config::Config;
use crate::error::{ApiError, Error};
use crate::orderbook::BookStore;
use crate::pipeline::{IngestionQueue, Publisher};
use crate::types::{now_ms, Symbol, TimestampMs};
use crate::Result;

/// HTTP statuses exchanges use to say "slow down"
pub const RATE_LIMIT_STATUSES: [u16; 3] = [429, 403, 418];

/// Headers carrying the epoch (or delta) at which the limit resets
const RESET_HEADERS: [&str; 3] = ["x-ratelimit-reset", "x-mbx-ratelimit-reset", "ratelimit-reset"];

/// Delay the exchange asked for, in milliseconds.
///
/// `Retry-After` is read as seconds. Reset headers are read as epoch
/// milliseconds, epoch seconds or a delta in seconds depending on magnitude.
pub fn retry_after_ms(headers: &HeaderMap, now: TimestampMs) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };

    if let Some(seconds) = header("retry-after") {
        return Some((seconds * 1000.0) as u64);
    }

    RESET_HEADERS.iter().find_map(|&name| header(name)).map(|reset| {
        if reset >= 1e12 {
            (reset as u64).saturating_sub(now)
        } else if reset >= 1e9 {
            ((reset * 1000.0) as u64).saturating_sub(now)
        } else {
            (reset * 1000.0) as u64
        }
    })
}

/// Consecutive rate-limit tracking for one poller
#[derive(Debug, Clone)]
pub struct PollBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl PollBackoff {
    /// Start with no failures recorded
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Consecutive rate-limited polls so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A poll went through
    pub fn on_success(&mut self) {
        self.attempt = 0;
    }

    /// A poll was rate limited; returns how long to wait.
    ///
    /// An exchange-provided delay wins but is still capped by the policy max.
    pub fn on_rate_limited(&mut self, retry_after_ms: Option<u64>) -> Duration {
        let delay = match retry_after_ms {
            Some(ms) => Duration::from_millis(ms).min(self.policy.max),
            None => self.policy.delay_for_attempt(self.attempt),
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

/// Which symbols a poll round covers
#[derive(Debug, Clone)]
enum Targets {
    /// Every configured symbol
    All,
    /// Configured symbols whose book is missing or older than `max_age`
    Stale {
        store: Arc<BookStore>,
        max_age: Duration,
    },
}

/// REST poller for one adapter
pub struct Poller {
    adapter: Arc<dyn ExchangeAdapter>,
    symbols: Vec<Symbol>,
    queue: Arc<IngestionQueue>,
    publisher: Arc<dyn Publisher>,
    client: Client,
    interval: Duration,
    backoff: BackoffPolicy,
    poll_trades: bool,
    targets: Targets,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("exchange", &self.adapter.exchange())
            .field("symbols", &self.symbols)
            .field("interval", &self.interval)
            .field("poll_trades", &self.poll_trades)
            .field("targets", &self.targets)
            .finish()
    }
}

impl Poller {
    /// Create a poller for `symbols`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        symbols: Vec<Symbol>,
        queue: Arc<IngestionQueue>,
        publisher: Arc<dyn Publisher>,
        config: &Config,
    ) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            adapter,
            symbols,
            queue,
            publisher,
            client,
            interval: config.polling_interval(),
            backoff: config.backoff().clone(),
            poll_trades: false,
            targets: Targets::All,
        })
    }

    /// Also fetch recent trades each round
    #[must_use]
    pub fn with_trades(mut self, poll_trades: bool) -> Self {
        self.poll_trades = poll_trades;
        self
    }

    /// Only poll symbols whose book in `store` is missing or older than `max_age`
    #[must_use]
    pub fn only_stale(mut self, store: Arc<BookStore>, max_age: Duration) -> Self {
        self.targets = Targets::Stale { store, max_age };
        self
    }

    fn targets(&self) -> Vec<Symbol> {
        match &self.targets {
            Targets::All => self.symbols.clone(),
            Targets::Stale { store, max_age } => {
                let stale = store.stale_symbols(*max_age, now_ms());
                self.symbols
                    .iter()
                    .filter(|s| !store.contains(s) || stale.contains(s))
                    .cloned()
                    .collect()
            }
        }
    }

    /// GET `url` and return the body of a successful response
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        handle_response(response).await
    }

    /// Poll every target symbol once. Returns the number of messages enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] as soon as any request is rate limited.
    /// Other per-symbol failures are surfaced to the publisher and skipped.
    pub async fn poll_once(&self) -> Result<usize> {
        let mut enqueued = 0;
        for symbol in self.targets() {
            let mut urls = Vec::with_capacity(2);
            if let Some(url) = self.adapter.snapshot_url(&symbol) {
                urls.push((url, false));
            }
            if self.poll_trades {
                if let Some(url) = self.adapter.trades_url(&symbol) {
                    urls.push((url, true));
                }
            }

            for (url, is_trades) in urls {
                let decoded = match self.fetch(&url).await {
                    Ok(body) if is_trades => self.adapter.decode_trades(&symbol, &body),
                    Ok(body) => self.adapter.decode_snapshot(&symbol, &body),
                    Err(e) if e.is_rate_limited() => return Err(e),
                    Err(e) => Err(e),
                };

                match decoded.and_then(|msg| self.queue.push(msg.into_polling())) {
                    Ok(()) => enqueued += 1,
                    Err(e) => {
                        warn!(
                            exchange = self.adapter.exchange(),
                            symbol = %symbol,
                            url = %url,
                            error = %e,
                            "Poll failed"
                        );
                        self.publisher.publish_error(e);
                    }
                }
            }
        }
        Ok(enqueued)
    }

    /// Poll on the configured interval until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let exchange = self.adapter.exchange();
        let mut backoff = PollBackoff::new(self.backoff.clone());
        info!(
            exchange,
            symbols = self.symbols.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.poll_once().await {
                Ok(enqueued) => {
                    backoff.on_success();
                    debug!(exchange, enqueued, "Poll round complete");
                    self.interval
                }
                Err(Error::RateLimited { status, retry_after_ms }) => {
                    let delay = backoff.on_rate_limited(retry_after_ms);
                    warn!(
                        exchange,
                        status,
                        delay_ms = delay.as_millis() as u64,
                        attempt = backoff.attempt(),
                        "Rate limited, backing off"
                    );
                    self.publisher.publish_error(Error::RateLimited { status, retry_after_ms });
                    delay
                }
                Err(e) => {
                    self.publisher.publish_error(e);
                    self.interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(exchange, "Poller stopped");
    }
}

/// Turn a response into its body, or the error it represents
async fn handle_response(response: reqwest::Response) -> Result<String> {
    let status = response.status();

    if RATE_LIMIT_STATUSES.contains(&status.as_u16()) {
        return Err(Error::RateLimited {
            status: status.as_u16(),
            retry_after_ms: retry_after_ms(response.headers(), now_ms()),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if let Ok(error_response) = serde_json::from_str::<serde_json::Value>(&body) {
            let message = error_response
                .get("message")
                .or_else(|| error_response.get("msg"))
                .or_else(|| error_response.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or(&body)
                .to_string();

            let code = error_response.get("code").map(|v| match v.as_str() {
                Some(s) => s.to_string(),
                None => v.to_string(),
            });

            return Err(Error::Api(ApiError {
                status: status.as_u16(),
                code,
                message,
            }));
        }

        return Err(Error::Api(ApiError::new(status.as_u16(), body)));
    }

    Ok(response.text().await?)
}
