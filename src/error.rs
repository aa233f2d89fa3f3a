//! Error types for the book-sync crate.
//!
//! Transport errors (HTTP, WebSocket) belong to feeds and pollers and never
//! reach the merge engine. The engine itself only produces
//! [`Error::MalformedPayload`]; stale sequences and trade/book conflicts are
//! reported as [`ApplyOutcome`](crate::engine::ApplyOutcome)s, not errors.

/// The main error type for this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (bad values, unparsable URL)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exchange returned a non-success response that isn't a rate limit
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    /// Exchange is rate limiting us (HTTP 429, 403 or 418)
    #[error("Rate limited with status {status}{}", retry_hint(.retry_after_ms))]
    RateLimited {
        /// HTTP status that signalled the limit
        status: u16,
        /// Wait this long before retrying, when the exchange said so
        retry_after_ms: Option<u64>,
    },

    /// A message failed validation and was dropped
    #[error("Malformed payload from {exchange} for {symbol}: {reason}")]
    MalformedPayload {
        /// Source exchange
        exchange: String,
        /// Symbol as received
        symbol: String,
        /// What was wrong
        reason: String,
    },

    /// Symbol is not in `BASE/QUOTE` form
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Ingestion queue refused a message
    #[error("Ingestion queue full (capacity {capacity})")]
    QueueFull {
        /// Configured capacity
        capacity: usize,
    },

    /// WebSocket connection closed unexpectedly
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Applying a message panicked; the message was dropped
    #[error("Message processing panicked: {0}")]
    Panicked(String),
}

fn retry_hint(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(", retry after {}ms", ms),
        None => String::new(),
    }
}

/// Non-success response from an exchange REST endpoint
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Error code from the exchange (if provided)
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

impl From<tokio_tungstenite::tungstenite::http::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        Error::Config(format!("HTTP error building WebSocket request: {}", err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl Error {
    /// Whether a poller should back off before retrying
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Whether the error came from the network layer rather than the data
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::WebSocket(_) | Error::ConnectionClosed | Error::Timeout
        )
    }
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Error::Api(ApiError::new(400, "Bad request"));
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Bad request"));
    }

    #[test]
    fn test_rate_limited_display() {
        let err = Error::RateLimited {
            status: 429,
            retry_after_ms: Some(1000),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("1000"));
        assert!(err.is_rate_limited());

        let err = Error::RateLimited {
            status: 418,
            retry_after_ms: None,
        };
        assert!(!err.to_string().contains("retry after"));
    }

    #[test]
    fn test_malformed_payload_display() {
        let err = Error::MalformedPayload {
            exchange: "binance".to_string(),
            symbol: "BTC/USDT".to_string(),
            reason: "negative quantity".to_string(),
        };
        assert!(err.to_string().contains("binance"));
        assert!(err.to_string().contains("negative quantity"));
        assert!(!err.is_transport());
    }
}
