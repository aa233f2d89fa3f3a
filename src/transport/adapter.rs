//! Per-exchange decoding seam.
//!
//! An [`ExchangeAdapter`] turns one exchange's wire format into normalized
//! [`WireMessage`]s and names the endpoints the push feed and poller talk to.
//! Everything after decoding is shared, so adding an exchange means writing
//! an adapter and nothing else.
//!
//! [`NormalizedJsonAdapter`] accepts the crate's own camelCase JSON contract
//! and serves as the reference implementation.

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::types::{LevelUpdate, SequenceId, Symbol, Trade, WireMessage};
use crate::Result;

/// Decoder and endpoint catalogue for one exchange
pub trait ExchangeAdapter: Send + Sync {
    /// Exchange name stamped on every message
    fn exchange(&self) -> &str;

    /// Decode a REST order book snapshot response
    fn decode_snapshot(&self, symbol: &Symbol, body: &str) -> Result<WireMessage>;

    /// Decode an incremental order book update
    fn decode_diff(&self, symbol: &Symbol, body: &str) -> Result<WireMessage>;

    /// Decode a REST recent-trades response
    fn decode_trades(&self, symbol: &Symbol, body: &str) -> Result<WireMessage>;

    /// Decode one WebSocket text frame. Control frames (acks, heartbeats)
    /// decode to an empty list.
    fn decode_frame(&self, frame: &str) -> Result<Vec<WireMessage>>;

    /// WebSocket endpoint, if the exchange pushes
    fn websocket_url(&self) -> Option<&str>;

    /// Frames to send after connecting (and again after every reconnect)
    fn subscribe_frames(&self, symbols: &[Symbol]) -> Vec<String>;

    /// REST endpoint for a full snapshot of `symbol`
    fn snapshot_url(&self, symbol: &Symbol) -> Option<String>;

    /// REST endpoint for recent trades of `symbol`
    fn trades_url(&self, symbol: &Symbol) -> Option<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookBody {
    #[serde(default)]
    sequence_id: SequenceId,
    #[serde(default)]
    asks: Vec<LevelUpdate>,
    #[serde(default)]
    bids: Vec<LevelUpdate>,
}

/// Adapter for sources that already speak the normalized JSON contract.
///
/// - snapshot and diff bodies: `{"sequenceId": 1, "asks": [...], "bids": [...]}`
/// - trade bodies: `[{"price", "quantity", "side", "sequenceId", "timestampMs"}]`
/// - frames: one [`WireMessage`] or an array of them
///
/// # Example
///
/// ```rust
/// use book_sync::transport::{ExchangeAdapter, NormalizedJsonAdapter};
///
/// let adapter = NormalizedJsonAdapter::new("mock")
///     .with_rest_url("http://127.0.0.1:8080/api")
///     .unwrap();
/// let symbol = "BTC/USDT".parse().unwrap();
///
/// let msg = adapter
///     .decode_snapshot(&symbol, r#"{"sequenceId": 3, "asks": [{"price": "100", "quantity": "5"}]}"#)
///     .unwrap();
/// assert_eq!(msg.sequence_id, 3);
/// assert!(adapter.snapshot_url(&symbol).unwrap().contains("orderbook"));
/// ```
#[derive(Debug, Clone)]
pub struct NormalizedJsonAdapter {
    exchange: String,
    websocket_url: Option<String>,
    rest_url: Option<Url>,
}

impl NormalizedJsonAdapter {
    /// Create an adapter with no endpoints configured
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            websocket_url: None,
            rest_url: None,
        }
    }

    /// Set the WebSocket endpoint (`ws://` or `wss://`)
    pub fn with_websocket_url(mut self, url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!("not a WebSocket URL: {}", url)));
        }
        self.websocket_url = Some(parsed.to_string());
        Ok(self)
    }

    /// Set the REST base URL; `orderbook` and `trades` are resolved beneath it
    pub fn with_rest_url(mut self, url: &str) -> Result<Self> {
        let mut parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!("not an HTTP URL: {}", url)));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        self.rest_url = Some(parsed);
        Ok(self)
    }

    fn endpoint(&self, path: &str, symbol: &Symbol) -> Option<String> {
        let mut url = self.rest_url.as_ref()?.join(path).ok()?;
        url.query_pairs_mut().append_pair("symbol", symbol.as_str());
        Some(url.to_string())
    }

    fn decode_book(&self, body: &str) -> Result<BookBody> {
        Ok(serde_json::from_str(body)?)
    }
}

impl ExchangeAdapter for NormalizedJsonAdapter {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    fn decode_snapshot(&self, symbol: &Symbol, body: &str) -> Result<WireMessage> {
        let book = self.decode_book(body)?;
        Ok(WireMessage::snapshot(
            self.exchange.clone(),
            symbol.clone(),
            book.sequence_id,
            book.asks,
            book.bids,
        ))
    }

    fn decode_diff(&self, symbol: &Symbol, body: &str) -> Result<WireMessage> {
        let book = self.decode_book(body)?;
        Ok(WireMessage::diff(
            self.exchange.clone(),
            symbol.clone(),
            book.sequence_id,
            book.asks,
            book.bids,
        ))
    }

    fn decode_trades(&self, symbol: &Symbol, body: &str) -> Result<WireMessage> {
        let trades: Vec<Trade> = serde_json::from_str(body)?;
        Ok(WireMessage::trades(self.exchange.clone(), symbol.clone(), trades))
    }

    fn decode_frame(&self, frame: &str) -> Result<Vec<WireMessage>> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        if value.is_array() {
            return Ok(serde_json::from_value(value)?);
        }
        if value.get("channel").is_some() {
            return Ok(vec![serde_json::from_value(value)?]);
        }
        Ok(Vec::new())
    }

    fn websocket_url(&self) -> Option<&str> {
        self.websocket_url.as_deref()
    }

    fn subscribe_frames(&self, symbols: &[Symbol]) -> Vec<String> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let frame = serde_json::json!({
            "op": "subscribe",
            "channels": ["orderbook", "trade"],
            "symbols": symbols,
        });
        vec![frame.to_string()]
    }

    fn snapshot_url(&self, symbol: &Symbol) -> Option<String> {
        self.endpoint("orderbook", symbol)
    }

    fn trades_url(&self, symbol: &Symbol) -> Option<String> {
        self.endpoint("trades", symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageAction, Price, Quantity};

    fn btc() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    fn adapter() -> NormalizedJsonAdapter {
        NormalizedJsonAdapter::new("mock")
            .with_websocket_url("wss://stream.example.com/ws")
            .unwrap()
            .with_rest_url("https://api.example.com/v1")
            .unwrap()
    }

    #[test]
    fn test_decode_diff() {
        let msg = adapter()
            .decode_diff(&btc(), r#"{"sequenceId": 9, "bids": [{"price": 99.5, "quantity": "0"}]}"#)
            .unwrap();

        assert_eq!(msg.action, MessageAction::Diff);
        assert_eq!(msg.exchange, "mock");
        assert_eq!(msg.sequence_id, 9);
        assert!(msg.resolve().is_ok());
    }

    #[test]
    fn test_decode_trades() {
        let msg = adapter()
            .decode_trades(
                &btc(),
                r#"[{"price": "100", "quantity": "2", "side": "sell", "sequenceId": 4}]"#,
            )
            .unwrap();

        assert_eq!(msg.sequence_id, 4);
        assert_eq!(msg.action, MessageAction::Trade);
    }

    #[test]
    fn test_decode_frame_variants() {
        let adapter = adapter();
        let one = r#"{"exchange":"mock","symbol":"BTC/USDT","channel":"orderbook","action":"diff",
                      "sequenceId":2,"payload":{"asks":[{"price":"100","quantity":"1"}]}}"#;

        assert_eq!(adapter.decode_frame(one).unwrap().len(), 1);
        assert_eq!(adapter.decode_frame(&format!("[{},{}]", one, one)).unwrap().len(), 2);
        assert!(adapter.decode_frame(r#"{"event":"subscribed"}"#).unwrap().is_empty());
        assert!(adapter.decode_frame("not json").is_err());
    }

    #[test]
    fn test_decode_frame_levels() {
        let frame = r#"{"exchange":"mock","symbol":"ETH/USD","channel":"orderbook","action":"snapshot",
                        "payload":{"asks":[{"price":"2000.5","quantity":"1.25"}],"bids":[]}}"#;
        let msgs = adapter().decode_frame(frame).unwrap();

        match msgs[0].resolve().unwrap() {
            crate::types::Resolved::Snapshot(book) => {
                assert_eq!(book.asks[0].price, "2000.5".parse::<Price>().unwrap());
                assert_eq!(book.asks[0].quantity, "1.25".parse::<Quantity>().unwrap());
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoints() {
        let adapter = adapter();
        assert_eq!(
            adapter.snapshot_url(&btc()).unwrap(),
            "https://api.example.com/v1/orderbook?symbol=BTC%2FUSDT"
        );
        assert_eq!(
            adapter.trades_url(&btc()).unwrap(),
            "https://api.example.com/v1/trades?symbol=BTC%2FUSDT"
        );
        assert_eq!(adapter.websocket_url(), Some("wss://stream.example.com/ws"));
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        assert!(NormalizedJsonAdapter::new("x").with_websocket_url("https://x.com").is_err());
        assert!(NormalizedJsonAdapter::new("x").with_rest_url("wss://x.com").is_err());
        assert!(NormalizedJsonAdapter::new("x").with_rest_url("not a url").is_err());
    }

    #[test]
    fn test_subscribe_frames() {
        let frames = adapter().subscribe_frames(&[btc()]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("BTC/USDT"));
        assert!(adapter().subscribe_frames(&[]).is_empty());
    }
}
