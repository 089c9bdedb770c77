/// Realtime Channel Manager
///
/// - `envelope`: the `{type, data, timestamp}` frame
/// - `transport`: WebSocket capability and the tokio-tungstenite connector
/// - `handlers`: lifecycle callbacks
/// - `channel`: one stream, bounded reconnect
/// - `feeds`: portfolio / market / signals / prices consumers
mod channel;
mod envelope;
mod feeds;
mod handlers;
mod transport;

pub use channel::{ChannelState, ChannelStatus, RealtimeChannel};
pub use envelope::Envelope;
pub use feeds::{PriceFeed, PriceMap, StreamKind, ValueFeed};
pub use handlers::{ChannelHandlers, DisconnectReason, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
pub use transport::{redact_url, Connection, TransportEvent, TungsteniteConnector, WsConnector};

use crate::config::{ApiConfig, RealtimeConfig};
use crate::storage::TokenSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Builds channels that share a token source, connector and policy
#[derive(Clone)]
pub struct RealtimeManager {
    ws_base_url: String,
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn WsConnector>,
    config: RealtimeConfig,
}

impl RealtimeManager {
    pub fn new(
        api: &ApiConfig,
        config: RealtimeConfig,
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn WsConnector>,
    ) -> Self {
        Self {
            ws_base_url: api.ws_base_url.clone(),
            tokens,
            connector,
            config,
        }
    }

    /// Production wiring with the tokio-tungstenite connector
    pub fn with_tungstenite(api: &ApiConfig, config: RealtimeConfig, tokens: Arc<dyn TokenSource>) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.outbound_buffer));
        Self::new(api, config, tokens, connector)
    }

    pub fn has_token(&self) -> bool {
        self.tokens.access_token().is_some()
    }

    pub fn channel(&self, stream: &StreamKind, handlers: ChannelHandlers) -> RealtimeChannel {
        RealtimeChannel::new(
            self.ws_base_url.clone(),
            stream.path(),
            Arc::clone(&self.tokens),
            Arc::clone(&self.connector),
            &self.config,
            handlers,
        )
    }

    fn value_feed(&self, stream: StreamKind, handlers: ChannelHandlers) -> ValueFeed {
        let (tx, _) = watch::channel(None);
        let latest = Arc::new(tx);
        let sink = Arc::clone(&latest);
        let handlers = handlers.prepend_message(move |envelope| ValueFeed::fold(&sink, envelope));
        ValueFeed::new(self.channel(&stream, handlers), latest)
    }

    pub fn portfolio(&self, handlers: ChannelHandlers) -> ValueFeed {
        self.value_feed(StreamKind::Portfolio, handlers)
    }

    pub fn market(&self, handlers: ChannelHandlers) -> ValueFeed {
        self.value_feed(StreamKind::Market, handlers)
    }

    pub fn signals(&self, handlers: ChannelHandlers) -> ValueFeed {
        self.value_feed(StreamKind::Signals, handlers)
    }

    pub fn prices(&self, symbols: &[String], handlers: ChannelHandlers) -> PriceFeed {
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let wanted: HashSet<String> = symbols.iter().cloned().collect();
        let (tx, _) = watch::channel(HashMap::new());
        let prices = Arc::new(tx);
        let sink = Arc::clone(&prices);
        let handlers = handlers
            .prepend_message(move |envelope| PriceFeed::fold(&sink, &wanted, envelope));
        PriceFeed::new(self.channel(&StreamKind::Prices(symbols), handlers), prices)
    }
}

impl std::fmt::Debug for RealtimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeManager")
            .field("ws_base_url", &self.ws_base_url)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SessionStore};
    use crate::testing::MockConnector;
    use serde_json::json;

    fn manager(connector: Arc<MockConnector>, token: Option<&str>) -> RealtimeManager {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        if let Some(token) = token {
            store.set_token(token).unwrap();
        }
        RealtimeManager::new(
            &ApiConfig::default(),
            RealtimeConfig::default(),
            Arc::new(store),
            connector,
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_signals_feed_holds_latest_payload() {
        let (connector, mut sockets) = MockConnector::new();
        let rt = manager(connector, Some("tok"));
        let feed = rt.signals(ChannelHandlers::new());

        feed.connect().await.unwrap();
        let socket = sockets.recv().await.unwrap();
        assert_eq!(socket.url.path(), "/ws/signals");

        socket.message(r#"{"type":"signal","data":{"id":1,"symbol":"BTC"},"timestamp":"2026-10-19T10:00:00Z"}"#);
        settle().await;
        assert_eq!(feed.latest(), Some(json!({"id": 1, "symbol": "BTC"})));

        feed.disconnect();
        assert_eq!(feed.latest(), None);
        assert_eq!(socket.close_code(), Some(NORMAL_CLOSURE));
    }

    #[tokio::test]
    async fn test_price_feed_url_and_fold() {
        let (connector, mut sockets) = MockConnector::new();
        let rt = manager(connector, Some("tok"));
        let seen = Arc::new(parking_lot::Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let feed = rt.prices(
            &["btc".to_string(), "eth".to_string()],
            ChannelHandlers::new().on_message(move |_| *counter.lock() += 1),
        );

        feed.connect().await.unwrap();
        let socket = sockets.recv().await.unwrap();
        let query: HashMap<String, String> = socket.url.query_pairs().into_owned().collect();
        assert_eq!(query.get("symbols").map(String::as_str), Some("BTC,ETH"));
        assert_eq!(query.get("token").map(String::as_str), Some("tok"));

        socket.message(r#"{"type":"price_update","data":{"symbol":"BTC","price":64000}}"#);
        socket.message(r#"{"type":"price_update","data":{"symbol":"ETH","price":3100}}"#);
        socket.message(r#"{"type":"subscribed","data":{"status":"ok"}}"#);
        settle().await;

        assert_eq!(feed.price("btc"), Some(json!({"symbol": "BTC", "price": 64000})));
        assert_eq!(feed.prices().len(), 2);
        assert_eq!(*seen.lock(), 3);
    }

    #[tokio::test]
    async fn test_feed_without_token_never_connects() {
        let (connector, _sockets) = MockConnector::new();
        let rt = manager(connector.clone(), None);
        assert!(!rt.has_token());

        let feed = rt.portfolio(ChannelHandlers::new());
        assert!(feed.connect().await.is_err());
        assert_eq!(connector.connect_count(), 0);
    }
}
