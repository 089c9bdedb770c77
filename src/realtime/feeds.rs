/// Stream-specific consumers built on `RealtimeChannel`
///
/// Portfolio, market and signals keep the latest payload. Prices fold each
/// update into a map keyed by symbol.
use super::channel::RealtimeChannel;
use super::envelope::Envelope;
use crate::errors::ClientError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Portfolio,
    Market,
    Signals,
    Prices(Vec<String>),
}

impl StreamKind {
    /// Path (and query) below the WebSocket base address
    pub fn path(&self) -> String {
        match self {
            StreamKind::Portfolio => "/ws/portfolio".to_string(),
            StreamKind::Market => "/ws/market".to_string(),
            StreamKind::Signals => "/ws/signals".to_string(),
            StreamKind::Prices(symbols) => format!("/ws/prices?symbols={}", symbols.join(",")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Portfolio => "portfolio",
            StreamKind::Market => "market",
            StreamKind::Signals => "signals",
            StreamKind::Prices(_) => "prices",
        }
    }

    /// Parse a stream name as given on the command line
    pub fn from_name(name: &str, symbols: Vec<String>) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "portfolio" => Some(StreamKind::Portfolio),
            "market" => Some(StreamKind::Market),
            "signals" => Some(StreamKind::Signals),
            "prices" => Some(StreamKind::Prices(symbols)),
            _ => None,
        }
    }
}

/// Latest payload of a single-value stream
pub struct ValueFeed {
    channel: RealtimeChannel,
    latest: Arc<watch::Sender<Option<Value>>>,
}

impl ValueFeed {
    pub(crate) fn new(channel: RealtimeChannel, latest: Arc<watch::Sender<Option<Value>>>) -> Self {
        Self { channel, latest }
    }

    /// Fold used by the channel's message handler
    pub(crate) fn fold(latest: &watch::Sender<Option<Value>>, envelope: &Envelope) {
        if envelope.data.is_null() {
            return;
        }
        latest.send_replace(Some(envelope.data.clone()));
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.channel.connect().await
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
        self.latest.send_replace(None);
    }

    pub fn latest(&self) -> Option<Value> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Value>> {
        self.latest.subscribe()
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

pub type PriceMap = HashMap<String, Value>;

/// Symbol-keyed prices merged from every update
pub struct PriceFeed {
    channel: RealtimeChannel,
    prices: Arc<watch::Sender<PriceMap>>,
}

impl PriceFeed {
    pub(crate) fn new(channel: RealtimeChannel, prices: Arc<watch::Sender<PriceMap>>) -> Self {
        Self { channel, prices }
    }

    /// Accepts `{"symbol": "BTC", ...}`, `{"BTC": {...}, "ETH": {...}}` or
    /// a list of symbol records. Only symbols in `wanted` are kept; with an
    /// empty `wanted` only records that name their own symbol are.
    pub(crate) fn fold(
        prices: &watch::Sender<PriceMap>,
        wanted: &HashSet<String>,
        envelope: &Envelope,
    ) {
        let updates: Vec<(String, Value)> = price_updates(&envelope.data, wanted.is_empty())
            .into_iter()
            .filter(|(symbol, _)| wanted.is_empty() || wanted.contains(symbol))
            .collect();
        if updates.is_empty() {
            return;
        }
        prices.send_modify(|map| {
            for (symbol, value) in updates {
                map.insert(symbol, value);
            }
        });
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.channel.connect().await
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
        self.prices.send_replace(PriceMap::new());
    }

    pub fn price(&self, symbol: &str) -> Option<Value> {
        self.prices.borrow().get(&symbol.to_uppercase()).cloned()
    }

    pub fn prices(&self) -> PriceMap {
        self.prices.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PriceMap> {
        self.prices.subscribe()
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

fn symbol_of(record: &Value) -> Option<String> {
    record
        .get("symbol")
        .and_then(Value::as_str)
        .map(str::to_uppercase)
}

fn price_updates(data: &Value, tagged_only: bool) -> Vec<(String, Value)> {
    match data {
        Value::Object(fields) => match symbol_of(data) {
            Some(symbol) => vec![(symbol, data.clone())],
            None if tagged_only => Vec::new(),
            None => fields
                .iter()
                .map(|(symbol, value)| (symbol.to_uppercase(), value.clone()))
                .collect(),
        },
        Value::Array(records) => records
            .iter()
            .filter_map(|record| symbol_of(record).map(|symbol| (symbol, record.clone())))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(data: Value) -> Envelope {
        Envelope {
            kind: "price_update".to_string(),
            data,
            timestamp: None,
        }
    }

    #[test]
    fn test_stream_paths() {
        assert_eq!(StreamKind::Portfolio.path(), "/ws/portfolio");
        assert_eq!(StreamKind::Signals.path(), "/ws/signals");
        assert_eq!(
            StreamKind::Prices(vec!["BTC".to_string(), "ETH".to_string()]).path(),
            "/ws/prices?symbols=BTC,ETH"
        );
        assert_eq!(
            StreamKind::from_name("Market", Vec::new()),
            Some(StreamKind::Market)
        );
        assert_eq!(StreamKind::from_name("orders", Vec::new()), None);
    }

    fn wanted(symbols: &[&str]) -> HashSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_price_fold_shapes() {
        let (tx, _) = watch::channel(PriceMap::new());
        let wanted = wanted(&["BTC", "ETH", "SOL"]);

        PriceFeed::fold(&tx, &wanted, &envelope(json!({"symbol": "btc", "price": 64000.5})));
        PriceFeed::fold(
            &tx,
            &wanted,
            &envelope(json!({"ETH": {"price": 3100.0}, "SOL": {"price": 150.0}})),
        );
        PriceFeed::fold(
            &tx,
            &wanted,
            &envelope(json!([{"symbol": "ETH", "price": 3105.0}, {"price": 1.0}])),
        );
        PriceFeed::fold(&tx, &wanted, &envelope(Value::Null));

        let map = tx.borrow();
        assert_eq!(map.len(), 3);
        assert_eq!(map["BTC"]["price"], json!(64000.5));
        assert_eq!(map["ETH"]["price"], json!(3105.0));
        assert_eq!(map["SOL"]["price"], json!(150.0));
    }

    #[test]
    fn test_price_fold_skips_acks_and_unrequested_symbols() {
        let (tx, _) = watch::channel(PriceMap::new());

        let subscribed = wanted(&["BTC"]);
        PriceFeed::fold(&tx, &subscribed, &envelope(json!({"status": "ok"})));
        PriceFeed::fold(&tx, &subscribed, &envelope(json!({"symbol": "DOGE", "price": 0.1})));
        PriceFeed::fold(&tx, &subscribed, &envelope(json!({"BTC": {"price": 64000}})));
        assert_eq!(tx.borrow().keys().collect::<Vec<_>>(), vec!["BTC"]);

        // Without a symbol list only self-describing records count
        let any = HashSet::new();
        PriceFeed::fold(&tx, &any, &envelope(json!({"status": "ok", "subscribed": 2})));
        PriceFeed::fold(&tx, &any, &envelope(json!({"symbol": "ETH", "price": 3100})));
        let map = tx.borrow();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("ETH"));
        assert!(!map.contains_key("STATUS"));
    }

    #[test]
    fn test_value_fold_ignores_empty_payloads() {
        let (tx, _) = watch::channel(None);
        ValueFeed::fold(&tx, &envelope(json!({"total_value": 10})));
        ValueFeed::fold(&tx, &envelope(Value::Null));
        assert_eq!(*tx.borrow(), Some(json!({"total_value": 10})));
    }
}
