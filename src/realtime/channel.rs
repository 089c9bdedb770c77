/// One realtime stream over one WebSocket
///
/// State machine: `Idle -> Connecting -> Open -> Closed`. A close that is
/// not a normal closure schedules a fresh connection after a fixed delay,
/// up to `max_reconnect_attempts`; `disconnect` is the only way back to
/// `Idle`. Every connection gets a generation number and events from an
/// older generation are ignored.
use super::envelope::Envelope;
use super::handlers::{ChannelHandlers, DisconnectReason, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use super::transport::{redact_url, Connection, TransportEvent, WsConnector};
use crate::config::RealtimeConfig;
use crate::errors::ClientError;
use crate::logger::{self, LogTag};
use crate::storage::TokenSource;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Observable channel state
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    pub error: Option<String>,
    /// Retries used up; only `connect` or `disconnect` moves on from here
    pub exhausted: bool,
    pub last_message: Option<Envelope>,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Idle,
            attempts: 0,
            error: None,
            exhausted: false,
            last_message: None,
        }
    }
}

pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    ws_base_url: String,
    path: String,
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn WsConnector>,
    max_attempts: u32,
    reconnect_delay: Duration,
    handlers: ChannelHandlers,
    status: watch::Sender<ChannelStatus>,
    generation: AtomicU64,
    link: Mutex<Link>,
}

#[derive(Default)]
struct Link {
    connection: Option<Connection>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Link {
    /// Stop tasks and close the socket with `code`
    fn teardown(&mut self, code: u16) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
        if let Some(task) = self.reader.take() {
            task.abort();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close(code);
        }
    }
}

impl RealtimeChannel {
    pub fn new(
        ws_base_url: impl Into<String>,
        path: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn WsConnector>,
        config: &RealtimeConfig,
        handlers: ChannelHandlers,
    ) -> Self {
        let (status, _) = watch::channel(ChannelStatus::default());
        Self {
            inner: Arc::new(ChannelInner {
                ws_base_url: ws_base_url.into(),
                path: path.into(),
                tokens,
                connector,
                max_attempts: config.max_reconnect_attempts,
                reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
                handlers,
                status,
                generation: AtomicU64::new(0),
                link: Mutex::new(Link::default()),
            }),
        }
    }

    /// Open the stream, replacing any current connection
    ///
    /// Fails without touching the network when no token is available. A
    /// failed handshake is not an `Err`: it is surfaced through the status
    /// and `on_error`, and enters the retry path.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let url = match inner.target_url() {
            Ok(url) => url,
            Err(e) => {
                logger::warning(
                    LogTag::Realtime,
                    &format!("Not connecting {}: {}", inner.path, e),
                );
                let message = e.to_string();
                inner.status.send_modify(|s| s.error = Some(message));
                return Err(e);
            }
        };

        let generation = inner.bump_generation();
        inner.link.lock().teardown(NORMAL_CLOSURE);
        inner.status.send_modify(|s| {
            s.attempts = 0;
            s.exhausted = false;
        });

        Arc::clone(inner).establish(generation, url).await;
        Ok(())
    }

    /// Close with a normal closure, cancel any pending reconnect and forget
    /// the last message
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Serialize and send `message` if the channel is open
    ///
    /// Returns whether the frame was handed to the transport.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if self.state() != ChannelState::Open {
            logger::debug(
                LogTag::Realtime,
                &format!("Send on {} skipped, channel not open", self.inner.path),
            );
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                logger::warning(LogTag::Realtime, &format!("Unserializable message: {}", e));
                return false;
            }
        };

        match &self.inner.link.lock().connection {
            Some(connection) => connection.send(text),
            None => false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn status(&self) -> ChannelStatus {
        self.inner.status.borrow().clone()
    }

    pub fn last_message(&self) -> Option<Envelope> {
        self.inner.status.borrow().last_message.clone()
    }

    /// Status updates; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.status.subscribe()
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.inner.bump_generation();
        self.inner.link.lock().teardown(NORMAL_CLOSURE);
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("path", &self.inner.path)
            .field("state", &self.state())
            .finish()
    }
}

/// Sleep, then open a fresh connection unless the channel moved on
fn reconnect_after(weak: Weak<ChannelInner>, generation: u64, delay: Duration) -> BoxFuture<'static, ()> {
    async move {
        tokio::time::sleep(delay).await;
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        if inner.generation() != generation {
            return;
        }
        // This task is the pending reconnect; forget its handle
        inner.link.lock().reconnect = None;

        let url = match inner.target_url() {
            Ok(url) => url,
            Err(e) => {
                logger::warning(
                    LogTag::Realtime,
                    &format!("Reconnect of {} abandoned: {}", inner.path, e),
                );
                let message = e.to_string();
                inner.status.send_modify(|s| s.error = Some(message.clone()));
                inner.handlers.errored(&message);
                return;
            }
        };

        let next = inner.bump_generation();
        inner.establish(next, url).await;
    }
    .boxed()
}

async fn read_events(
    weak: Weak<ChannelInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        if inner.generation() != generation {
            logger::debug(LogTag::Realtime, "Ignoring event from a replaced connection");
            return;
        }

        match event {
            TransportEvent::Message(text) => inner.handle_message(&text),
            TransportEvent::Error(message) => inner.handle_error(&message),
            TransportEvent::Closed { code, reason } => {
                inner.handle_close(generation, code, reason);
                return;
            }
        }
    }

    // Transport went away without a close event
    if let Some(inner) = weak.upgrade() {
        if inner.generation() == generation {
            inner.handle_close(generation, ABNORMAL_CLOSURE, "transport ended".to_string());
        }
    }
}

impl ChannelInner {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Base address + stream path + `token` query parameter
    fn target_url(&self) -> Result<Url, ClientError> {
        let token = self.tokens.access_token().ok_or(ClientError::MissingToken)?;
        let mut url = Url::parse(&format!(
            "{}{}",
            self.ws_base_url.trim_end_matches('/'),
            self.path
        ))?;
        url.query_pairs_mut().append_pair("token", &token);
        Ok(url)
    }

    async fn establish(self: Arc<Self>, generation: u64, url: Url) {
        self.status.send_modify(|s| s.state = ChannelState::Connecting);
        logger::debug(
            LogTag::Realtime,
            &format!("Opening {} (generation {})", redact_url(&url), generation),
        );

        let result = self.connector.connect(&url).await;
        if self.generation() != generation {
            // Superseded while handshaking; dropping the connection closes it
            return;
        }

        match result {
            Ok(mut connection) => {
                let events = connection.take_events();
                {
                    let mut link = self.link.lock();
                    link.connection = Some(connection);
                    if let Some(events) = events {
                        link.reader = Some(tokio::spawn(read_events(
                            Arc::downgrade(&self),
                            generation,
                            events,
                        )));
                    }
                }
                self.status.send_modify(|s| {
                    s.state = ChannelState::Open;
                    s.error = None;
                    s.attempts = 0;
                    s.exhausted = false;
                });
                logger::info(LogTag::Realtime, &format!("Connected to {}", self.path));
                self.handlers.connected();
            }
            Err(e) => {
                let message = e.to_string();
                self.handle_error(&message);
                self.handle_close(generation, ABNORMAL_CLOSURE, message);
            }
        }
    }

    fn handle_message(&self, text: &str) {
        match Envelope::parse(text) {
            Ok(envelope) => {
                logger::verbose(
                    LogTag::Realtime,
                    &format!("{} <- {}", self.path, envelope.kind),
                );
                self.status
                    .send_modify(|s| s.last_message = Some(envelope.clone()));
                self.handlers.message(&envelope);
            }
            Err(e) => {
                logger::warning(
                    LogTag::Realtime,
                    &format!("Dropping frame on {}: {}", self.path, e),
                );
            }
        }
    }

    fn handle_error(&self, message: &str) {
        logger::warning(
            LogTag::Realtime,
            &format!("Transport error on {}: {}", self.path, message),
        );
        self.status
            .send_modify(|s| s.error = Some(message.to_string()));
        self.handlers.errored(message);
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: u16, reason: String) {
        {
            let mut link = self.link.lock();
            if let Some(mut connection) = link.connection.take() {
                connection.detach();
            }
            link.reader = None;
        }

        let attempts = self.status.borrow().attempts;
        self.status.send_modify(|s| s.state = ChannelState::Closed);

        let reason = DisconnectReason { code, reason };
        logger::info(
            LogTag::Realtime,
            &format!("{} closed: {}", self.path, reason),
        );
        self.handlers.disconnected(&reason);

        if reason.is_normal() {
            return;
        }

        if attempts < self.max_attempts {
            let next = attempts + 1;
            self.status.send_modify(|s| s.attempts = next);
            logger::info(
                LogTag::Realtime,
                &format!(
                    "Reconnecting {} in {}ms (attempt {}/{})",
                    self.path,
                    self.reconnect_delay.as_millis(),
                    next,
                    self.max_attempts
                ),
            );
            let task = tokio::spawn(reconnect_after(
                Arc::downgrade(self),
                generation,
                self.reconnect_delay,
            ));
            if let Some(previous) = self.link.lock().reconnect.replace(task) {
                previous.abort();
            }
        } else {
            let err = ClientError::ReconnectExhausted {
                attempts: self.max_attempts,
            };
            let message = err.to_string();
            logger::error(
                LogTag::Realtime,
                &format!("{}: {}", self.path, message),
            );
            self.status.send_modify(|s| {
                s.error = Some(message.clone());
                s.exhausted = true;
            });
            self.handlers.errored(&message);
        }
    }

    fn disconnect(&self) {
        self.bump_generation();
        self.link.lock().teardown(NORMAL_CLOSURE);
        self.status.send_modify(|s| {
            s.state = ChannelState::Idle;
            s.attempts = 0;
            s.error = None;
            s.exhausted = false;
            s.last_message = None;
        });
        logger::debug(LogTag::Realtime, &format!("Disconnected {}", self.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSocket, MockConnector};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FixedToken(Option<&'static str>);

    impl TokenSource for FixedToken {
        fn access_token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 1_000,
            ..RealtimeConfig::default()
        }
    }

    fn channel_with(
        token: Option<&'static str>,
        connector: Arc<MockConnector>,
        handlers: ChannelHandlers,
    ) -> RealtimeChannel {
        RealtimeChannel::new(
            "ws://localhost:8000/",
            "/ws/market",
            Arc::new(FixedToken(token)),
            connector,
            &config(),
            handlers,
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<FakeSocket>) -> FakeSocket {
        sockets.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_refused_without_token() {
        let (connector, _sockets) = MockConnector::new();
        let channel = channel_with(None, connector.clone(), ChannelHandlers::new());

        let result = channel.connect().await;

        assert!(matches!(result, Err(ClientError::MissingToken)));
        assert_eq!(connector.connect_count(), 0);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.status().error.is_some());
    }

    #[tokio::test]
    async fn test_connect_builds_token_url_and_opens() {
        let (connector, mut sockets) = MockConnector::new();
        let connected = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&connected);
        let channel = channel_with(
            Some("abc"),
            connector,
            ChannelHandlers::new().on_connect(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        assert_eq!(socket.url.path(), "/ws/market");
        assert_eq!(socket.url.host_str(), Some("localhost"));
        let token: Vec<_> = socket
            .url
            .query_pairs()
            .filter(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(token, vec!["abc".to_string()]);
        assert!(channel.is_connected());
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signal_envelope_reaches_consumer() {
        let (connector, mut sockets) = MockConnector::new();
        let received = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&received);
        let channel = channel_with(
            Some("abc"),
            connector,
            ChannelHandlers::new().on_message(move |env| *sink.lock() = Some(env.data.clone())),
        );
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        socket.message(r#"{"type":"signal","data":{"id":1,"symbol":"BTC"},"timestamp":"2026-10-19T10:00:00Z"}"#);
        settle().await;

        assert_eq!(*received.lock(), Some(json!({"id": 1, "symbol": "BTC"})));
        assert_eq!(channel.last_message().unwrap().kind, "signal");
    }

    #[tokio::test]
    async fn test_malformed_frames_leave_state_alone() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector, ChannelHandlers::new());
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        socket.message(r#"{"type":"market","data":{"btc":1}}"#);
        settle().await;
        let before = channel.status();

        socket.message("{not json");
        socket.message(r#"{"data":{"missing":"type"}}"#);
        settle().await;

        assert_eq!(channel.status(), before);
        assert!(channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_reconnects_and_resets_attempts() {
        let (connector, mut sockets) = MockConnector::new();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&disconnects);
        let channel = channel_with(
            Some("abc"),
            connector.clone(),
            ChannelHandlers::new().on_disconnect(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.connect().await.unwrap();
        let first = next_socket(&mut sockets).await;

        first.drop_abnormally();
        settle().await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.status().attempts, 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let _second = next_socket(&mut sockets).await;
        settle().await;

        assert_eq!(connector.connect_count(), 2);
        assert!(channel.is_connected());
        assert_eq!(channel.status().attempts, 0);

        // Stale events from the first socket change nothing
        first.drop_abnormally();
        settle().await;
        assert!(channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_close_does_not_reconnect() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector.clone(), ChannelHandlers::new());
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        socket.close_normally();
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_stops_at_max_attempts() {
        let (connector, _sockets) = MockConnector::new();
        connector.refuse_next(100);
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let channel = channel_with(
            Some("abc"),
            connector.clone(),
            ChannelHandlers::new().on_error(move |e| seen.lock().push(e.to_string())),
        );

        channel.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        // initial attempt + 3 retries
        assert_eq!(connector.connect_count(), 4);
        let status = channel.status();
        assert!(status.exhausted);
        assert_eq!(status.state, ChannelState::Closed);
        assert_eq!(
            status.error.as_deref(),
            Some("Max reconnection attempts (3) reached")
        );
        assert_eq!(
            errors.lock().last().map(String::as_str),
            Some("Max reconnection attempts (3) reached")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector.clone(), ChannelHandlers::new());
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;
        socket.message(r#"{"type":"market","data":{}}"#);
        socket.drop_abnormally();
        settle().await;
        assert_eq!(channel.status().attempts, 1);

        channel.disconnect();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(connector.connect_count(), 1);
        let status = channel.status();
        assert_eq!(status.state, ChannelState::Idle);
        assert!(status.last_message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_close_events_after_disconnect_are_ignored() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        let handlers = ChannelHandlers::new().on_disconnect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector.clone(), handlers);
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        channel.disconnect();
        socket.drop_abnormally();
        socket.close_normally();
        socket.drop_abnormally();
        settle().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.connect_count(), 1);
        let status = channel.status();
        assert_eq!(status.state, ChannelState::Idle);
        assert_eq!(status.attempts, 0);
        assert!(!status.exhausted);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_with_normal_code() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector, ChannelHandlers::new());
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        channel.disconnect();

        assert_eq!(socket.close_code(), Some(1000));
        assert!(!channel.send(&json!({"action": "ping"})));
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector, ChannelHandlers::new());
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        drop(channel);

        assert_eq!(socket.close_code(), Some(1000));
    }

    #[tokio::test]
    async fn test_send_only_when_open() {
        let (connector, mut sockets) = MockConnector::new();
        let channel = channel_with(Some("abc"), connector, ChannelHandlers::new());
        assert!(!channel.send(&json!({"action": "subscribe"})));

        channel.connect().await.unwrap();
        let mut socket = next_socket(&mut sockets).await;

        assert!(channel.send(&json!({"action": "subscribe", "symbol": "ETH"})));
        let frame = socket.outbound.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["symbol"], "ETH");
    }

    #[tokio::test]
    async fn test_transport_error_does_not_close() {
        let (connector, mut sockets) = MockConnector::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let channel = channel_with(
            Some("abc"),
            connector.clone(),
            ChannelHandlers::new().on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.connect().await.unwrap();
        let socket = next_socket(&mut sockets).await;

        socket.fail("frame too large");
        settle().await;

        assert!(channel.is_connected());
        assert_eq!(channel.status().error.as_deref(), Some("frame too large"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(connector.connect_count(), 1);
    }
}
