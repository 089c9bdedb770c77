/// WebSocket transport capability
///
/// A `WsConnector` performs the handshake and hands back a `Connection`:
/// an outbound text queue, an inbound event stream and a close switch.
/// `TungsteniteConnector` is the production implementation; it runs one
/// pump task per socket.
use super::handlers::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::errors::ClientError;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// What the transport reports about one socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    /// The socket is gone; always the last event
    Closed { code: u16, reason: String },
    Error(String),
}

type Closer = Box<dyn FnOnce(u16) + Send>;

pub struct Connection {
    outbound: mpsc::Sender<String>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    closer: Option<Closer>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::Sender<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        closer: impl FnOnce(u16) + Send + 'static,
    ) -> Self {
        Self {
            outbound,
            events: Some(events),
            closer: Some(Box::new(closer)),
        }
    }

    /// Queue a text frame; false if the queue is full or the socket is gone
    pub fn send(&self, text: String) -> bool {
        self.outbound.try_send(text).is_ok()
    }

    pub(crate) fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }

    pub fn close(&mut self, code: u16) {
        if let Some(closer) = self.closer.take() {
            closer(code);
        }
    }

    /// The remote side already closed; nothing left to send
    pub(crate) fn detach(&mut self) {
        self.closer = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close(NORMAL_CLOSURE);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.closer.is_some())
            .finish()
    }
}

#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Connection, ClientError>;
}

/// Hide the `token` query parameter in log output
pub fn redact_url(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if pairs.is_empty() {
        return shown.to_string();
    }
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}

/// tokio-tungstenite connector
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    outbound_buffer: usize,
}

impl TungsteniteConnector {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            outbound_buffer: outbound_buffer.max(1),
        }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Connection, ClientError> {
        let shown = redact_url(url);
        logger::debug(LogTag::Realtime, &format!("Connecting to {}", shown));

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Network(format!("WebSocket handshake failed: {}", e)))?;

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.outbound_buffer);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = oneshot::channel::<u16>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    requested = &mut close_rx => {
                        let code = requested.unwrap_or(NORMAL_CLOSURE);
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            logger::debug(LogTag::Realtime, &format!("Close frame not sent: {}", e));
                        }
                        break;
                    }
                    Some(text) = out_rx.recv() => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = event_tx.send(TransportEvent::Error(format!("Send failed: {}", e)));
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            logger::verbose(LogTag::Realtime, &format!("<- {}", text));
                            let _ = event_tx.send(TransportEvent::Message(text));
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                let _ = event_tx.send(TransportEvent::Message(text));
                            }
                            Err(_) => {
                                logger::debug(LogTag::Realtime, "Dropping non UTF-8 binary frame");
                            }
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.into_owned()))
                                .unwrap_or((1005, String::new()));
                            let _ = event_tx.send(TransportEvent::Closed { code, reason });
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                            let _ = event_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: e.to_string(),
                            });
                            break;
                        }
                        None => {
                            let _ = event_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: "stream ended".to_string(),
                            });
                            break;
                        }
                    }
                }
            }
            logger::debug(LogTag::Realtime, &format!("Socket pump for {} stopped", shown));
        });

        Ok(Connection::new(out_tx, event_rx, move |code| {
            let _ = close_tx.send(code);
        }))
    }
}
