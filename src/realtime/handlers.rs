//! Connection lifecycle callbacks for a realtime channel
//!
//! ```rust
//! use cryptopilot::realtime::ChannelHandlers;
//!
//! let handlers = ChannelHandlers::new()
//!     .on_connect(|| println!("connected"))
//!     .on_disconnect(|reason| println!("closed: {}", reason))
//!     .on_message(|envelope| println!("{}", envelope.kind));
//! assert!(handlers.has_message_handler());
//! ```
use super::envelope::Envelope;
use std::fmt;
use std::sync::Arc;

/// Close code meaning the close was requested on purpose
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the connection dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub code: u16,
    pub reason: String,
}

impl DisconnectReason {
    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "{} (code {})", self.reason, self.code)
        }
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type OnMessageCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// All handlers are optional and run on the channel's reader task, so they
/// must not block.
#[derive(Clone, Default)]
pub struct ChannelHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_message: Option<OnMessageCallback>,
}

impl ChannelHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(&DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&Envelope) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn has_message_handler(&self) -> bool {
        self.on_message.is_some()
    }

    /// Run `fold` before any message handler already registered
    pub(crate) fn prepend_message(mut self, fold: impl Fn(&Envelope) + Send + Sync + 'static) -> Self {
        let existing = self.on_message.take();
        self.on_message = Some(Arc::new(move |envelope: &Envelope| {
            fold(envelope);
            if let Some(handler) = &existing {
                handler(envelope);
            }
        }));
        self
    }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn disconnected(&self, reason: &DisconnectReason) {
        if let Some(f) = &self.on_disconnect {
            f(reason);
        }
    }

    pub(crate) fn errored(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }

    pub(crate) fn message(&self, envelope: &Envelope) {
        if let Some(f) = &self.on_message {
            f(envelope);
        }
    }
}

impl fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}
