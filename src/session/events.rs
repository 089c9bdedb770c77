/// Single-slot security event notifications
///
/// The newest event replaces the previous one in the session snapshot. Each
/// event may schedule its own auto-hide; scheduling a new one or dismissing
/// aborts the pending timer.
use super::types::{EventKind, SecurityEvent, SessionSnapshot};
use crate::config::SessionConfig;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const EVENT_FEED_CAPACITY: usize = 32;

pub(crate) struct EventSlot {
    error_hide: Duration,
    warning_hide: Duration,
    info_hide: Duration,
    next_id: AtomicU64,
    hide_timer: Mutex<Option<JoinHandle<()>>>,
    feed: broadcast::Sender<SecurityEvent>,
}

impl EventSlot {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        let (feed, _) = broadcast::channel(EVENT_FEED_CAPACITY);
        Self {
            error_hide: Duration::from_millis(config.error_hide_ms),
            warning_hide: Duration::from_millis(config.warning_hide_ms),
            info_hide: Duration::from_millis(config.info_hide_ms),
            next_id: AtomicU64::new(1),
            hide_timer: Mutex::new(None),
            feed,
        }
    }

    pub(crate) fn hide_after(&self, kind: EventKind) -> Duration {
        match kind {
            EventKind::Error => self.error_hide,
            EventKind::Warning => self.warning_hide,
            EventKind::Info => self.info_hide,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.feed.subscribe()
    }

    /// Publish an event into the slot and the event feed
    pub(crate) fn emit(
        &self,
        state: &Arc<watch::Sender<SessionSnapshot>>,
        kind: EventKind,
        message: impl Into<String>,
        code: Option<&str>,
        auto_hide: bool,
    ) -> SecurityEvent {
        let event = SecurityEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
            code: code.map(str::to_string),
            timestamp: Utc::now(),
            auto_hide,
        };

        let mut timer = self.hide_timer.lock();
        if let Some(pending) = timer.take() {
            pending.abort();
        }

        state.send_modify(|s| s.event = Some(event.clone()));

        if auto_hide {
            let delay = self.hide_after(kind);
            let id = event.id;
            let state = Arc::clone(state);
            *timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                state.send_if_modified(|s| match &s.event {
                    Some(current) if current.id == id => {
                        s.event = None;
                        true
                    }
                    _ => false,
                });
            }));
        }
        drop(timer);

        // No subscribers is fine
        let _ = self.feed.send(event.clone());
        event
    }

    pub(crate) fn dismiss(&self, state: &watch::Sender<SessionSnapshot>) {
        self.cancel_timer();
        state.send_if_modified(|s| s.event.take().is_some());
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(pending) = self.hide_timer.lock().take() {
            pending.abort();
        }
    }
}
