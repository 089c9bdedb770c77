//! Scripted test doubles for the backend and WebSocket capabilities
use crate::api::{
    ApiResult, AuthApi, CheckoutRequest, CheckoutSession, CryptoPayment, CryptoPaymentRequest,
    CryptoPaymentStatus, LoginResponse, PaymentApi, PaymentStatus, SessionInfo,
};
use crate::errors::{ApiError, ClientError};
use crate::realtime::{Connection, TransportEvent, WsConnector};
use crate::session::{Credentials, RegisterData, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

pub fn user_fixture(id: i64, tier: &str) -> User {
    serde_json::from_value(json!({
        "id": id,
        "email": format!("user{}@example.com", id),
        "username": format!("user{}", id),
        "subscription_tier": tier,
        "permissions": ["portfolio:read"],
    }))
    .unwrap()
}

pub fn login_fixture(token: &str, user: User) -> LoginResponse {
    LoginResponse {
        access_token: token.to_string(),
        token_type: Some("bearer".to_string()),
        expires_in: None,
        refresh_expires_in: None,
        session_id: None,
        user,
        permissions: Vec::new(),
    }
}

// =============================================================================
// AUTH API
// =============================================================================

/// Responses are consumed in order; an empty queue answers 401 for `me`,
/// `login` and `refresh`, 400 for `register`, and success for the rest.
#[derive(Default)]
pub struct MockAuthApi {
    me: Mutex<VecDeque<ApiResult<User>>>,
    login: Mutex<VecDeque<ApiResult<LoginResponse>>>,
    register: Mutex<VecDeque<ApiResult<LoginResponse>>>,
    logout: Mutex<VecDeque<ApiResult<()>>>,
    health: Mutex<VecDeque<ApiResult<()>>>,
    refresh: Mutex<VecDeque<ApiResult<LoginResponse>>>,
    sessions: Mutex<VecDeque<ApiResult<Vec<SessionInfo>>>>,
    revoke: Mutex<VecDeque<ApiResult<()>>>,
    me_delay: Mutex<Option<Duration>>,
    pub me_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub revoked: Mutex<Vec<String>>,
    pub last_logout_all: Mutex<Option<bool>>,
    pub login_methods: Mutex<Vec<&'static str>>,
    pub seen_tokens: Mutex<Vec<String>>,
}

impl MockAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_me(&self, result: ApiResult<User>) {
        self.me.lock().push_back(result);
    }

    pub fn push_login(&self, result: ApiResult<LoginResponse>) {
        self.login.lock().push_back(result);
    }

    pub fn push_register(&self, result: ApiResult<LoginResponse>) {
        self.register.lock().push_back(result);
    }

    pub fn push_logout(&self, result: ApiResult<()>) {
        self.logout.lock().push_back(result);
    }

    pub fn push_health(&self, result: ApiResult<()>) {
        self.health.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: ApiResult<LoginResponse>) {
        self.refresh.lock().push_back(result);
    }

    pub fn push_sessions(&self, result: ApiResult<Vec<SessionInfo>>) {
        self.sessions.lock().push_back(result);
    }

    pub fn push_revoke(&self, result: ApiResult<()>) {
        self.revoke.lock().push_back(result);
    }

    /// Delay every `me` call, to hold verification in flight
    pub fn set_me_delay(&self, delay: Duration) {
        *self.me_delay.lock() = Some(delay);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn current_user(&self, token: &str) -> ApiResult<User> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().push(token.to_string());
        let delay = *self.me_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.me.lock().pop_front();
        next.unwrap_or_else(|| Err(ApiError::http(401, "Could not validate credentials")))
    }

    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_methods.lock().push(credentials.method());
        let next = self.login.lock().pop_front();
        next.unwrap_or_else(|| Err(ApiError::http(401, "Invalid email or password")))
    }

    async fn register(&self, _data: &RegisterData) -> ApiResult<LoginResponse> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.register.lock().pop_front();
        next.unwrap_or_else(|| Err(ApiError::http(400, "Email already registered")))
    }

    async fn logout(&self, _token: Option<&str>, logout_all: bool) -> ApiResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_logout_all.lock() = Some(logout_all);
        let next = self.logout.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn health(&self) -> ApiResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.health.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn refresh(&self) -> ApiResult<LoginResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.refresh.lock().pop_front();
        next.unwrap_or_else(|| Err(ApiError::http(401, "Refresh token required")))
    }

    async fn sessions(&self, _token: &str) -> ApiResult<Vec<SessionInfo>> {
        let next = self.sessions.lock().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn revoke_session(&self, _token: &str, session_id: &str) -> ApiResult<()> {
        self.revoked.lock().push(session_id.to_string());
        let next = self.revoke.lock().pop_front();
        next.unwrap_or(Ok(()))
    }
}

// =============================================================================
// PAYMENT API
// =============================================================================

/// Status polls are consumed in order; once empty the last answer repeats
#[derive(Default)]
pub struct MockPaymentApi {
    statuses: Mutex<VecDeque<ApiResult<CryptoPaymentStatus>>>,
    pub status_calls: AtomicUsize,
}

impl MockPaymentApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, status: PaymentStatus) {
        self.statuses.lock().push_back(Ok(CryptoPaymentStatus {
            status,
            subscription_id: (status == PaymentStatus::Completed).then(|| "sub_1".to_string()),
            confirmations: Some(0),
        }));
    }

    pub fn push_status_error(&self, err: ApiError) {
        self.statuses.lock().push_back(Err(err));
    }
}

#[async_trait]
impl PaymentApi for MockPaymentApi {
    async fn create_checkout_session(
        &self,
        _token: &str,
        request: &CheckoutRequest,
    ) -> ApiResult<CheckoutSession> {
        Ok(CheckoutSession {
            url: format!("https://checkout.example.com/{}", request.plan_type),
        })
    }

    async fn create_crypto_payment(
        &self,
        _token: &str,
        request: &CryptoPaymentRequest,
    ) -> ApiResult<CryptoPayment> {
        Ok(CryptoPayment {
            payment_id: "pay_1".to_string(),
            wallet_address: "bc1qexample".to_string(),
            amount_crypto: request.amount / 50_000.0,
            crypto_symbol: "BTC".to_string(),
            qr_code: None,
            expires_at: "2026-10-19T12:30:00".to_string(),
        })
    }

    async fn crypto_payment_status(
        &self,
        _token: &str,
        _payment_id: &str,
    ) -> ApiResult<CryptoPaymentStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.statuses.lock();
        if queue.len() > 1 {
            return queue.pop_front().unwrap_or_else(|| Err(ApiError::network("empty")));
        }
        match queue.front() {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ApiError::network("no scripted status")),
        }
    }
}

// =============================================================================
// WEBSOCKET CONNECTOR
// =============================================================================

/// Test side of one fake connection
pub struct FakeSocket {
    pub url: Url,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::Receiver<String>,
    pub closed: Arc<Mutex<Option<u16>>>,
}

impl FakeSocket {
    pub fn message(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    pub fn drop_abnormally(&self) {
        let _ = self.events.send(TransportEvent::Closed {
            code: 1006,
            reason: "connection reset".to_string(),
        });
    }

    pub fn close_normally(&self) {
        let _ = self.events.send(TransportEvent::Closed {
            code: 1000,
            reason: String::new(),
        });
    }

    pub fn fail(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Close code the channel asked for, if it closed this socket
    pub fn close_code(&self) -> Option<u16> {
        *self.closed.lock()
    }
}

/// Hands every connection to the test through `sockets`
pub struct MockConnector {
    sockets: mpsc::UnboundedSender<FakeSocket>,
    refuse: Mutex<usize>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sockets: tx,
                refuse: Mutex::new(0),
                connects: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Fail the next `n` handshakes
    pub fn refuse_next(&self, n: usize) {
        *self.refuse.lock() = n;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsConnector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Connection, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        {
            let mut refuse = self.refuse.lock();
            if *refuse > 0 {
                *refuse -= 1;
                return Err(ClientError::Network("handshake refused".to_string()));
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(16);
        let closed = Arc::new(Mutex::new(None));
        let socket = FakeSocket {
            url: url.clone(),
            events: event_tx,
            outbound: out_rx,
            closed: Arc::clone(&closed),
        };
        let _ = self.sockets.send(socket);

        Ok(Connection::new(out_tx, event_rx, move |code| {
            *closed.lock() = Some(code);
        }))
    }
}
