/// Session Manager
///
/// Owns the authentication state of the client:
/// - startup verification of a stored token (shared by concurrent callers)
/// - login / register / logout with classified results
/// - access token rotation ahead of expiry, and the list of active logins
/// - periodic re-verification and the online/offline signal
/// - the single security event slot
///
/// State is published through a `watch` channel; events additionally go out
/// on a `broadcast` feed. Dropping the manager cancels all of its timers.
use super::events::EventSlot;
use super::permissions::{self, TierLadder};
use super::types::{
    codes, AuthResult, Credentials, EventKind, RegisterData, SecurityEvent, SessionSnapshot, User,
};
use crate::api::{AuthApi, LoginResponse, SessionInfo};
use crate::config::SessionConfig;
use crate::errors::{ApiError, ClientError};
use crate::logger::{self, LogTag};
use crate::storage::{SessionStore, TokenSource};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthFlow {
    Login,
    Register,
}

pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    this: Weak<SessionInner>,
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: EventSlot,
    /// Bumped whenever the session identity changes (login, logout, expiry).
    /// Verification responses from an older epoch are dropped.
    epoch: AtomicU64,
    init: OnceCell<()>,
    revalidation: Mutex<Option<JoinHandle<()>>>,
    token_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            user: None,
            loading: true,
            online: true,
            event: None,
        });

        let events = EventSlot::new(&config);
        Self {
            inner: Arc::new_cyclic(|this| SessionInner {
                this: this.clone(),
                api,
                store,
                config,
                state: Arc::new(state),
                events,
                epoch: AtomicU64::new(0),
                init: OnceCell::new(),
                revalidation: Mutex::new(None),
                token_refresh: Mutex::new(None),
            }),
        }
    }

    /// Verify the stored session; runs once, later calls wait for the first
    pub async fn initialize(&self) {
        let inner = &self.inner;
        inner
            .init
            .get_or_init(|| async move { inner.verify_stored_session().await })
            .await;
    }

    pub async fn login(&self, credentials: &Credentials) -> AuthResult {
        self.inner.login(credentials).await
    }

    pub async fn register(&self, data: &RegisterData) -> AuthResult {
        self.inner.register(data).await
    }

    pub async fn logout(&self, logout_all: bool) {
        self.inner.logout(logout_all).await
    }

    pub async fn refresh_user(&self) {
        self.inner.refresh_user().await
    }

    /// Rotate the access token now; returns whether a new token was stored.
    /// Runs on its own shortly before the token expires.
    pub async fn refresh_token(&self) -> bool {
        self.inner.refresh_token().await
    }

    /// Active logins of the current user
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>, ClientError> {
        self.inner.sessions().await
    }

    /// Sign out one login (possibly on another device)
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), ClientError> {
        self.inner.revoke_session(session_id).await
    }

    /// Merge a partial user record (JSON object) into the current user
    pub fn update_user(&self, partial: Value) {
        self.inner.update_user(partial)
    }

    /// Probe the backend; returns whether it answered
    pub async fn retry_connection(&self) -> bool {
        self.inner.retry_connection().await
    }

    /// Token expiry signal from elsewhere in the app (e.g. a 401 on another call)
    pub fn handle_token_expired(&self) {
        self.inner.handle_token_expired()
    }

    /// Online/offline signal; coming back online re-verifies the user
    pub async fn set_online(&self, online: bool) {
        self.inner.set_online(online).await
    }

    /// Re-verify the user every `revalidate_interval_secs`
    pub fn start_revalidation(&self) {
        let period = Duration::from_secs(self.inner.config.revalidate_interval_secs.max(1));
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(revalidation_loop(weak, period));
        if let Some(previous) = self.inner.revalidation.lock().replace(handle) {
            previous.abort();
        }
        logger::debug(
            LogTag::Session,
            &format!("Revalidation every {}s", period.as_secs()),
        );
    }

    /// Cancel every pending timer (auto-hide, revalidation, token refresh)
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn dismiss_event(&self) {
        self.inner.events.dismiss(&self.inner.state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().user.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.inner.state.borrow().online
    }

    /// Snapshot updates; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Every emitted event, including ones replaced before being seen
    pub fn events(&self) -> broadcast::Receiver<SecurityEvent> {
        self.inner.events.subscribe()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        permissions::has_permission(self.inner.state.borrow().user.as_ref(), permission)
    }

    pub fn has_tier(&self, required: &str, ladder: TierLadder) -> bool {
        permissions::has_tier(self.inner.state.borrow().user.as_ref(), required, ladder)
    }

    /// Read-only token access for the realtime channels
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        Arc::new(self.inner.store.clone())
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.state.borrow();
        f.debug_struct("SessionManager")
            .field("authenticated", &snapshot.user.is_some())
            .field("loading", &snapshot.loading)
            .field("online", &snapshot.online)
            .finish()
    }
}

async fn revalidation_loop(weak: Weak<SessionInner>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        if inner.current_user().is_some() {
            logger::debug(LogTag::Session, "Periodic session revalidation");
            inner.refresh_user().await;
        }
    }
}

impl SessionInner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    fn emit(&self, kind: EventKind, message: &str, code: &str) {
        self.emit_with(kind, message, code, true);
    }

    fn emit_with(&self, kind: EventKind, message: &str, code: &str, auto_hide: bool) {
        logger::debug(
            LogTag::Session,
            &format!("Event [{}] {}: {}", kind.as_str(), code, message),
        );
        self.events
            .emit(&self.state, kind, message, Some(code), auto_hide);
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.loading != loading;
            s.loading = loading;
            changed
        });
    }

    fn adopt_user(&self, user: User) {
        if let Err(e) = self.store.cache_user(&user) {
            logger::warning(LogTag::Session, &format!("Failed to cache user: {}", e));
        }
        self.state.send_modify(|s| {
            s.user = Some(user);
            s.loading = false;
            s.online = true;
        });
    }

    fn clear_session(&self) {
        self.bump_epoch();
        self.cancel_token_refresh();
        if let Err(e) = self.store.clear() {
            logger::warning(
                LogTag::Session,
                &format!("Failed to clear stored session: {}", e),
            );
        }
        self.state.send_modify(|s| {
            s.user = None;
            s.loading = false;
        });
    }

    fn go_offline(&self, reason: &ApiError) {
        logger::warning(
            LogTag::Session,
            &format!("Backend unreachable: {}", reason.message),
        );
        self.state.send_modify(|s| {
            s.online = false;
            s.loading = false;
        });
    }

    async fn verify_stored_session(&self) {
        let epoch = self.epoch();

        let token = match self.store.token() {
            Some(token) => token,
            None => {
                logger::debug(LogTag::Session, "No stored token, starting logged out");
                if let Err(e) = self.store.clear_user() {
                    logger::warning(LogTag::Session, &format!("Failed to drop cached user: {}", e));
                }
                self.state.send_modify(|s| {
                    s.user = None;
                    s.loading = false;
                });
                return;
            }
        };

        if let Some(cached) = self.store.cached_user() {
            logger::debug(
                LogTag::Session,
                &format!("Showing cached user {} until verified", cached.display_name()),
            );
            self.state.send_modify(|s| s.user = Some(cached));
        }
        self.set_loading(true);

        let result = self.api.current_user(&token).await;
        if self.epoch() != epoch {
            logger::debug(LogTag::Session, "Discarding stale startup verification");
            return;
        }

        match result {
            Ok(user) => {
                logger::info(
                    LogTag::Session,
                    &format!("Session restored for {}", user.display_name()),
                );
                self.adopt_user(user);
            }
            Err(e) if e.is_unauthorized() => {
                logger::info(LogTag::Session, "Stored session rejected, logging out locally");
                self.clear_session();
            }
            Err(e) if e.is_network() => {
                self.go_offline(&e);
                self.emit(
                    EventKind::Warning,
                    "Unable to reach the server. Showing cached data.",
                    codes::OFFLINE,
                );
            }
            Err(e) => {
                logger::warning(
                    LogTag::Session,
                    &format!("Session verification failed: {}", e),
                );
                self.set_loading(false);
            }
        }
    }

    async fn login(&self, credentials: &Credentials) -> AuthResult {
        logger::info(
            LogTag::Session,
            &format!("Login attempt ({})", credentials.method()),
        );
        self.set_loading(true);
        let result = self.api.login(credentials).await;
        self.set_loading(false);

        match result {
            Ok(response) => {
                let name = self.start_session(response);
                self.emit(
                    EventKind::Info,
                    &format!("Welcome back, {}", name),
                    codes::LOGIN_SUCCESS,
                );
                AuthResult::ok()
            }
            Err(e) => self.auth_failure(e, AuthFlow::Login),
        }
    }

    async fn register(&self, data: &RegisterData) -> AuthResult {
        logger::info(LogTag::Session, "Registration attempt");
        self.set_loading(true);
        let result = self.api.register(data).await;
        self.set_loading(false);

        match result {
            Ok(response) => {
                let name = self.start_session(response);
                self.emit(
                    EventKind::Info,
                    &format!("Welcome, {}", name),
                    codes::REGISTER_SUCCESS,
                );
                AuthResult::ok()
            }
            Err(e) => self.auth_failure(e, AuthFlow::Register),
        }
    }

    /// Adopt a fresh login; returns the display name
    fn start_session(&self, response: LoginResponse) -> String {
        self.bump_epoch();
        let expires_in = response.expires_in;
        let user = self.store_token_response(response);

        let name = user.display_name();
        logger::info(LogTag::Session, &format!("Logged in as {}", name));
        self.adopt_user(user);
        self.schedule_token_refresh(expires_in);
        name
    }

    /// Persist the token of a login/refresh response; returns its user with
    /// the response-level permissions merged in
    fn store_token_response(&self, response: LoginResponse) -> User {
        if let Err(e) = self.store.set_token(&response.access_token) {
            logger::warning(LogTag::Session, &format!("Failed to persist token: {}", e));
        }

        let mut user = response.user;
        for permission in response.permissions {
            if !user.permissions.contains(&permission) {
                user.permissions.push(permission);
            }
        }
        user
    }

    fn schedule_token_refresh(&self, expires_in: Option<u64>) {
        let expires_in = match expires_in {
            Some(secs) if secs > 0 => secs,
            _ => {
                self.cancel_token_refresh();
                return;
            }
        };
        let lead = self.config.token_refresh_margin_secs.min(expires_in / 2);
        let delay = Duration::from_secs((expires_in - lead).max(1));

        let weak = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                // Release the slot first; a successful refresh schedules the next one
                inner.token_refresh.lock().take();
                inner.refresh_token().await;
            }
        });
        if let Some(previous) = self.token_refresh.lock().replace(handle) {
            previous.abort();
        }
        logger::debug(
            LogTag::Session,
            &format!("Token refresh in {}s", delay.as_secs()),
        );
    }

    fn cancel_token_refresh(&self) {
        if let Some(handle) = self.token_refresh.lock().take() {
            handle.abort();
        }
    }

    async fn refresh_token(&self) -> bool {
        if self.store.token().is_none() {
            logger::debug(LogTag::Session, "Token refresh skipped, no session");
            return false;
        }
        let epoch = self.epoch();

        let result = self.api.refresh().await;
        if self.epoch() != epoch {
            logger::debug(LogTag::Session, "Discarding stale token refresh");
            return false;
        }

        match result {
            Ok(response) => {
                let expires_in = response.expires_in;
                let user = self.store_token_response(response);
                logger::info(LogTag::Session, "Access token rotated");
                self.adopt_user(user);
                self.schedule_token_refresh(expires_in);
                true
            }
            Err(e) if e.is_unauthorized() => {
                logger::info(LogTag::Session, "Refresh token rejected");
                self.expire();
                false
            }
            Err(e) if e.is_network() => {
                self.go_offline(&e);
                self.emit(
                    EventKind::Warning,
                    "Unable to reach the server. Check your connection.",
                    codes::OFFLINE,
                );
                false
            }
            Err(e) => {
                logger::warning(LogTag::Session, &format!("Token refresh failed: {}", e));
                false
            }
        }
    }

    async fn sessions(&self) -> Result<Vec<SessionInfo>, ClientError> {
        let token = self.store.token().ok_or(ClientError::MissingToken)?;
        self.api
            .sessions(&token)
            .await
            .map_err(|e| self.expire_if_unauthorized(e))
    }

    async fn revoke_session(&self, session_id: &str) -> Result<(), ClientError> {
        let token = self.store.token().ok_or(ClientError::MissingToken)?;
        self.api
            .revoke_session(&token, session_id)
            .await
            .map_err(|e| self.expire_if_unauthorized(e))?;
        logger::info(LogTag::Session, &format!("Revoked session {}", session_id));
        Ok(())
    }

    fn expire_if_unauthorized(&self, err: ApiError) -> ClientError {
        if err.is_unauthorized() {
            self.expire();
        }
        err.into()
    }

    fn auth_failure(&self, err: ApiError, flow: AuthFlow) -> AuthResult {
        logger::debug(
            LogTag::Session,
            &format!("{:?} failed: {}", flow, err),
        );

        if flow == AuthFlow::Login && err.is_mfa_required() {
            self.emit(
                EventKind::Info,
                "Enter the code from your authenticator app",
                codes::MFA_REQUIRED,
            );
            return AuthResult {
                requires_mfa: true,
                error: Some(err.message),
                ..AuthResult::default()
            };
        }

        if err.is_network() {
            self.go_offline(&err);
            self.emit(
                EventKind::Warning,
                "Unable to reach the server. Check your connection.",
                codes::OFFLINE,
            );
            return AuthResult::failed(err.message);
        }

        if err.is_rate_limited() {
            self.emit(
                EventKind::Warning,
                "Too many attempts. Please wait before trying again.",
                codes::RATE_LIMITED,
            );
            return AuthResult {
                rate_limited: true,
                ..AuthResult::failed(err.message)
            };
        }

        if flow == AuthFlow::Login && err.is_account_locked() {
            self.emit(
                EventKind::Error,
                "Account temporarily locked after repeated failures.",
                codes::ACCOUNT_LOCKED,
            );
            return AuthResult {
                account_locked: true,
                ..AuthResult::failed(err.message)
            };
        }

        let code = match flow {
            AuthFlow::Login => codes::LOGIN_FAILED,
            AuthFlow::Register => codes::REGISTER_FAILED,
        };
        self.emit(EventKind::Error, &err.message, code);
        AuthResult::failed(err.message)
    }

    async fn logout(&self, logout_all: bool) {
        self.bump_epoch();
        let token = self.store.token();

        if let Some(token) = token.as_deref() {
            if let Err(e) = self.api.logout(Some(token), logout_all).await {
                logger::warning(
                    LogTag::Session,
                    &format!("Backend logout failed, clearing locally: {}", e),
                );
            }
        }

        self.clear_session();
        let message = if logout_all {
            "Logged out from all devices"
        } else {
            "Logged out"
        };
        logger::info(LogTag::Session, message);
        self.emit(EventKind::Info, message, codes::LOGOUT);
    }

    async fn refresh_user(&self) {
        let token = match self.store.token() {
            Some(token) => token,
            None => {
                logger::debug(LogTag::Session, "Refresh skipped, no token");
                return;
            }
        };
        let epoch = self.epoch();

        let result = self.api.current_user(&token).await;
        if self.epoch() != epoch {
            logger::debug(LogTag::Session, "Discarding stale refresh");
            return;
        }

        match result {
            Ok(user) => self.adopt_user(user),
            Err(e) if e.is_unauthorized() => {
                logger::info(LogTag::Session, "Session expired during refresh");
                self.expire();
            }
            Err(e) => {
                logger::warning(LogTag::Session, &format!("User refresh failed: {}", e));
            }
        }
    }

    fn expire(&self) {
        self.clear_session();
        self.emit(
            EventKind::Warning,
            "Your session has expired. Please log in again.",
            codes::SESSION_EXPIRED,
        );
    }

    fn update_user(&self, partial: Value) {
        let fields = match partial {
            Value::Object(fields) => fields,
            other => {
                logger::warning(
                    LogTag::Session,
                    &format!("Ignoring non-object user update: {}", other),
                );
                return;
            }
        };

        let current = match self.current_user() {
            Some(user) => user,
            None => return,
        };

        match current.merged_with(&fields) {
            Ok(user) => {
                if let Err(e) = self.store.cache_user(&user) {
                    logger::warning(LogTag::Session, &format!("Failed to cache user: {}", e));
                }
                self.state.send_modify(|s| s.user = Some(user));
            }
            Err(e) => {
                logger::warning(LogTag::Session, &format!("Rejected user update: {}", e));
            }
        }
    }

    async fn retry_connection(&self) -> bool {
        match self.api.health().await {
            Ok(()) => {
                logger::info(LogTag::Session, "Backend reachable again");
                self.state.send_if_modified(|s| {
                    let changed = !s.online;
                    s.online = true;
                    changed
                });
                self.refresh_user().await;
                true
            }
            Err(e) => {
                logger::warning(LogTag::Session, &format!("Health check failed: {}", e));
                self.emit_with(
                    EventKind::Error,
                    "Unable to connect to server. Please check your connection.",
                    codes::CONNECTION_FAILED,
                    false,
                );
                false
            }
        }
    }

    fn handle_token_expired(&self) {
        logger::info(LogTag::Session, "Token expiry signalled");
        self.expire();
    }

    async fn set_online(&self, online: bool) {
        let was_online = self.state.borrow().online;
        if was_online == online {
            return;
        }
        self.state.send_modify(|s| s.online = online);

        if online {
            logger::info(LogTag::Session, "Back online, re-verifying session");
            self.refresh_user().await;
        } else {
            logger::warning(LogTag::Session, "Went offline");
            self.emit(
                EventKind::Warning,
                "You are offline. Data may be out of date.",
                codes::OFFLINE,
            );
        }
    }

    fn shutdown(&self) {
        if let Some(handle) = self.revalidation.lock().take() {
            handle.abort();
        }
        self.cancel_token_refresh();
        self.events.cancel_timer();
    }
}
