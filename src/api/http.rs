use super::types::{
    CheckoutRequest, CheckoutSession, CryptoPayment, CryptoPaymentRequest, CryptoPaymentStatus,
    CsrfToken, LoginResponse, SessionInfo,
};
use super::{ApiResult, AuthApi, PaymentApi};
use crate::config::ApiConfig;
use crate::errors::{ApiError, ClientError};
use crate::logger::{self, LogTag};
use crate::session::{Credentials, RegisterData, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "CryptoPilot/1.0";
const MFA_HEADER: &str = "X-MFA-Required";
const CSRF_HEADER: &str = "X-CSRF-Token";

/// reqwest-backed implementation of both backend capabilities
///
/// The client keeps a cookie jar so the refresh cookie set at login is sent
/// back on `POST /api/auth/refresh`. State-changing auth calls carry an
/// `X-CSRF-Token`, fetched once from `/api/auth/csrf-token` and reused.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    health_timeout: Duration,
    csrf: Arc<Mutex<Option<String>>>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            csrf: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, method: &str, path: &str, request: RequestBuilder) -> ApiResult<Response> {
        logger::debug(LogTag::Api, &format!("{} {}", method, path));

        let response = request.send().await.map_err(|e| {
            logger::debug(LogTag::Api, &format!("{} {} failed: {}", method, path, e));
            match e.status() {
                Some(status) => ApiError::http(status.as_u16(), e.to_string()),
                None => ApiError::network(e.to_string()),
            }
        })?;

        let status = response.status();
        logger::debug(
            LogTag::Api,
            &format!("{} {} -> {}", method, path, status.as_u16()),
        );

        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let status = response.status().as_u16();
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::http(status, format!("Unexpected response body: {}", e)))
    }

    async fn csrf_token(&self) -> ApiResult<String> {
        if let Some(token) = self.csrf.lock().clone() {
            return Ok(token);
        }

        let path = "/api/auth/csrf-token";
        let response = self.send("GET", path, self.client.get(self.url(path))).await?;
        let token = Self::json::<CsrfToken>(response).await?.csrf_token;
        *self.csrf.lock() = Some(token.clone());
        Ok(token)
    }

    /// Send a state-changing request with the CSRF header attached.
    /// A 403 drops the cached token so the next call fetches a fresh one.
    async fn send_protected(
        &self,
        method: &str,
        path: &str,
        request: RequestBuilder,
    ) -> ApiResult<Response> {
        let token = self.csrf_token().await?;
        let result = self
            .send(method, path, request.header(CSRF_HEADER, token))
            .await;
        if let Err(e) = &result {
            if e.status == Some(403) {
                self.csrf.lock().take();
            }
        }
        result
    }

    /// Login-shaped endpoints also signal MFA with a 2xx + header
    async fn login_like<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<LoginResponse> {
        let request = self.client.post(self.url(path)).json(body);
        let response = self.send_protected("POST", path, request).await?;

        let mfa_header = response
            .headers()
            .get(MFA_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if response.status() == StatusCode::ACCEPTED || mfa_header {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| "MFA code required".to_string());
            return Err(ApiError::mfa_required(message));
        }

        Self::json(response).await
    }
}

/// Pull a human message out of an error body (`detail`, `error` or `message`)
fn error_message(body: &Value) -> Option<String> {
    ["detail", "error", "message"].iter().find_map(|key| {
        match body.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items
                .first()
                .and_then(|item| item.get("msg"))
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        }
    })
}

async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| error_message(&body))
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                text
            }
        });
    ApiError::http(status.as_u16(), message)
}

#[async_trait]
impl AuthApi for HttpApi {
    async fn current_user(&self, token: &str) -> ApiResult<User> {
        let path = "/api/auth/me";
        let request = self.client.get(self.url(path)).bearer_auth(token);
        let response = self.send("GET", path, request).await?;
        Self::json(response).await
    }

    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        match credentials {
            Credentials::Password(c) => self.login_like("/api/auth/login", c).await,
            Credentials::Telegram(c) => self.login_like("/api/auth/telegram", c).await,
            Credentials::Wallet(c) => self.login_like("/api/auth/wallet", c).await,
        }
    }

    async fn register(&self, data: &RegisterData) -> ApiResult<LoginResponse> {
        self.login_like("/api/auth/register", data).await
    }

    async fn logout(&self, token: Option<&str>, logout_all: bool) -> ApiResult<()> {
        let path = "/api/auth/logout";
        let mut request = self
            .client
            .post(self.url(path))
            .query(&[("logout_all", logout_all)]);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.send_protected("POST", path, request).await.map(|_| ())
    }

    async fn refresh(&self) -> ApiResult<LoginResponse> {
        let path = "/api/auth/refresh";
        let response = self.send("POST", path, self.client.post(self.url(path))).await?;
        Self::json(response).await
    }

    async fn sessions(&self, token: &str) -> ApiResult<Vec<SessionInfo>> {
        let path = "/api/auth/sessions";
        let request = self.client.get(self.url(path)).bearer_auth(token);
        let response = self.send("GET", path, request).await?;
        Self::json(response).await
    }

    async fn revoke_session(&self, token: &str, session_id: &str) -> ApiResult<()> {
        let path = format!("/api/auth/sessions/{}", session_id);
        let request = self.client.delete(self.url(&path)).bearer_auth(token);
        self.send_protected("DELETE", &path, request)
            .await
            .map(|_| ())
    }

    async fn health(&self) -> ApiResult<()> {
        let path = "/api/auth/health";
        let request = self.client.get(self.url(path)).timeout(self.health_timeout);
        self.send("GET", path, request).await.map(|_| ())
    }
}

#[async_trait]
impl PaymentApi for HttpApi {
    async fn create_checkout_session(
        &self,
        token: &str,
        request: &CheckoutRequest,
    ) -> ApiResult<CheckoutSession> {
        let path = "/api/payment/create-checkout-session";
        let builder = self.client.post(self.url(path)).bearer_auth(token).json(request);
        let response = self.send("POST", path, builder).await?;
        Self::json(response).await
    }

    async fn create_crypto_payment(
        &self,
        token: &str,
        request: &CryptoPaymentRequest,
    ) -> ApiResult<CryptoPayment> {
        let path = "/api/subscription/crypto-payment";
        let builder = self.client.post(self.url(path)).bearer_auth(token).json(request);
        let response = self.send("POST", path, builder).await?;
        Self::json(response).await
    }

    async fn crypto_payment_status(
        &self,
        token: &str,
        payment_id: &str,
    ) -> ApiResult<CryptoPaymentStatus> {
        let path = format!("/api/subscription/crypto-payment-status/{}", payment_id);
        let builder = self.client.get(self.url(&path)).bearer_auth(token);
        let response = self.send("GET", &path, builder).await?;
        Self::json(response).await
    }
}
