/// Backend HTTP capability
///
/// The session manager and the payment poller only see these traits, so
/// tests substitute scripted fakes and the CLI plugs in `HttpApi`.
mod http;
mod types;

pub use http::HttpApi;
pub use types::{
    CheckoutRequest, CheckoutSession, CryptoPayment, CryptoPaymentRequest, CryptoPaymentStatus,
    LoginResponse, PaymentStatus, SessionInfo,
};

use crate::errors::ApiError;
use crate::session::{Credentials, RegisterData, User};
use async_trait::async_trait;

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `GET /api/auth/me`
    async fn current_user(&self, token: &str) -> ApiResult<User>;

    /// Password, Telegram or wallet login depending on the credentials
    async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse>;

    async fn register(&self, data: &RegisterData) -> ApiResult<LoginResponse>;

    async fn logout(&self, token: Option<&str>, logout_all: bool) -> ApiResult<()>;

    /// Rotate the access token using the refresh cookie from the last login
    async fn refresh(&self) -> ApiResult<LoginResponse>;

    /// Active logins of the current user
    async fn sessions(&self, token: &str) -> ApiResult<Vec<SessionInfo>>;

    async fn revoke_session(&self, token: &str, session_id: &str) -> ApiResult<()>;

    /// Reachability probe; any 2xx counts
    async fn health(&self) -> ApiResult<()>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn create_checkout_session(
        &self,
        token: &str,
        request: &CheckoutRequest,
    ) -> ApiResult<CheckoutSession>;

    async fn create_crypto_payment(
        &self,
        token: &str,
        request: &CryptoPaymentRequest,
    ) -> ApiResult<CryptoPayment>;

    async fn crypto_payment_status(
        &self,
        token: &str,
        payment_id: &str,
    ) -> ApiResult<CryptoPaymentStatus>;
}
