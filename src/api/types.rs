/// Wire records for the auth and payment endpoints
use crate::session::User;
use serde::{Deserialize, Serialize};

/// Body of a successful login / register / telegram / wallet call
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Lifetime of the refresh cookie, seconds
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user: User,
    /// Some deployments return permissions beside the user
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CsrfToken {
    pub csrf_token: String,
}

/// One active login of the current user (`GET /api/auth/sessions`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_activity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub plan_type: String,
    pub billing_period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CryptoPaymentRequest {
    pub plan_id: String,
    pub amount: f64,
    pub currency: String,
    pub billing_period: String,
    /// bitcoin, ethereum or usdt
    pub crypto_type: String,
}

/// Invoice created by `POST /api/subscription/crypto-payment`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CryptoPayment {
    pub payment_id: String,
    pub wallet_address: String,
    pub amount_crypto: f64,
    pub crypto_symbol: String,
    #[serde(default)]
    pub qr_code: Option<String>,
    pub expires_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirming,
    Completed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// No further polling changes the outcome
    pub fn is_final(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Expired)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CryptoPaymentStatus {
    pub status: PaymentStatus,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub confirmations: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_payment_status_is_not_final() {
        let status: CryptoPaymentStatus =
            serde_json::from_value(json!({"status": "refunded"})).unwrap();
        assert_eq!(status.status, PaymentStatus::Unknown);
        assert!(!status.status.is_final());

        let status: CryptoPaymentStatus = serde_json::from_value(json!({
            "status": "completed",
            "subscription_id": "sub_1",
            "confirmations": 6
        }))
        .unwrap();
        assert!(status.status.is_final());
        assert_eq!(status.confirmations, Some(6));
    }

    #[test]
    fn test_login_response_without_permissions() {
        let body = json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 1800,
            "user": {"id": 3, "email": "c@d.com", "subscription_tier": "premium"}
        });
        let parsed: LoginResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.access_token, "jwt");
        assert!(parsed.permissions.is_empty());
        assert_eq!(parsed.user.subscription_tier, "premium");
        assert_eq!(parsed.session_id, None);
    }

    #[test]
    fn test_session_list_parses() {
        let sessions: Vec<SessionInfo> = serde_json::from_value(json!([{
            "session_id": "550e8400-e29b-41d4-a716-446655440000",
            "ip_address": "10.0.0.1",
            "user_agent": "CryptoPilot/1.0",
            "created_at": "2024-05-01T10:00:00",
            "last_activity": "2024-05-01T10:15:00"
        }]))
        .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].ip_address.as_deref(), Some("10.0.0.1"));
    }
}
