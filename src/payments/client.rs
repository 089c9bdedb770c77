use crate::api::{
    CheckoutRequest, CheckoutSession, CryptoPayment, CryptoPaymentRequest, CryptoPaymentStatus,
    PaymentApi, PaymentStatus,
};
use crate::config::PaymentsConfig;
use crate::errors::{ApiError, ClientError};
use crate::logger::{self, LogTag};
use crate::session::SessionManager;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// How a crypto payment wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { subscription_id: Option<String> },
    Expired,
    /// Still pending after `max_polls` checks
    TimedOut { polls: u32 },
}

pub struct PaymentsClient {
    api: Arc<dyn PaymentApi>,
    config: PaymentsConfig,
}

impl PaymentsClient {
    pub fn new(api: Arc<dyn PaymentApi>, config: PaymentsConfig) -> Self {
        Self { api, config }
    }

    fn token(session: &SessionManager) -> Result<String, ClientError> {
        session.store().token().ok_or(ClientError::MissingToken)
    }

    /// Start a Stripe checkout; the caller opens the returned URL
    pub async fn checkout(
        &self,
        session: &SessionManager,
        plan_type: &str,
        billing_period: &str,
    ) -> Result<CheckoutSession, ClientError> {
        let token = Self::token(session)?;
        let request = CheckoutRequest {
            plan_type: plan_type.to_string(),
            billing_period: billing_period.to_string(),
            success_url: None,
            cancel_url: None,
        };
        let checkout = self
            .api
            .create_checkout_session(&token, &request)
            .await
            .map_err(|e| self.expire_on_unauthorized(session, e))?;
        logger::info(
            LogTag::Payments,
            &format!("Checkout session created for {} ({})", plan_type, billing_period),
        );
        Ok(checkout)
    }

    pub async fn create_crypto_payment(
        &self,
        session: &SessionManager,
        request: &CryptoPaymentRequest,
    ) -> Result<CryptoPayment, ClientError> {
        let token = Self::token(session)?;
        let payment = self
            .api
            .create_crypto_payment(&token, request)
            .await
            .map_err(|e| self.expire_on_unauthorized(session, e))?;
        logger::info(
            LogTag::Payments,
            &format!(
                "Crypto payment {}: send {} {} to {}",
                payment.payment_id, payment.amount_crypto, payment.crypto_symbol, payment.wallet_address
            ),
        );
        Ok(payment)
    }

    /// Poll until the payment completes, expires or `max_polls` run out
    ///
    /// On completion the user's tier is updated to `plan_id` right away;
    /// the next session refresh brings the authoritative record.
    pub async fn wait_for_crypto_payment(
        &self,
        session: &SessionManager,
        payment_id: &str,
        plan_id: &str,
    ) -> Result<PollOutcome, ClientError> {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let max_polls = self.config.max_polls.max(1);

        for poll in 1..=max_polls {
            let token = Self::token(session)?;
            match self.api.crypto_payment_status(&token, payment_id).await {
                Ok(status) => {
                    logger::debug(
                        LogTag::Payments,
                        &format!(
                            "Payment {} poll {}/{}: {:?} ({} confirmations)",
                            payment_id,
                            poll,
                            max_polls,
                            status.status,
                            status.confirmations.unwrap_or(0)
                        ),
                    );
                    if status.status.is_final() {
                        return Ok(self.settle(session, payment_id, plan_id, status));
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    return Err(self.expire_on_unauthorized(session, e));
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Payments,
                        &format!("Status check for {} failed: {}", payment_id, e),
                    );
                }
            }

            if poll < max_polls {
                tokio::time::sleep(interval).await;
            }
        }

        logger::warning(
            LogTag::Payments,
            &format!("Gave up on payment {} after {} checks", payment_id, max_polls),
        );
        Ok(PollOutcome::TimedOut { polls: max_polls })
    }

    /// Apply a final status; only `Completed` touches the session
    fn settle(
        &self,
        session: &SessionManager,
        payment_id: &str,
        plan_id: &str,
        status: CryptoPaymentStatus,
    ) -> PollOutcome {
        if status.status == PaymentStatus::Completed {
            logger::info(
                LogTag::Payments,
                &format!("Payment {} completed, plan {}", payment_id, plan_id),
            );
            session.update_user(json!({ "subscription_tier": plan_id }));
            PollOutcome::Completed {
                subscription_id: status.subscription_id,
            }
        } else {
            logger::warning(
                LogTag::Payments,
                &format!("Payment {} expired", payment_id),
            );
            PollOutcome::Expired
        }
    }

    fn expire_on_unauthorized(&self, session: &SessionManager, err: ApiError) -> ClientError {
        if err.is_unauthorized() {
            session.handle_token_expired();
        }
        err.into()
    }
}
