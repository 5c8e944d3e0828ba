use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{GatewayError, PaymentConfirmation, PaymentGateway};
use crate::config::AppConfig;

/// Payment-intent response body. Only the fields checkout reads.
#[derive(Debug, Deserialize)]
struct PaymentIntentBody {
    id: String,
    status: String,
    #[serde(default)]
    amount_received: i64,
    currency: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<PaymentIntentBody> for PaymentConfirmation {
    fn from(body: PaymentIntentBody) -> Self {
        let bound_user_id = body.metadata.get("user_id").cloned();
        Self {
            transaction_id: body.id,
            status: body.status,
            amount_minor: body.amount_received,
            currency: body.currency,
            bound_user_id,
        }
    }
}

/// Reads payment intents over HTTPS with a bearer secret.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    /// `None` when the gateway URL or secret is missing.
    pub fn from_config(cfg: &AppConfig) -> Result<Option<Self>, GatewayError> {
        match (&cfg.payment_gateway_url, &cfg.payment_gateway_secret) {
            (Some(url), Some(secret)) => Self::new(
                url.clone(),
                secret.clone(),
                Duration::from_secs(cfg.payment_gateway_timeout_secs),
            )
            .map(Some),
            _ => Ok(None),
        }
    }
}

fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 255
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn retrieve_confirmation(
        &self,
        reference_id: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        if !is_valid_reference(reference_id) {
            return Err(GatewayError::InvalidReference);
        }

        let url = format!("{}/v1/payment_intents/{}", self.base_url, reference_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret)
            .send()
            .await
            .map_err(|e| {
                warn!("Payment gateway request failed: {}", e);
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(reference_id.to_string()));
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedStatus(status.as_u16()));
        }

        let body: PaymentIntentBody = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        debug!(status = %body.status, amount = body.amount_received, "Payment intent retrieved");

        Ok(body.into())
    }
}
