//! Card payment confirmations fetched from the gateway.
//!
//! Checkout never trusts what the client says about a payment; it re-reads
//! the confirmation by reference through [`PaymentGateway`].

use async_trait::async_trait;

pub mod http_gateway;

pub use http_gateway::HttpPaymentGateway;

/// Gateway status that means funds were captured.
pub const SUCCEEDED_STATUS: &str = "succeeded";

/// What the gateway reports for one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub transaction_id: String,
    pub status: String,
    /// Captured amount in minor units (cents)
    pub amount_minor: i64,
    pub currency: String,
    /// User id the payment was created for, as recorded in gateway metadata
    pub bound_user_id: Option<String>,
}

impl PaymentConfirmation {
    pub fn is_succeeded(&self) -> bool {
        self.status == SUCCEEDED_STATUS
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("payment {0} not found")]
    NotFound(String),
    #[error("invalid payment reference")]
    InvalidReference,
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway transport error: {0}")]
    Transport(String),
    #[error("payment gateway responded with status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed payment gateway response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn retrieve_confirmation(
        &self,
        reference_id: &str,
    ) -> Result<PaymentConfirmation, GatewayError>;
}

/// Stand-in used when no gateway credentials are configured. Card checkouts fail closed.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn retrieve_confirmation(
        &self,
        _reference_id: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}
