use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::TransactionContext;
use crate::errors::CheckoutError;
use crate::models::{PaymentMethod, PaymentStatus};
use crate::money::to_minor_units;
use crate::repositories::OrderStore;
use crate::services::payment_gateway::{GatewayError, PaymentGateway};

/// Payment facts the order is materialized with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    /// Amount the gateway captured, for card payments
    pub captured_minor: Option<i64>,
}

impl VerifiedPayment {
    pub fn unpaid() -> Self {
        Self {
            payment_status: PaymentStatus::Unpaid,
            transaction_id: None,
            captured_minor: None,
        }
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => CheckoutError::PaymentIncomplete {
                status: "not_found".to_string(),
            },
            GatewayError::InvalidReference => CheckoutError::PaymentIncomplete {
                status: "invalid_reference".to_string(),
            },
            other => CheckoutError::PaymentGatewayUnavailable(other.to_string()),
        }
    }
}

/// Re-reads gateway confirmations and binds them to the user and the cart total.
#[derive(Clone)]
pub struct PaymentVerifier {
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl PaymentVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>, currency: impl Into<String>) -> Self {
        Self {
            gateway,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Checks, in order: captured status, ownership, currency, amount, and
    /// that no order already uses the transaction. Fails on the first miss.
    #[instrument(skip(self, storage, expected_total), fields(user_id = %user_id, method = ?method))]
    pub async fn verify<S>(
        &self,
        storage: &S,
        user_id: Uuid,
        method: PaymentMethod,
        reference: Option<&str>,
        expected_total: Decimal,
    ) -> Result<VerifiedPayment, CheckoutError>
    where
        S: OrderStore + ?Sized,
    {
        if !method.requires_gateway_confirmation() {
            return Ok(VerifiedPayment::unpaid());
        }

        let reference = match reference.map(str::trim) {
            Some(reference) if !reference.is_empty() => reference,
            _ => {
                return Err(CheckoutError::PaymentIncomplete {
                    status: "missing_reference".to_string(),
                })
            }
        };

        let confirmation = self.gateway.retrieve_confirmation(reference).await?;

        if !confirmation.is_succeeded() {
            return Err(CheckoutError::PaymentIncomplete {
                status: confirmation.status,
            });
        }

        let owner = user_id.to_string();
        let bound_to_user = confirmation
            .bound_user_id
            .as_deref()
            .map(|bound| bound.eq_ignore_ascii_case(&owner))
            .unwrap_or(false);
        if !bound_to_user {
            warn!(
                transaction_id = %confirmation.transaction_id,
                "Payment confirmation bound to a different user"
            );
            return Err(CheckoutError::PaymentOwnershipMismatch);
        }

        if !confirmation.currency.eq_ignore_ascii_case(&self.currency) {
            return Err(CheckoutError::InvalidCurrency {
                expected: self.currency.clone(),
                actual: confirmation.currency,
            });
        }

        let expected_minor = to_minor_units(expected_total).ok_or_else(|| {
            CheckoutError::Validation("order total is out of range".to_string())
        })?;
        if confirmation.amount_minor != expected_minor {
            warn!(
                expected_minor,
                captured_minor = confirmation.amount_minor,
                "Captured amount does not match recomputed cart total"
            );
            return Err(CheckoutError::AmountMismatch {
                expected_minor,
                captured_minor: confirmation.amount_minor,
            });
        }

        let mut ctx = TransactionContext::Detached;
        if storage
            .find_by_transaction_id(&mut ctx, &confirmation.transaction_id)
            .await?
            .is_some()
        {
            return Err(CheckoutError::DuplicatePayment {
                transaction_id: confirmation.transaction_id,
            });
        }

        info!(
            transaction_id = %confirmation.transaction_id,
            amount_minor = confirmation.amount_minor,
            "Payment verified"
        );

        Ok(VerifiedPayment {
            payment_status: PaymentStatus::Paid,
            transaction_id: Some(confirmation.transaction_id),
            captured_minor: Some(confirmation.amount_minor),
        })
    }
}
