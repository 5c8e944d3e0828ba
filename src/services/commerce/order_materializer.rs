use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::cart_snapshot::QuotedLine;
use super::payment_verification::VerifiedPayment;
use super::pricing_service::OrderTotals;
use crate::db::TransactionContext;
use crate::errors::{CheckoutError, StorageError, UniqueConstraint};
use crate::models::order::generate_order_number;
use crate::models::{Order, OrderLine, OrderStatus, PaymentMethod, ShippingContact};
use crate::money::to_minor_units;
use crate::repositories::{CartStore, OrderStore};

/// Everything an order is built from, already validated and priced.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub lines: Vec<QuotedLine>,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment: VerifiedPayment,
    pub shipping: ShippingContact,
    pub idempotency_key: Option<String>,
}

impl OrderDraft {
    /// Builds the immutable order document. Line data is copied, never referenced.
    pub fn build(&self, now: DateTime<Utc>) -> Order {
        let lines = self
            .lines
            .iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                variant_id: line.quote.resolved_variant_id,
                title: line.quote.title.clone(),
                sku: line.quote.sku.clone(),
                unit_price: line.quote.unit_price,
                quantity: line.quantity,
                line_amount: line.line_amount(),
                image: line.quote.image.clone(),
            })
            .collect();

        Order {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            user_id: self.user_id,
            lines,
            subtotal: self.totals.subtotal,
            shipping_cost: self.totals.shipping_cost,
            discount: self.totals.discount,
            coupon_code: self.coupon_code.clone(),
            total_amount: self.totals.total,
            currency: self.currency.to_uppercase(),
            payment_method: self.payment_method,
            payment_status: self.payment.payment_status,
            transaction_id: self.payment.transaction_id.clone(),
            idempotency_key: self.idempotency_key.clone(),
            status: OrderStatus::New,
            shipping: self.shipping.clone(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }
}

/// Persists the order and empties the cart in the given context.
#[instrument(skip_all, fields(order_id = %order.id, user_id = %order.user_id))]
pub async fn materialize<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    order: Order,
    payment: &VerifiedPayment,
) -> Result<Order, CheckoutError>
where
    S: CartStore + OrderStore + ?Sized,
{
    if let Some(captured_minor) = payment.captured_minor {
        let expected_minor = to_minor_units(order.total_amount).ok_or_else(|| {
            CheckoutError::Validation("order total is out of range".to_string())
        })?;
        if expected_minor != captured_minor {
            return Err(CheckoutError::AmountMismatch {
                expected_minor,
                captured_minor,
            });
        }
    }

    let user_id = order.user_id;
    let order = storage.insert(ctx, order).await.map_err(|err| match err {
        StorageError::UniqueViolation {
            constraint: UniqueConstraint::TransactionId,
            ..
        } => CheckoutError::DuplicatePayment {
            transaction_id: payment.transaction_id.clone().unwrap_or_default(),
        },
        other => CheckoutError::from(other),
    })?;

    let removed = storage.delete_all(ctx, user_id).await?;
    debug!(removed, "Cleared cart");

    info!(
        order_number = %order.order_number,
        total = %order.total_amount,
        "Order materialized"
    );
    Ok(order)
}
