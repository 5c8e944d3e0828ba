use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkout_orchestrator::UnitOfWork;
use crate::db::TransactionContext;
use crate::errors::CheckoutError;
use crate::models::{Order, OrderStatus};
use crate::repositories::CheckoutStorage;

const CANCELLABLE: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

/// Cancels an order and puts its quantities back on the shelf.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: Uuid,
    /// Owner check for user-initiated cancellation. `None` for fulfillment-side cancels.
    pub requested_by: Option<Uuid>,
}

#[async_trait]
impl<S> UnitOfWork<S> for CancelOrder
where
    S: CheckoutStorage,
{
    type Output = Order;

    async fn run(
        &self,
        storage: &S,
        ctx: &mut TransactionContext<'_, S::Session>,
    ) -> Result<Order, CheckoutError> {
        let order = storage
            .find_by_id(ctx, self.order_id)
            .await?
            .filter(|o| self.requested_by.map_or(true, |user| o.user_id == user))
            .ok_or(CheckoutError::OrderNotFound(self.order_id))?;

        if !order.status.is_cancellable() {
            return Err(CheckoutError::InvalidOrderState {
                order_id: order.id,
                status: order.status,
            });
        }

        let now = Utc::now();
        let transitioned = storage
            .transition_status(ctx, order.id, &CANCELLABLE, OrderStatus::Cancelled, now)
            .await?;
        if !transitioned {
            // Another request moved the order first.
            let status = storage
                .find_by_id(ctx, order.id)
                .await?
                .map(|o| o.status)
                .unwrap_or(order.status);
            return Err(CheckoutError::InvalidOrderState {
                order_id: order.id,
                status,
            });
        }

        for line in &order.lines {
            match storage
                .conditional_increment(ctx, line.product_id, line.variant_id, line.quantity)
                .await?
            {
                Some(record) => debug!(
                    product_id = %line.product_id,
                    variant_id = ?line.variant_id,
                    restored = line.quantity,
                    stock = record.stock,
                    "Restored stock"
                ),
                None => warn!(
                    product_id = %line.product_id,
                    variant_id = ?line.variant_id,
                    quantity = line.quantity,
                    "Catalog record missing, stock not restored"
                ),
            }
        }

        info!(order_id = %order.id, "Order cancelled");
        Ok(Order {
            status: OrderStatus::Cancelled,
            updated_at: now,
            cancelled_at: Some(now),
            ..order
        })
    }
}
