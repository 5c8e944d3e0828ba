use tracing::info;
use uuid::Uuid;

use crate::db::TransactionContext;
use crate::errors::CheckoutError;
use crate::models::Order;
use crate::repositories::OrderStore;

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Trims the client key. Blank keys count as absent.
pub fn normalize_key(key: Option<&str>) -> Result<Option<String>, CheckoutError> {
    match key.map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(CheckoutError::Validation(
            format!(
                "idempotency key must be at most {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            ),
        )),
        Some(key) => Ok(Some(key.to_string())),
    }
}

/// The order already created for `(user_id, key)`, if any. Without a key nothing is looked up.
pub async fn find_existing<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    user_id: Uuid,
    key: Option<&str>,
) -> Result<Option<Order>, CheckoutError>
where
    S: OrderStore + ?Sized,
{
    let Some(key) = key else {
        return Ok(None);
    };

    let existing = storage.find_by_idempotency_key(ctx, user_id, key).await?;
    if let Some(order) = &existing {
        info!(
            %user_id,
            order_id = %order.id,
            "Idempotency key matched an existing order"
        );
    }
    Ok(existing)
}
