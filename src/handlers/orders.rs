use axum::{
    extract::{Path, State},
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use super::common::{success_response, AuthenticatedUser};
use super::AppState;
use crate::errors::CheckoutError;
use crate::repositories::CheckoutStorage;

pub async fn get_order<S>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Response, CheckoutError>
where
    S: CheckoutStorage,
{
    let order = state.checkout.get_order(user_id, order_id).await?;
    Ok(success_response(order))
}

/// Cancels one of the caller's orders and restores its stock.
pub async fn cancel_order<S>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Response, CheckoutError>
where
    S: CheckoutStorage,
{
    let outcome = state
        .checkout
        .cancel_order(order_id, Some(user_id))
        .await?;
    Ok(success_response(outcome))
}
