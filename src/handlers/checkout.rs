use axum::{
    extract::{Json, State},
    response::Response,
};
use std::sync::Arc;

use super::common::{created_response, success_response, AuthenticatedUser};
use super::AppState;
use crate::errors::CheckoutError;
use crate::repositories::CheckoutStorage;
use crate::services::commerce::CheckoutRequest;

/// Places an order from the caller's cart.
///
/// Returns 201 for a new order and 200 when the idempotency key matched an
/// existing one.
pub async fn create_checkout<S>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, CheckoutError>
where
    S: CheckoutStorage,
{
    let outcome = state.checkout.checkout(user_id, request).await?;
    if outcome.already_exists {
        Ok(success_response(outcome))
    } else {
        Ok(created_response(outcome))
    }
}
