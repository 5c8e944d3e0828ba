//! HTTP surface for checkout.

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::repositories::CheckoutStorage;
use crate::services::commerce::CheckoutService;

pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;

pub struct AppState<S> {
    pub checkout: CheckoutService<S>,
    /// Pool pinged by the health endpoint. `None` for storage without a database.
    pub db: Option<Arc<DatabaseConnection>>,
}

impl<S> AppState<S> {
    pub fn new(checkout: CheckoutService<S>, db: Option<Arc<DatabaseConnection>>) -> Self {
        Self { checkout, db }
    }
}

/// Builds the application router.
pub fn app_router<S>(state: AppState<S>) -> Router
where
    S: CheckoutStorage,
{
    let api = Router::new()
        .route("/checkout", post(checkout::create_checkout::<S>))
        .route("/orders/:id", get(orders::get_order::<S>))
        .route("/orders/:id/cancel", post(orders::cancel_order::<S>));

    Router::new()
        .route("/health", get(health::health::<S>))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
