use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::AppState;
use crate::db;
use crate::repositories::CheckoutStorage;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentStatus>,
    pub transaction_policy: String,
}

pub async fn health<S>(State(state): State<Arc<AppState<S>>>) -> Response
where
    S: CheckoutStorage,
{
    let database = match &state.db {
        Some(pool) => Some(match db::check_connection(pool).await {
            Ok(()) => ComponentStatus::Up,
            Err(_) => ComponentStatus::Down,
        }),
        None => None,
    };
    let healthy = !matches!(database, Some(ComponentStatus::Down));

    let body = HealthResponse {
        status: if healthy {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0),
        database,
        transaction_policy: format!("{:?}", state.checkout.settings().transaction_policy)
            .to_lowercase(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
