use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::OrderStatus;

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Stable machine-readable code, e.g. `insufficient_stock`
    pub code: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Which uniqueness guarantee a rejected insert ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    IdempotencyKey,
    TransactionId,
    Other,
}

/// Failures raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend cannot open multi-statement transactions on this topology.
    #[error("transactions not supported: {0}")]
    TransactionUnsupported(String),

    #[error("unique constraint violated ({constraint:?}): {message}")]
    UniqueViolation {
        constraint: UniqueConstraint,
        message: String,
    },

    /// Serialization failure, deadlock or lock timeout; the transaction was rolled back.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[source] DbErr),
}

/// Substrings that backends use to say multi-document transactions are unavailable.
const TRANSACTION_UNSUPPORTED_SIGNATURES: [&str; 4] = [
    "transaction numbers are only allowed on a replica set member or mongos",
    "transactions are not supported",
    "does not support transactions",
    "not supported on this topology",
];

const CONFLICT_SIGNATURES: [&str; 4] = [
    "could not serialize access",
    "deadlock detected",
    "database is locked",
    "lock timeout",
];

impl StorageError {
    /// Classifies a raw sea-orm error into the storage taxonomy.
    pub fn from_db(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
            return StorageError::UniqueViolation {
                constraint: classify_constraint(&message),
                message,
            };
        }

        let lower = err.to_string().to_ascii_lowercase();
        if TRANSACTION_UNSUPPORTED_SIGNATURES
            .iter()
            .any(|sig| lower.contains(sig))
        {
            return StorageError::TransactionUnsupported(err.to_string());
        }
        if CONFLICT_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            return StorageError::Conflict(err.to_string());
        }
        StorageError::Database(err)
    }

    /// Whether retrying from a fresh transaction can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

impl From<DbErr> for StorageError {
    fn from(err: DbErr) -> Self {
        StorageError::from_db(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

fn classify_constraint(message: &str) -> UniqueConstraint {
    let lower = message.to_ascii_lowercase();
    if lower.contains("idempotency") {
        UniqueConstraint::IdempotencyKey
    } else if lower.contains("transaction_id") {
        UniqueConstraint::TransactionId
    } else {
        UniqueConstraint::Other
    }
}

/// Why a product/variant selection could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("a variant must be selected")]
    VariantRequired,
    #[error("variant {0} does not belong to this product")]
    UnknownVariant(Uuid),
    #[error("product does not offer variants")]
    VariantsNotSupported,
    #[error("selection is not active")]
    Inactive,
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),
}

/// A reservation that stayed applied after a non-transactional checkout failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrandedReservation {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {product_id} is unavailable")]
    ProductUnavailable { product_id: Uuid },

    #[error("Invalid selection for product {product_id}: {reason}")]
    InvalidSelection {
        product_id: Uuid,
        reason: SelectionError,
    },

    #[error("Insufficient stock for {product_title}")]
    InsufficientStock { product_title: String },

    #[error("Payment is not complete (status: {status})")]
    PaymentIncomplete { status: String },

    #[error("Payment does not belong to this user")]
    PaymentOwnershipMismatch,

    #[error("Payment currency {actual} does not match {expected}")]
    InvalidCurrency { expected: String, actual: String },

    #[error("Payment amount {captured_minor} does not match order total {expected_minor}")]
    AmountMismatch {
        expected_minor: i64,
        captured_minor: i64,
    },

    #[error("Payment {transaction_id} has already been used for another order")]
    DuplicatePayment { transaction_id: String },

    #[error("Coupon {code} rejected: {reason}")]
    CouponRejected { code: String, reason: String },

    #[error("Payment gateway unavailable: {0}")]
    PaymentGatewayUnavailable(String),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order {order_id} cannot be cancelled from status {status:?}")]
    InvalidOrderState { order_id: Uuid, status: OrderStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Degraded-mode failure after some lines were already decremented.
    #[error("{cause} ({} reservations left applied)", .stranded.len())]
    StrandedReservations {
        cause: Box<CheckoutError>,
        stranded: Vec<StrandedReservation>,
    },

    /// Internal signal that triggers the non-transactional path.
    #[error("Transactions unsupported: {0}")]
    TransactionUnsupported(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[source] StorageError),
}

impl From<StorageError> for CheckoutError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TransactionUnsupported(msg) => CheckoutError::TransactionUnsupported(msg),
            other => CheckoutError::StorageFailure(other),
        }
    }
}

impl From<validator::ValidationErrors> for CheckoutError {
    fn from(err: validator::ValidationErrors) -> Self {
        CheckoutError::Validation(err.to_string())
    }
}

impl CheckoutError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::ProductUnavailable { .. } => "product_unavailable",
            Self::InvalidSelection { .. } => "invalid_selection",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::PaymentIncomplete { .. } => "payment_incomplete",
            Self::PaymentOwnershipMismatch => "payment_ownership_mismatch",
            Self::InvalidCurrency { .. } => "invalid_currency",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::DuplicatePayment { .. } => "duplicate_payment",
            Self::CouponRejected { .. } => "coupon_rejected",
            Self::PaymentGatewayUnavailable(_) => "payment_gateway_unavailable",
            Self::OrderNotFound(_) => "order_not_found",
            Self::InvalidOrderState { .. } => "invalid_order_state",
            Self::Validation(_) => "validation_error",
            Self::StrandedReservations { cause, .. } => cause.code(),
            Self::TransactionUnsupported(_) | Self::StorageFailure(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyCart
            | Self::InvalidSelection { .. }
            | Self::InvalidCurrency { .. }
            | Self::CouponRejected { .. }
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ProductUnavailable { .. } | Self::InsufficientStock { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PaymentIncomplete { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentOwnershipMismatch => StatusCode::FORBIDDEN,
            Self::AmountMismatch { .. }
            | Self::DuplicatePayment { .. }
            | Self::InvalidOrderState { .. } => StatusCode::CONFLICT,
            Self::PaymentGatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::StrandedReservations { cause, .. } => cause.status_code(),
            Self::TransactionUnsupported(_) | Self::StorageFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Storage details are not leaked.
    pub fn response_message(&self) -> String {
        match self {
            Self::TransactionUnsupported(_) | Self::StorageFailure(_) => {
                "Internal server error".to_string()
            }
            Self::StrandedReservations { cause, .. } => cause.response_message(),
            _ => self.to_string(),
        }
    }

    /// The error that actually stopped the checkout, looking through degraded-mode wrappers.
    pub fn root(&self) -> &CheckoutError {
        match self {
            Self::StrandedReservations { cause, .. } => cause.root(),
            other => other,
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
