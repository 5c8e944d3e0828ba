//! Cart-to-order checkout.
//!
//! Flow: idempotency lookup, cart snapshot, pricing, coupon, payment
//! verification, then one unit of work that reserves stock, writes the
//! order and clears the cart.

pub mod cart_snapshot;
pub mod checkout_orchestrator;
pub mod checkout_service;
pub mod idempotency;
pub mod order_cancellation;
pub mod order_materializer;
pub mod payment_verification;
pub mod pricing_service;
pub mod stock_reservation;

pub use checkout_orchestrator::{CheckoutMode, TransactionOrchestrator, UnitOfWork};
pub use checkout_service::{
    CancellationOutcome, CheckoutOutcome, CheckoutRequest, CheckoutService, CheckoutSettings,
};
pub use payment_verification::{PaymentVerifier, VerifiedPayment};
pub use pricing_service::{compute_totals, resolve_price, OrderTotals, PriceQuote, ShippingPolicy};
