mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{captured, card_request, cod_request, Harness};
use rust_decimal_macros::dec;
use stateset_checkout::config::TransactionPolicy;
use stateset_checkout::errors::{CheckoutError, SelectionError, StrandedReservation};
use stateset_checkout::events::{Event, EventSender};
use stateset_checkout::models::{OrderStatus, PaymentStatus, ProductStatus};
use stateset_checkout::repositories::InMemoryStore;
use stateset_checkout::services::commerce::{CheckoutMode, CheckoutService, CheckoutSettings};
use stateset_checkout::services::coupons::{
    CouponKind, CouponRule, NoCoupons, StaticCouponValidator,
};
use stateset_checkout::services::payment_gateway::{
    GatewayError, PaymentConfirmation, PaymentGateway,
};
use tokio::sync::mpsc;
use uuid::Uuid;

#[tokio::test]
async fn checkout_reserves_stock_and_totals_with_shipping() {
    let mut h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let outcome = h.service.checkout(user, cod_request(None)).await.unwrap();

    assert!(!outcome.already_exists);
    assert_eq!(outcome.mode, Some(CheckoutMode::Transactional));
    let order = &outcome.order;
    assert_eq!(order.subtotal, dec!(30.00));
    assert_eq!(order.shipping_cost, dec!(10.00));
    assert_eq!(order.total_amount, dec!(40.00));
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 3);
    assert_eq!(order.lines[0].line_amount, dec!(30.00));

    assert_eq!(h.stock(mug).await, 2);
    assert!(h.store.cart_lines(user).await.is_empty());
    assert_matches!(
        h.drain_events().as_slice(),
        [Event::OrderCreated { mode: CheckoutMode::Transactional, .. }]
    );
}

#[tokio::test]
async fn insufficient_stock_leaves_stock_and_cart_untouched() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 2).await;
    h.add_to_cart(user, mug, None, 3).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();

    assert_matches!(err, CheckoutError::InsufficientStock { ref product_title } if product_title == "Mug");
    assert_eq!(err.code(), "insufficient_stock");
    assert_eq!(h.stock(mug).await, 2);
    assert_eq!(h.store.cart_lines(user).await.len(), 1);
    assert!(h.store.orders().await.is_empty());
}

#[tokio::test]
async fn free_shipping_from_threshold() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let chair = h.product("Chair", dec!(50.00), 4).await;
    h.add_to_cart(user, chair, None, 2).await;

    let order = h.service.checkout(user, cod_request(None)).await.unwrap().order;
    assert_eq!(order.shipping_cost, dec!(0));
    assert_eq!(order.total_amount, dec!(100.00));
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let h = Harness::new();
    let err = h
        .service
        .checkout(Uuid::new_v4(), cod_request(None))
        .await
        .unwrap_err();
    assert_matches!(err, CheckoutError::EmptyCart);
}

#[tokio::test]
async fn inactive_product_is_unavailable() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.store
        .update_product(mug, |p| p.status = ProductStatus::Inactive)
        .await;
    h.add_to_cart(user, mug, None, 1).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::ProductUnavailable { product_id } if product_id == mug);
    assert_eq!(h.stock(mug).await, 5);
}

#[tokio::test]
async fn non_positive_line_quantity_is_rejected_before_reserving() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let lamp = h.product("Lamp", dec!(10.00), 5).await;
    h.add_to_cart(user, lamp, None, -3).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();
    assert_matches!(
        err,
        CheckoutError::InvalidSelection {
            product_id,
            reason: SelectionError::InvalidQuantity(-3),
        } if product_id == lamp
    );
    assert_eq!(h.stock(lamp).await, 5);
    assert_eq!(h.store.cart_lines(user).await.len(), 1);
}

#[tokio::test]
async fn variant_lines_reserve_variant_stock() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let shirt = h.product("Shirt", dec!(20.00), 0).await;
    h.store.update_product(shirt, |p| p.has_variants = true).await;
    let large = h.variant(shirt, "Large", dec!(25.00), 4).await;
    h.add_to_cart(user, shirt, Some(large), 2).await;

    let order = h.service.checkout(user, cod_request(None)).await.unwrap().order;
    assert_eq!(order.lines[0].variant_id, Some(large));
    assert_eq!(order.lines[0].title, "Shirt - Large");
    assert_eq!(order.lines[0].unit_price, dec!(25.00));
    assert_eq!(h.store.stock_of(shirt, Some(large)).await, Some(2));
}

#[tokio::test]
async fn variant_product_without_selection_is_invalid() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let shirt = h.product("Shirt", dec!(20.00), 0).await;
    h.store.update_product(shirt, |p| p.has_variants = true).await;
    h.variant(shirt, "Large", dec!(25.00), 4).await;
    h.add_to_cart(user, shirt, None, 1).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();
    assert_matches!(
        err,
        CheckoutError::InvalidSelection {
            reason: SelectionError::VariantRequired,
            ..
        }
    );
}

#[tokio::test]
async fn replay_with_same_key_returns_first_order() {
    let mut h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let first = h
        .service
        .checkout(user, cod_request(Some("retry-1")))
        .await
        .unwrap();
    let second = h
        .service
        .checkout(user, cod_request(Some("retry-1")))
        .await
        .unwrap();

    assert!(!first.already_exists);
    assert!(second.already_exists);
    assert_eq!(second.mode, None);
    assert_eq!(first.order.id, second.order.id);
    assert_eq!(h.stock(mug).await, 2);
    assert_eq!(h.store.orders().await.len(), 1);

    let events = h.drain_events();
    assert_matches!(events.last(), Some(Event::OrderReplayed { order_id, .. }) if *order_id == first.order.id);
}

#[tokio::test]
async fn retry_that_finds_cart_already_cleared_replays_the_order() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 1).await;

    let first = h
        .service
        .checkout(user, cod_request(Some("retry-2")))
        .await
        .unwrap();

    // The retry's first key lookup misses, then it sees the emptied cart.
    h.store.serve_stale_key_lookups(1);
    let second = h
        .service
        .checkout(user, cod_request(Some("retry-2")))
        .await
        .unwrap();

    assert!(second.already_exists);
    assert_eq!(second.order.id, first.order.id);
    assert_eq!(h.stock(mug).await, 4);
}

#[tokio::test]
async fn empty_cart_without_matching_key_is_still_rejected() {
    let h = Harness::new();
    let err = h
        .service
        .checkout(Uuid::new_v4(), cod_request(Some("never-used")))
        .await
        .unwrap_err();
    assert_matches!(err, CheckoutError::EmptyCart);
}

#[tokio::test]
async fn idempotency_keys_are_scoped_per_user() {
    let h = Harness::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(alice, mug, None, 1).await;
    h.add_to_cart(bob, mug, None, 1).await;

    let a = h.service.checkout(alice, cod_request(Some("k"))).await.unwrap();
    let b = h.service.checkout(bob, cod_request(Some("k"))).await.unwrap();

    assert!(!b.already_exists);
    assert_ne!(a.order.id, b.order.id);
    assert_eq!(h.stock(mug).await, 3);
}

#[tokio::test]
async fn oversized_idempotency_key_is_rejected() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 1).await;

    let key = "k".repeat(256);
    let err = h
        .service
        .checkout(user, cod_request(Some(&key)))
        .await
        .unwrap_err();
    assert_matches!(err, CheckoutError::Validation(_));
    assert_eq!(h.stock(mug).await, 5);
}

#[tokio::test]
async fn card_payment_is_bound_to_the_cart_total() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;
    h.gateway.insert(captured("pi_short", user, 3999));

    let err = h
        .service
        .checkout(user, card_request("pi_short", None))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        CheckoutError::AmountMismatch {
            expected_minor: 4000,
            captured_minor: 3999
        }
    );
    assert_eq!(h.stock(mug).await, 5);
    assert!(h.store.orders().await.is_empty());
}

/// Serves one captured payment and raises a product price while doing so,
/// so the catalog changes between pricing and the order write.
struct RepricingGateway {
    store: Arc<InMemoryStore>,
    product_id: Uuid,
    new_price: rust_decimal::Decimal,
    confirmation: PaymentConfirmation,
}

#[async_trait]
impl PaymentGateway for RepricingGateway {
    async fn retrieve_confirmation(
        &self,
        _reference_id: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let price = self.new_price;
        self.store
            .update_product(self.product_id, |p| p.base_price = price)
            .await;
        Ok(self.confirmation.clone())
    }
}

#[tokio::test]
async fn price_change_during_checkout_fails_amount_check_and_rolls_back() {
    let store = Arc::new(InMemoryStore::new());
    let user = Uuid::new_v4();
    let mug = common::product("Mug", dec!(10.00), 5);
    let mug_id = mug.id;
    store.put_product(mug).await;

    let gateway = Arc::new(RepricingGateway {
        store: store.clone(),
        product_id: mug_id,
        new_price: dec!(12.00),
        confirmation: captured("pi_repriced", user, 4000),
    });
    let (tx, _rx) = mpsc::channel(16);
    let service = CheckoutService::new(
        store.clone(),
        gateway,
        Arc::new(NoCoupons),
        CheckoutSettings::default(),
        EventSender::new(tx),
    );
    store
        .add_cart_line(common::cart_line(user, mug_id, None, 3, dec!(10.00)))
        .await;

    let err = service
        .checkout(user, card_request("pi_repriced", None))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        CheckoutError::AmountMismatch {
            expected_minor: 4600,
            captured_minor: 4000
        }
    );
    assert_eq!(store.stock_of(mug_id, None).await, Some(5));
    assert!(store.orders().await.is_empty());
    assert_eq!(store.cart_lines(user).await.len(), 1);
}

#[tokio::test]
async fn matching_card_payment_marks_order_paid() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;
    h.gateway.insert(captured("pi_ok", user, 4000));

    let order = h
        .service
        .checkout(user, card_request("pi_ok", None))
        .await
        .unwrap()
        .order;

    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.transaction_id.as_deref(), Some("pi_ok"));
}

#[tokio::test]
async fn payment_checks_fail_in_order() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 50).await;
    h.add_to_cart(user, mug, None, 3).await;

    // Pending, wrong owner, wrong currency, wrong amount: status wins.
    let mut confirmation = captured("pi_a", Uuid::new_v4(), 1);
    confirmation.status = "requires_capture".into();
    confirmation.currency = "eur".into();
    h.gateway.insert(confirmation);
    let err = h.service.checkout(user, card_request("pi_a", None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::PaymentIncomplete { ref status } if status == "requires_capture");

    // Wrong owner, wrong currency: ownership wins.
    let mut confirmation = captured("pi_b", Uuid::new_v4(), 1);
    confirmation.currency = "eur".into();
    h.gateway.insert(confirmation);
    let err = h.service.checkout(user, card_request("pi_b", None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::PaymentOwnershipMismatch);

    // Wrong currency, wrong amount: currency wins.
    let mut confirmation = captured("pi_c", user, 1);
    confirmation.currency = "eur".into();
    h.gateway.insert(confirmation);
    let err = h.service.checkout(user, card_request("pi_c", None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::InvalidCurrency { .. });

    let err = h
        .service
        .checkout(user, card_request("pi_unknown", None))
        .await
        .unwrap_err();
    assert_matches!(err, CheckoutError::PaymentIncomplete { .. });

    assert_eq!(h.stock(mug).await, 50);
}

#[tokio::test]
async fn card_checkout_without_reference_is_incomplete() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 1).await;

    let mut request = card_request("unused", None);
    request.payment_reference = None;
    let err = h.service.checkout(user, request).await.unwrap_err();
    assert_matches!(err, CheckoutError::PaymentIncomplete { ref status } if status == "missing_reference");
}

#[tokio::test]
async fn one_payment_cannot_pay_for_two_orders() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 10).await;
    h.gateway.insert(captured("pi_once", user, 2000));

    h.add_to_cart(user, mug, None, 1).await;
    h.service
        .checkout(user, card_request("pi_once", Some("first")))
        .await
        .unwrap();

    h.add_to_cart(user, mug, None, 1).await;
    let err = h
        .service
        .checkout(user, card_request("pi_once", Some("second")))
        .await
        .unwrap_err();

    assert_matches!(err, CheckoutError::DuplicatePayment { ref transaction_id } if transaction_id == "pi_once");
    assert_eq!(h.stock(mug).await, 9);
}

#[tokio::test]
async fn coupon_discount_reduces_total() {
    let coupons = StaticCouponValidator::new().with_rule(
        "SAVE10",
        CouponRule {
            kind: CouponKind::Percentage(dec!(10)),
            min_order_amount: None,
            max_discount_amount: None,
        },
    );
    let h = Harness::build(
        InMemoryStore::new(),
        TransactionPolicy::Auto,
        Arc::new(coupons),
    );
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let mut request = cod_request(None);
    request.coupon_code = Some("save10".into());
    let order = h.service.checkout(user, request).await.unwrap().order;

    assert_eq!(order.discount, dec!(3.00));
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));
    assert_eq!(order.total_amount, dec!(37.00));
}

#[tokio::test]
async fn rejected_coupon_fails_before_reserving() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 1).await;

    let mut request = cod_request(None);
    request.coupon_code = Some("BOGUS".into());
    let err = h.service.checkout(user, request).await.unwrap_err();
    assert_matches!(err, CheckoutError::CouponRejected { .. });
    assert_eq!(h.stock(mug).await, 5);
}

#[tokio::test]
async fn order_lines_keep_checkout_time_values() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 2).await;
    let order_id = h.service.checkout(user, cod_request(None)).await.unwrap().order.id;

    h.store
        .update_product(mug, |p| {
            p.title = "Renamed Mug".into();
            p.base_price = dec!(99.00);
        })
        .await;

    let order = h.service.get_order(user, order_id).await.unwrap();
    assert_eq!(order.lines[0].title, "Mug");
    assert_eq!(order.lines[0].unit_price, dec!(10.00));
    assert_eq!(order.total_amount, dec!(30.00));
}

#[tokio::test]
async fn failed_line_rolls_back_earlier_reservations() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    let lamp = h.product("Lamp", dec!(30.00), 1).await;
    h.add_to_cart(user, mug, None, 2).await;
    h.add_to_cart(user, lamp, None, 2).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();

    assert_matches!(err, CheckoutError::InsufficientStock { ref product_title } if product_title == "Lamp");
    assert_eq!(h.stock(mug).await, 5);
    assert_eq!(h.stock(lamp).await, 1);
    assert!(h.store.orders().await.is_empty());
    assert_eq!(h.store.cart_lines(user).await.len(), 2);
}

#[tokio::test]
async fn degraded_failure_reports_stranded_reservations() {
    let mut h = Harness::degraded();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    let lamp = h.product("Lamp", dec!(30.00), 1).await;
    h.add_to_cart(user, mug, None, 2).await;
    h.add_to_cart(user, lamp, None, 2).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();

    let expected = vec![StrandedReservation {
        product_id: mug,
        variant_id: None,
        quantity: 2,
    }];
    assert_matches!(
        &err,
        CheckoutError::StrandedReservations { stranded, .. } if *stranded == expected
    );
    assert_matches!(err.root(), CheckoutError::InsufficientStock { .. });
    assert_eq!(err.code(), "insufficient_stock");
    // No compensation in degraded mode.
    assert_eq!(h.stock(mug).await, 3);
    assert!(h.store.orders().await.is_empty());

    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::InventoryDrift { stranded, .. } if *stranded == expected)));
}

#[tokio::test]
async fn degraded_success_is_flagged() {
    let mut h = Harness::degraded();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let outcome = h.service.checkout(user, cod_request(None)).await.unwrap();

    assert_eq!(outcome.mode, Some(CheckoutMode::Degraded));
    assert_eq!(h.stock(mug).await, 2);
    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CheckoutDegraded { user_id: Some(u) } if *u == user)));
}

#[tokio::test]
async fn required_policy_refuses_backend_without_transactions() {
    let h = Harness::build(
        InMemoryStore::without_transactions(),
        TransactionPolicy::Required,
        Arc::new(stateset_checkout::services::coupons::NoCoupons),
    );
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 1).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::TransactionUnsupported(_));
    assert_eq!(err.code(), "internal_error");
    assert_eq!(h.stock(mug).await, 5);
}

#[tokio::test]
async fn storage_conflict_is_retried_once() {
    let store = InMemoryStore::new();
    store.inject_insert_conflicts(1);
    let h = Harness::build(
        store,
        TransactionPolicy::Auto,
        Arc::new(stateset_checkout::services::coupons::NoCoupons),
    );
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let outcome = h.service.checkout(user, cod_request(None)).await.unwrap();
    assert_eq!(outcome.mode, Some(CheckoutMode::Transactional));
    assert_eq!(h.stock(mug).await, 2);
    assert_eq!(h.store.orders().await.len(), 1);
}

#[tokio::test]
async fn repeated_storage_conflict_surfaces_without_writes() {
    let store = InMemoryStore::new();
    store.inject_insert_conflicts(2);
    let h = Harness::build(
        store,
        TransactionPolicy::Auto,
        Arc::new(stateset_checkout::services::coupons::NoCoupons),
    );
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;

    let err = h.service.checkout(user, cod_request(None)).await.unwrap_err();
    assert_matches!(err, CheckoutError::StorageFailure(_));
    assert_eq!(h.stock(mug).await, 5);
    assert!(h.store.orders().await.is_empty());
}

#[tokio::test]
async fn cancellation_restores_recorded_quantities() {
    let mut h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;
    let order = h.service.checkout(user, cod_request(None)).await.unwrap().order;
    assert_eq!(h.stock(mug).await, 2);

    // Restocked in the meantime.
    h.store.update_product(mug, |p| p.stock = 7).await;

    let cancelled = h.service.cancel_order(order.id, Some(user)).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(cancelled.mode, CheckoutMode::Transactional);
    assert_eq!(h.stock(mug).await, 10);

    let stored = h.service.get_order(user, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::OrderCancelled { order_id, .. } if *order_id == order.id)));
}

#[tokio::test]
async fn cancelling_twice_is_refused() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(user, mug, None, 3).await;
    let order = h.service.checkout(user, cod_request(None)).await.unwrap().order;

    h.service.cancel_order(order.id, Some(user)).await.unwrap();
    let err = h.service.cancel_order(order.id, Some(user)).await.unwrap_err();

    assert_matches!(
        err,
        CheckoutError::InvalidOrderState {
            status: OrderStatus::Cancelled,
            ..
        }
    );
    assert_eq!(h.stock(mug).await, 5);
}

#[tokio::test]
async fn orders_are_only_visible_to_their_owner() {
    let h = Harness::new();
    let (owner, stranger) = (Uuid::new_v4(), Uuid::new_v4());
    let mug = h.product("Mug", dec!(10.00), 5).await;
    h.add_to_cart(owner, mug, None, 1).await;
    let order = h.service.checkout(owner, cod_request(None)).await.unwrap().order;

    assert_matches!(
        h.service.get_order(stranger, order.id).await,
        Err(CheckoutError::OrderNotFound(_))
    );
    assert_matches!(
        h.service.cancel_order(order.id, Some(stranger)).await,
        Err(CheckoutError::OrderNotFound(_))
    );
    assert_eq!(h.stock(mug).await, 4);
}
