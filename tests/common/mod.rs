#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use stateset_checkout::config::TransactionPolicy;
use stateset_checkout::events::{Event, EventSender};
use stateset_checkout::models::{
    CartLine, PaymentMethod, Product, ProductStatus, ShippingContact, Variant,
};
use stateset_checkout::repositories::InMemoryStore;
use stateset_checkout::services::commerce::{CheckoutRequest, CheckoutService, CheckoutSettings};
use stateset_checkout::services::coupons::{CouponValidator, NoCoupons};
use stateset_checkout::services::payment_gateway::{
    GatewayError, PaymentConfirmation, PaymentGateway, SUCCEEDED_STATUS,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway double serving confirmations from a table.
#[derive(Default)]
pub struct FakeGateway {
    confirmations: Mutex<HashMap<String, PaymentConfirmation>>,
}

impl FakeGateway {
    pub fn insert(&self, confirmation: PaymentConfirmation) {
        self.confirmations
            .lock()
            .unwrap()
            .insert(confirmation.transaction_id.clone(), confirmation);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn retrieve_confirmation(
        &self,
        reference_id: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        self.confirmations
            .lock()
            .unwrap()
            .get(reference_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(reference_id.to_string()))
    }
}

/// Captured card payment bound to `user_id`.
pub fn captured(reference: &str, user_id: Uuid, amount_minor: i64) -> PaymentConfirmation {
    PaymentConfirmation {
        transaction_id: reference.to_string(),
        status: SUCCEEDED_STATUS.to_string(),
        amount_minor,
        currency: "usd".to_string(),
        bound_user_id: Some(user_id.to_string()),
    }
}

/// Checkout service over an in-memory store with a receiver for its events.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub service: CheckoutService<InMemoryStore>,
    events: mpsc::Receiver<Event>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(InMemoryStore::new(), TransactionPolicy::Auto, Arc::new(NoCoupons))
    }

    /// Backend without transaction support.
    pub fn degraded() -> Self {
        Self::build(
            InMemoryStore::without_transactions(),
            TransactionPolicy::Auto,
            Arc::new(NoCoupons),
        )
    }

    pub fn build(
        store: InMemoryStore,
        policy: TransactionPolicy,
        coupons: Arc<dyn CouponValidator>,
    ) -> Self {
        let store = Arc::new(store);
        let gateway = Arc::new(FakeGateway::default());
        let (tx, rx) = mpsc::channel(256);
        let settings = CheckoutSettings {
            transaction_policy: policy,
            ..CheckoutSettings::default()
        };
        let service = CheckoutService::new(
            store.clone(),
            gateway.clone(),
            coupons,
            settings,
            EventSender::new(tx),
        );
        Self {
            store,
            gateway,
            service,
            events: rx,
        }
    }

    /// Seeds an active product without variants.
    pub async fn product(&self, title: &str, price: Decimal, stock: i32) -> Uuid {
        let product = product(title, price, stock);
        let id = product.id;
        self.store.put_product(product).await;
        id
    }

    /// Seeds an active variant under `product_id`.
    pub async fn variant(&self, product_id: Uuid, name: &str, price: Decimal, stock: i32) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.store
            .put_variant(Variant {
                id,
                product_id,
                sku: format!("{}-{}", product_id.simple(), name.to_uppercase()),
                name: name.to_string(),
                image: None,
                status: ProductStatus::Active,
                stock,
                base_price: price,
                discount_percent: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            })
            .await;
        id
    }

    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) {
        self.store
            .add_cart_line(cart_line(user_id, product_id, variant_id, quantity, Decimal::ZERO))
            .await;
    }

    pub async fn stock(&self, product_id: Uuid) -> i32 {
        self.store.stock_of(product_id, None).await.unwrap()
    }

    /// Every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn product(title: &str, price: Decimal, stock: i32) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(),
        title: title.to_string(),
        sku: title.to_uppercase().replace(' ', "-"),
        image: Some(format!("https://cdn.example.com/{}.png", title.to_lowercase())),
        status: ProductStatus::Active,
        stock,
        base_price: price,
        discount_percent: Decimal::ZERO,
        has_variants: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn cart_line(
    user_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price_snapshot: Decimal,
) -> CartLine {
    CartLine {
        id: Uuid::new_v4(),
        user_id,
        product_id,
        variant_id,
        quantity,
        unit_price_snapshot,
        created_at: Utc::now(),
    }
}

pub fn shipping() -> ShippingContact {
    ShippingContact {
        name: "Ada Obi".to_string(),
        phone: "+2348000000".to_string(),
        address: "1 Marina".to_string(),
        city: "Lagos".to_string(),
        postal_code: "101001".to_string(),
        country: "NG".to_string(),
    }
}

pub fn cod_request(idempotency_key: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        payment_method: PaymentMethod::CashOnDelivery,
        payment_reference: None,
        coupon_code: None,
        idempotency_key: idempotency_key.map(str::to_string),
        shipping: shipping(),
    }
}

pub fn card_request(reference: &str, idempotency_key: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        payment_method: PaymentMethod::Card,
        payment_reference: Some(reference.to_string()),
        ..cod_request(idempotency_key)
    }
}
