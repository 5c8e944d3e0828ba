//! Immutable order documents produced by checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::order;
pub use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};

/// A purchased line. Every field is a snapshot taken at checkout time and is
/// never resynced with the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub title: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_amount: Decimal,
    pub image: Option<String>,
}

/// Where the order ships to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingContact {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 3, max = 40))]
    pub phone: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub coupon_code: Option<String>,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: OrderStatus,
    pub shipping: ShippingContact,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn into_active_model(self) -> Result<order::ActiveModel, serde_json::Error> {
        Ok(order::ActiveModel {
            id: Set(self.id),
            order_number: Set(self.order_number),
            user_id: Set(self.user_id),
            lines: Set(serde_json::to_value(&self.lines)?),
            subtotal: Set(self.subtotal),
            shipping_cost: Set(self.shipping_cost),
            discount: Set(self.discount),
            coupon_code: Set(self.coupon_code),
            total_amount: Set(self.total_amount),
            currency: Set(self.currency),
            payment_method: Set(self.payment_method),
            payment_status: Set(self.payment_status),
            transaction_id: Set(self.transaction_id),
            idempotency_key: Set(self.idempotency_key),
            status: Set(self.status),
            shipping_name: Set(self.shipping.name),
            shipping_phone: Set(self.shipping.phone),
            shipping_address: Set(self.shipping.address),
            shipping_city: Set(self.shipping.city),
            shipping_postal_code: Set(self.shipping.postal_code),
            shipping_country: Set(self.shipping.country),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            cancelled_at: Set(self.cancelled_at),
        })
    }
}

impl TryFrom<order::Model> for Order {
    type Error = serde_json::Error;

    fn try_from(model: order::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            lines: serde_json::from_value(model.lines)?,
            subtotal: model.subtotal,
            shipping_cost: model.shipping_cost,
            discount: model.discount,
            coupon_code: model.coupon_code,
            total_amount: model.total_amount,
            currency: model.currency,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            transaction_id: model.transaction_id,
            idempotency_key: model.idempotency_key,
            status: model.status,
            shipping: ShippingContact {
                name: model.shipping_name,
                phone: model.shipping_phone,
                address: model.shipping_address,
                city: model.shipping_city,
                postal_code: model.shipping_postal_code,
                country: model.shipping_country,
            },
            created_at: model.created_at,
            updated_at: model.updated_at,
            cancelled_at: model.cancelled_at,
        })
    }
}

/// Human-facing order reference, e.g. `ORD-20240115-3F2A9C1B`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let random: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), random.to_uppercase())
}
