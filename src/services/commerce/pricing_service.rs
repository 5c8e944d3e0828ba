//! Unit prices and order totals.
//!
//! Everything here is pure so the same arithmetic prices the cart, checks
//! the captured payment amount and fills the order document.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::SelectionError;
use crate::models::CatalogEntry;
use crate::money::{apply_percent_discount, round_currency};

/// Resolved price and snapshot data for one product/variant selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price: Decimal,
    pub available_stock: i32,
    pub resolved_variant_id: Option<Uuid>,
    pub title: String,
    pub sku: String,
    pub image: Option<String>,
}

/// Prices a selection against a catalog entry.
pub fn resolve_price(
    entry: &CatalogEntry,
    variant_id: Option<Uuid>,
) -> Result<PriceQuote, SelectionError> {
    let product = &entry.product;
    if !product.status.is_active() {
        return Err(SelectionError::Inactive);
    }

    match (product.has_variants, variant_id) {
        (true, None) => Err(SelectionError::VariantRequired),
        (false, Some(_)) => Err(SelectionError::VariantsNotSupported),
        (false, None) => Ok(PriceQuote {
            unit_price: apply_percent_discount(product.base_price, product.discount_percent),
            available_stock: product.stock,
            resolved_variant_id: None,
            title: product.title.clone(),
            sku: product.sku.clone(),
            image: product.image.clone(),
        }),
        (true, Some(id)) => {
            let variant = entry
                .variant(id)
                .ok_or(SelectionError::UnknownVariant(id))?;
            if !variant.status.is_active() {
                return Err(SelectionError::Inactive);
            }
            Ok(PriceQuote {
                unit_price: apply_percent_discount(variant.base_price, variant.discount_percent),
                available_stock: variant.stock,
                resolved_variant_id: Some(variant.id),
                title: format!("{} - {}", product.title, variant.name),
                sku: variant.sku.clone(),
                image: variant.image.clone().or_else(|| product.image.clone()),
            })
        }
    }
}

/// `unit_price × quantity` at currency precision.
pub fn line_amount(unit_price: Decimal, quantity: i32) -> Decimal {
    round_currency(unit_price * Decimal::from(quantity))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_fee: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(10000, 2),
            flat_fee: Decimal::new(1000, 2),
        }
    }
}

impl From<&AppConfig> for ShippingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            free_shipping_threshold: cfg.free_shipping_threshold,
            flat_fee: cfg.flat_shipping_fee,
        }
    }
}

impl ShippingPolicy {
    pub fn cost_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            round_currency(self.flat_fee)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Totals for a subtotal. The coupon discount never exceeds the subtotal.
pub fn compute_totals(
    subtotal: Decimal,
    shipping: &ShippingPolicy,
    coupon_discount: Option<Decimal>,
) -> OrderTotals {
    let subtotal = round_currency(subtotal);
    let shipping_cost = shipping.cost_for(subtotal);
    let discount = round_currency(
        coupon_discount
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
            .min(subtotal.max(Decimal::ZERO)),
    );
    OrderTotals {
        subtotal,
        shipping_cost,
        discount,
        total: round_currency(subtotal + shipping_cost - discount),
    }
}
