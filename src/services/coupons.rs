use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::money::round_currency;

/// Discount granted by an accepted coupon, in order currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponDiscount {
    pub code: String,
    pub amount: Decimal,
}

/// Coupon rules live outside checkout; this is the seam they are consulted through.
#[async_trait]
pub trait CouponValidator: Send + Sync {
    async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        order_amount: Decimal,
    ) -> Result<CouponDiscount, CheckoutError>;
}

/// Rejects every code. Used when no coupon backend is configured.
#[derive(Debug, Clone, Default)]
pub struct NoCoupons;

#[async_trait]
impl CouponValidator for NoCoupons {
    async fn validate(
        &self,
        code: &str,
        _user_id: Uuid,
        _order_amount: Decimal,
    ) -> Result<CouponDiscount, CheckoutError> {
        Err(CheckoutError::CouponRejected {
            code: code.to_string(),
            reason: "coupons are not enabled".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponKind {
    Percentage(Decimal),
    FixedAmount(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponRule {
    pub kind: CouponKind,
    pub min_order_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
}

/// Fixed table of coupon rules keyed by upper-cased code.
#[derive(Debug, Clone, Default)]
pub struct StaticCouponValidator {
    rules: HashMap<String, CouponRule>,
}

impl StaticCouponValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, code: &str, rule: CouponRule) -> Self {
        self.rules.insert(code.to_uppercase(), rule);
        self
    }
}

#[async_trait]
impl CouponValidator for StaticCouponValidator {
    async fn validate(
        &self,
        code: &str,
        _user_id: Uuid,
        order_amount: Decimal,
    ) -> Result<CouponDiscount, CheckoutError> {
        let rejected = |reason: &str| CheckoutError::CouponRejected {
            code: code.to_string(),
            reason: reason.to_string(),
        };

        let rule = self
            .rules
            .get(&code.to_uppercase())
            .ok_or_else(|| rejected("unknown coupon"))?;

        if let Some(min_amount) = rule.min_order_amount {
            if order_amount < min_amount {
                debug!(
                    "Order amount {} is below coupon minimum {}",
                    order_amount, min_amount
                );
                return Err(rejected("order amount below coupon minimum"));
            }
        }

        let discount = match rule.kind {
            CouponKind::Percentage(percent) => order_amount * percent / Decimal::ONE_HUNDRED,
            CouponKind::FixedAmount(amount) => amount,
        };
        let capped = match rule.max_discount_amount {
            Some(max) => discount.min(max),
            None => discount,
        };

        Ok(CouponDiscount {
            code: code.to_uppercase(),
            amount: round_currency(capped.max(Decimal::ZERO)),
        })
    }
}
