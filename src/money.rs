//! Currency arithmetic helpers.
//!
//! Amounts are carried as [`Decimal`] with two fractional digits. Comparisons
//! against payment gateways happen in integer minor units (cents).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept for every stored amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Rounds to currency precision, half-up (midpoint away from zero).
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `base × (1 − percent/100)`, rounded to currency precision.
pub fn apply_percent_discount(base: Decimal, percent: Decimal) -> Decimal {
    let factor = Decimal::ONE - percent / Decimal::ONE_HUNDRED;
    round_currency(base * factor)
}

/// Converts an amount into integer minor units. `None` when it does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (round_currency(amount) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, CURRENCY_SCALE)
}
