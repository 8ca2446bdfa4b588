//! Shared numeric rules for currency amounts.
//!
//! Amounts are `rust_decimal::Decimal` end to end. Calculations keep full precision;
//! rounding happens once, at the settlement/presentation boundary, through
//! [`settle_amount`].

use crate::error::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency minor-unit precision.
pub const DECIMAL_PLACES: u32 = 2;

/// Amounts with absolute value below this are exactly zero (half a cent).
pub const EPSILON: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// True when `x` is within the epsilon band around zero.
pub fn is_negligible(x: Decimal) -> bool {
    x.abs() < EPSILON
}

/// Boundary rounding: clamp noise to zero, then round half away from zero to cents.
pub fn settle_amount(x: Decimal) -> Decimal {
    if is_negligible(x) {
        return Decimal::ZERO;
    }
    let rounded = x.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    // -0.00 compares equal to zero but prints with a sign
    if rounded.is_zero() {
        Decimal::ZERO
    } else {
        rounded
    }
}

/// Error for an amount that no longer fits in a `Decimal`.
pub fn overflow(context: &str) -> Error {
    Error::InvalidInput(format!("Amount overflow in {}", context))
}

pub fn checked_add(a: Decimal, b: Decimal, context: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| overflow(context))
}

pub fn checked_sub(a: Decimal, b: Decimal, context: &str) -> Result<Decimal> {
    a.checked_sub(b).ok_or_else(|| overflow(context))
}

pub fn checked_mul(a: Decimal, b: Decimal, context: &str) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| overflow(context))
}

/// Sum that fails instead of panicking when the total overflows.
pub fn checked_sum<I: IntoIterator<Item = Decimal>>(values: I, context: &str) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, x| checked_add(acc, x, context))
}

/// Render a settled amount with exactly two decimals.
pub fn format_amount(x: Decimal) -> String {
    let mut s = settle_amount(x);
    s.rescale(DECIMAL_PLACES);
    s.to_string()
}
