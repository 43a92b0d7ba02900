//! Decimal helpers shared by the tax function and the relief aggregation.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary amount to two decimal places, half away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(12000.004)), dec!(12000.00));
/// assert_eq!(round_half_up(dec!(12000.005)), dec!(12000.01));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `value`, or zero when `value` is negative.
///
/// ```
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::non_negative;
///
/// assert_eq!(non_negative(dec!(-5000)), Decimal::ZERO);
/// assert_eq!(non_negative(dec!(43000)), dec!(43000));
/// ```
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Applies `rate` to `base` and rounds the product to cents.
pub fn apply_rate(
    base: Decimal,
    rate: Decimal,
) -> Decimal {
    round_half_up(base * rate)
}
