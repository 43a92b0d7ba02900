//! Tax function: maps a taxable amount to the tax due on it.
//!
//! Two policies exist side by side and are selected by configuration:
//!
//! | Policy        | Formula |
//! |---------------|---------|
//! | `progressive` | `min(taxable, band) × low_rate + max(0, taxable − band) × high_rate` |
//! | `flat`        | `taxable × rate` |
//!
//! Negative taxable amounts carry no tax, and every result is rounded to
//! cents with [`round_half_up`].
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::TaxPolicy;
//!
//! let policy = TaxPolicy::default();
//!
//! assert_eq!(policy.tax_due(dec!(36800)), dec!(7360.00));
//! assert_eq!(policy.tax_due(dec!(50000)), dec!(12640.00));
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::{non_negative, round_half_up};

/// Standard-rate band of the progressive policy.
pub const DEFAULT_BAND: Decimal = dec!(36800);
/// Rate applied inside the band.
pub const DEFAULT_LOW_RATE: Decimal = dec!(0.20);
/// Rate applied above the band.
pub const DEFAULT_HIGH_RATE: Decimal = dec!(0.40);
/// Rate of the flat policy.
pub const DEFAULT_FLAT_RATE: Decimal = dec!(0.23);

/// Rejected policy or relief parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{name} must be between 0 and 1, got {value}")]
    RateOutOfRange { name: &'static str, value: Decimal },

    #[error("tax band must be positive, got {0}")]
    InvalidBand(Decimal),

    #[error("high rate {high} is below low rate {low}; tax would decrease with income")]
    InvertedRates { low: Decimal, high: Decimal },
}

/// The rule used to turn a taxable amount into tax due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxPolicy {
    /// Two brackets: `low_rate` up to `band`, `high_rate` on the remainder.
    Progressive {
        band: Decimal,
        low_rate: Decimal,
        high_rate: Decimal,
    },
    /// A single rate on the whole taxable amount.
    Flat { rate: Decimal },
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self::progressive()
    }
}

impl TaxPolicy {
    /// 20% up to 36,800 and 40% above it.
    pub fn progressive() -> Self {
        Self::Progressive {
            band: DEFAULT_BAND,
            low_rate: DEFAULT_LOW_RATE,
            high_rate: DEFAULT_HIGH_RATE,
        }
    }

    /// 23% on everything.
    pub fn flat() -> Self {
        Self::Flat {
            rate: DEFAULT_FLAT_RATE,
        }
    }

    /// Short name used in logs and configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progressive { .. } => "progressive",
            Self::Flat { .. } => "flat",
        }
    }

    /// Checks that every rate lies in `[0, 1]`, that the band is positive,
    /// and that a progressive policy never taxes the upper bracket less.
    ///
    /// ```
    /// use rust_decimal_macros::dec;
    /// use tax_core::calculations::{PolicyError, TaxPolicy};
    ///
    /// let policy = TaxPolicy::Flat { rate: dec!(1.5) };
    /// assert!(matches!(policy.validate(), Err(PolicyError::RateOutOfRange { .. })));
    /// ```
    pub fn validate(&self) -> Result<(), PolicyError> {
        match *self {
            Self::Progressive {
                band,
                low_rate,
                high_rate,
            } => {
                if band <= Decimal::ZERO {
                    return Err(PolicyError::InvalidBand(band));
                }
                check_rate("low_rate", low_rate)?;
                check_rate("high_rate", high_rate)?;
                if high_rate < low_rate {
                    return Err(PolicyError::InvertedRates {
                        low: low_rate,
                        high: high_rate,
                    });
                }
                Ok(())
            }
            Self::Flat { rate } => check_rate("rate", rate),
        }
    }

    /// Tax due on `taxable`, rounded to cents. Negative input yields zero.
    pub fn tax_due(
        &self,
        taxable: Decimal,
    ) -> Decimal {
        let taxable = non_negative(taxable);
        let tax = match *self {
            Self::Progressive {
                band,
                low_rate,
                high_rate,
            } => {
                let low_part = taxable.min(band);
                let high_part = non_negative(taxable - band);
                low_part * low_rate + high_part * high_rate
            }
            Self::Flat { rate } => taxable * rate,
        };
        round_half_up(tax)
    }
}

pub(crate) fn check_rate(
    name: &'static str,
    value: Decimal,
) -> Result<(), PolicyError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(PolicyError::RateOutOfRange { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    // =========================================================================
    // progressive policy
    // =========================================================================

    #[test]
    fn progressive_zero_is_zero() {
        assert_eq!(TaxPolicy::progressive().tax_due(Decimal::ZERO), dec!(0.00));
    }

    #[test]
    fn progressive_at_band_uses_low_rate_only() {
        assert_eq!(TaxPolicy::progressive().tax_due(dec!(36800)), dec!(7360.00));
    }

    #[test]
    fn progressive_above_band_splits_brackets() {
        // 36800 × 0.20 + 13200 × 0.40
        assert_eq!(TaxPolicy::progressive().tax_due(dec!(50000)), dec!(12640.00));
    }

    #[test]
    fn progressive_below_band() {
        assert_eq!(TaxPolicy::progressive().tax_due(dec!(10000)), dec!(2000.00));
    }

    #[test]
    fn progressive_negative_is_zero() {
        assert_eq!(TaxPolicy::progressive().tax_due(dec!(-1)), Decimal::ZERO);
    }

    #[test]
    fn progressive_rounds_to_cents() {
        // 0.333 × 0.20 = 0.0666
        assert_eq!(TaxPolicy::progressive().tax_due(dec!(0.333)), dec!(0.07));
    }

    // =========================================================================
    // flat policy
    // =========================================================================

    #[test]
    fn flat_applies_single_rate() {
        assert_eq!(TaxPolicy::flat().tax_due(dec!(100000)), dec!(23000));
    }

    #[test]
    fn flat_zero_is_zero() {
        assert_eq!(TaxPolicy::flat().tax_due(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn flat_negative_is_zero() {
        assert_eq!(TaxPolicy::flat().tax_due(dec!(-5000)), Decimal::ZERO);
    }

    #[test]
    fn flat_rounds_to_cents() {
        // 10.01 × 0.23 = 2.3023
        assert_eq!(TaxPolicy::flat().tax_due(dec!(10.01)), dec!(2.30));
    }

    // =========================================================================
    // shape properties
    // =========================================================================

    #[test]
    fn tax_is_non_negative_and_non_decreasing() {
        for policy in [TaxPolicy::progressive(), TaxPolicy::flat()] {
            let mut previous = Decimal::ZERO;
            let mut taxable = Decimal::ZERO;
            while taxable <= dec!(120000) {
                let tax = policy.tax_due(taxable);
                assert!(tax >= Decimal::ZERO);
                assert!(tax >= previous, "{} dropped at {taxable}", policy.kind());
                previous = tax;
                taxable += dec!(733.37);
            }
        }
    }

    #[test]
    fn tax_due_is_repeatable() {
        let policy = TaxPolicy::progressive();
        assert_eq!(policy.tax_due(dec!(43000)), policy.tax_due(dec!(43000)));
    }

    // =========================================================================
    // validation
    // =========================================================================

    #[test]
    fn default_policies_are_valid() {
        assert_eq!(TaxPolicy::progressive().validate(), Ok(()));
        assert_eq!(TaxPolicy::flat().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_non_positive_band() {
        let policy = TaxPolicy::Progressive {
            band: Decimal::ZERO,
            low_rate: dec!(0.2),
            high_rate: dec!(0.4),
        };
        assert_eq!(policy.validate(), Err(PolicyError::InvalidBand(Decimal::ZERO)));
    }

    #[test]
    fn validate_rejects_inverted_rates() {
        let policy = TaxPolicy::Progressive {
            band: dec!(36800),
            low_rate: dec!(0.4),
            high_rate: dec!(0.2),
        };
        assert_eq!(
            policy.validate(),
            Err(PolicyError::InvertedRates {
                low: dec!(0.4),
                high: dec!(0.2),
            })
        );
    }

    #[test]
    fn validate_rejects_negative_flat_rate() {
        let policy = TaxPolicy::Flat { rate: dec!(-0.1) };
        assert_eq!(
            policy.validate(),
            Err(PolicyError::RateOutOfRange {
                name: "rate",
                value: dec!(-0.1),
            })
        );
    }
}
