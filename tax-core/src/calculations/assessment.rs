//! Relief and aggregation: turns declared figures into assessment figures.
//!
//! | Step | Figure                | Rule |
//! |------|-----------------------|------|
//! | 1    | `total_income`        | declared income + other income |
//! | 2    | `consolidated_relief` | total income × consolidated relief rate (20%) |
//! | 3    | `allowable_deduction` | total income × allowable deduction rate (0% unless configured) |
//! | 4    | `taxable`             | total − pension relief − lines 2 and 3, never below zero |
//! | 5    | `tax_due`             | [`TaxPolicy::tax_due`] on line 4 |
//!
//! Inputs below zero count as zero. The calculation never fails: bad
//! configuration is rejected once, when the calculator is built.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::{AssessmentCalculator, AssessmentConfig};
//! use tax_core::AssessmentInput;
//!
//! let calculator = AssessmentCalculator::new(AssessmentConfig::default()).unwrap();
//! let figures = calculator.calculate(&AssessmentInput {
//!     declared_income: dec!(50000),
//!     other_income: dec!(10000),
//!     pension_relief: dec!(5000),
//! });
//!
//! assert_eq!(figures.total_income, dec!(60000));
//! assert_eq!(figures.consolidated_relief, dec!(12000.00));
//! assert_eq!(figures.taxable, dec!(43000));
//! assert_eq!(figures.tax_due, dec!(9840.00));
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::common::{apply_rate, non_negative};
use crate::calculations::tax_policy::{PolicyError, TaxPolicy, check_rate};
use crate::models::{AssessmentFigures, AssessmentInput};

/// Relief components subtracted from total income before tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliefConfig {
    /// Share of total income granted as consolidated relief.
    pub consolidated_relief_rate: Decimal,

    /// Share of total income granted as a separate allowable deduction.
    ///
    /// Zero disables the component.
    pub allowable_deduction_rate: Decimal,
}

impl Default for ReliefConfig {
    fn default() -> Self {
        Self {
            consolidated_relief_rate: dec!(0.20),
            allowable_deduction_rate: Decimal::ZERO,
        }
    }
}

/// Everything the calculator needs: the tax policy and the reliefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub tax_policy: TaxPolicy,
    pub relief: ReliefConfig,
}

impl AssessmentConfig {
    /// Validates the policy and both relief rates.
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.tax_policy.validate()?;
        check_rate(
            "consolidated_relief_rate",
            self.relief.consolidated_relief_rate,
        )?;
        check_rate(
            "allowable_deduction_rate",
            self.relief.allowable_deduction_rate,
        )?;
        Ok(())
    }
}

/// Pure calculator for the derived fields of an assessment.
///
/// Holds no mutable state, so one instance can serve every request.
#[derive(Debug, Clone)]
pub struct AssessmentCalculator {
    config: AssessmentConfig,
}

impl AssessmentCalculator {
    /// Builds a calculator after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when a rate is outside `[0, 1]`, the band is
    /// not positive, or the progressive rates are inverted.
    pub fn new(config: AssessmentConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    /// Derives total income, reliefs, taxable amount and tax due.
    pub fn calculate(
        &self,
        input: &AssessmentInput,
    ) -> AssessmentFigures {
        let declared_income = non_negative(input.declared_income);
        let other_income = non_negative(input.other_income);
        let pension_relief = non_negative(input.pension_relief);

        // saturates at Decimal::MAX rather than overflowing
        let total_income = declared_income.saturating_add(other_income);
        let relief = &self.config.relief;
        let consolidated_relief = apply_rate(total_income, relief.consolidated_relief_rate);
        let allowable_deduction = apply_rate(total_income, relief.allowable_deduction_rate);

        let deductions = pension_relief
            .saturating_add(consolidated_relief)
            .saturating_add(allowable_deduction);
        let taxable = non_negative(total_income - deductions);
        let tax_due = self.config.tax_policy.tax_due(taxable);

        debug!(
            policy = self.config.tax_policy.kind(),
            %total_income,
            %taxable,
            %tax_due,
            "assessment figures calculated"
        );

        AssessmentFigures {
            total_income,
            consolidated_relief,
            allowable_deduction,
            taxable,
            tax_due,
        }
    }
}

impl Default for AssessmentCalculator {
    fn default() -> Self {
        Self {
            config: AssessmentConfig::default(),
        }
    }
}
