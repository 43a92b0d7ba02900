//! Assessment calculator: the tax function and the relief aggregation that
//! feeds it.

pub mod assessment;
pub mod common;
pub mod tax_policy;

pub use assessment::{AssessmentCalculator, AssessmentConfig, ReliefConfig};
pub use tax_policy::{PolicyError, TaxPolicy};
