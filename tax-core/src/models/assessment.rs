use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Figures declared by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentInput {
    pub declared_income: Decimal,
    pub other_income: Decimal,
    pub pension_relief: Decimal,
}

/// Figures derived from [`AssessmentInput`] by the calculator. Never set
/// directly by a client.
///
/// Amounts are exact here and in storage. On the JSON wire they are
/// numbers, exact to the cent up to 15 significant digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentFigures {
    pub total_income: Decimal,
    pub consolidated_relief: Decimal,
    pub allowable_deduction: Decimal,
    pub taxable: Decimal,
    pub tax_due: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub assessment_id: String,
    pub payer_id: String,
    pub year: i32,

    #[serde(flatten)]
    pub input: AssessmentInput,

    #[serde(flatten)]
    pub figures: AssessmentFigures,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For creating new assessments (no id or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    pub payer_id: String,
    pub year: i32,
    #[serde(flatten)]
    pub input: AssessmentInput,
    #[serde(flatten)]
    pub figures: AssessmentFigures,
}

/// Optional narrowing for assessment listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentFilter {
    pub payer_id: Option<String>,
    pub year: Option<i32>,
}
