//! Record handlers for taxpayers and assessments.
//!
//! Each entity has a single save operation driven by [`WriteMode`]:
//! validation runs first and nothing is written when it fails; on success
//! the record is created, or the existing record is updated in place with
//! its identity and `created_at` preserved. Assessment figures are always
//! recomputed by the [`AssessmentCalculator`]; clients cannot supply them.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::calculations::AssessmentCalculator;
use crate::db::repository::{RepositoryError, TaxRepository};
use crate::ids;
use crate::models::{
    Assessment, AssessmentFigures, AssessmentFilter, AssessmentInput, NewAssessment, NewTaxpayer,
    Taxpayer,
};
use crate::utils::{deserialize_lenient_amount, deserialize_optional_amount, deserialize_optional_year};

/// Earliest assessment year accepted.
pub const MIN_YEAR: i32 = 1900;
/// Latest assessment year accepted.
pub const MAX_YEAR: i32 = 2100;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Whether a save creates a new record or replaces an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update(String),
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field error found in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    fn push(
        &mut self,
        field: &'static str,
        message: impl Into<String>,
    ) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has_field(
        &self,
        field: &str,
    ) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    fn into_result<T>(
        self,
        value: impl FnOnce() -> T,
    ) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
}

impl RecordError {
    fn taxpayer_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Taxpayer",
            id: id.to_string(),
        }
    }

    fn assessment_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Assessment",
            id: id.to_string(),
        }
    }

    fn duplicate_email() -> Self {
        Self::Validation(ValidationErrors::single(
            "email",
            "a taxpayer with this email already exists",
        ))
    }

    fn unknown_payer() -> Self {
        Self::Validation(ValidationErrors::single("payerId", "taxpayer does not exist"))
    }
}

fn required_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<String>,
) -> String {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        errors.push(field, "is required");
    }
    value
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Taxpayer fields as submitted by the client form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxpayerRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dob: Option<String>,
    pub occupation: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub annual_income: Option<Decimal>,
}

impl TaxpayerRequest {
    /// Checks required fields and normalizes the rest.
    ///
    /// Text is trimmed, blank optional text becomes `None` and the email
    /// is lowercased.
    pub fn validate(self) -> Result<NewTaxpayer, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first_name = required_text(&mut errors, "firstName", self.first_name);
        let last_name = required_text(&mut errors, "lastName", self.last_name);
        let email = required_text(&mut errors, "email", self.email).to_lowercase();
        if !email.is_empty() && !EMAIL.is_match(&email) {
            errors.push("email", "is not a valid email address");
        }

        let annual_income = match self.annual_income {
            Some(income) if income >= Decimal::ZERO => income,
            Some(_) => {
                errors.push("annualIncome", "must not be negative");
                Decimal::ZERO
            }
            None => {
                errors.push("annualIncome", "is required and must be a number");
                Decimal::ZERO
            }
        };

        let dob = match optional_text(self.dob) {
            Some(text) => match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push("dob", "must be a date in YYYY-MM-DD format");
                    None
                }
            },
            None => None,
        };

        errors.into_result(|| NewTaxpayer {
            first_name,
            last_name,
            email,
            phone: optional_text(self.phone),
            address: optional_text(self.address),
            dob,
            occupation: optional_text(self.occupation),
            annual_income,
        })
    }
}

/// Assessment fields as submitted by the client form.
///
/// Income figures are lenient: missing or non-numeric values count as
/// zero. Any derived figures in the body are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRequest {
    pub payer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_year")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    pub declared_income: Decimal,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    pub other_income: Decimal,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    pub pension_relief: Decimal,
}

impl AssessmentRequest {
    pub fn input(&self) -> AssessmentInput {
        AssessmentInput {
            declared_income: self.declared_income,
            other_income: self.other_income,
            pension_relief: self.pension_relief,
        }
    }

    /// Returns the trimmed payer id and the year.
    pub fn validate(&self) -> Result<(String, i32), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let payer_id = required_text(&mut errors, "payerId", self.payer_id.clone());
        if !payer_id.is_empty() && !ids::is_payer_id(&payer_id) {
            errors.push("payerId", "must look like P-YYYYMM-NNNN");
        }

        let year = match self.year {
            Some(year) if (MIN_YEAR..=MAX_YEAR).contains(&year) => year,
            Some(_) => {
                errors.push(
                    "year",
                    format!("must be between {MIN_YEAR} and {MAX_YEAR}"),
                );
                0
            }
            None => {
                errors.push("year", "is required and must be a whole number");
                0
            }
        };

        errors.into_result(|| (payer_id, year))
    }
}

/// Create/read/update/delete for both record types over one repository.
#[derive(Clone)]
pub struct RecordService {
    repo: Arc<dyn TaxRepository>,
    calculator: Arc<AssessmentCalculator>,
}

impl RecordService {
    pub fn new(
        repo: Arc<dyn TaxRepository>,
        calculator: AssessmentCalculator,
    ) -> Self {
        Self {
            repo,
            calculator: Arc::new(calculator),
        }
    }

    pub fn calculator(&self) -> &AssessmentCalculator {
        &self.calculator
    }

    pub async fn health_check(&self) -> Result<(), RecordError> {
        Ok(self.repo.health_check().await?)
    }

    // ── taxpayers ────────────────────────────────────────────────────────

    pub async fn save_taxpayer(
        &self,
        mode: WriteMode,
        request: TaxpayerRequest,
    ) -> Result<Taxpayer, RecordError> {
        let fields = request.validate().map_err(RecordError::Validation)?;

        let existing = match &mode {
            WriteMode::Create => None,
            WriteMode::Update(payer_id) => Some(self.get_taxpayer(payer_id).await?),
        };

        if let Some(owner) = self.repo.find_taxpayer_by_email(&fields.email).await? {
            let is_self = existing
                .as_ref()
                .is_some_and(|t| t.payer_id == owner.payer_id);
            if !is_self {
                debug!(email = %fields.email, owner = %owner.payer_id, "email already registered");
                return Err(RecordError::duplicate_email());
            }
        }

        let result = match existing {
            None => self.repo.create_taxpayer(fields).await,
            Some(mut taxpayer) => {
                taxpayer.apply(fields);
                self.repo.update_taxpayer(&taxpayer).await
            }
        };

        let saved = result.map_err(|e| match e {
            RepositoryError::Conflict(_) => RecordError::duplicate_email(),
            RepositoryError::NotFound => match &mode {
                WriteMode::Update(id) => RecordError::taxpayer_not_found(id),
                WriteMode::Create => RecordError::Storage(RepositoryError::NotFound),
            },
            other => RecordError::Storage(other),
        })?;

        match mode {
            WriteMode::Create => info!(payer_id = %saved.payer_id, "taxpayer created"),
            WriteMode::Update(_) => info!(payer_id = %saved.payer_id, "taxpayer updated"),
        }
        Ok(saved)
    }

    pub async fn get_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<Taxpayer, RecordError> {
        self.repo.get_taxpayer(payer_id).await.map_err(|e| match e {
            RepositoryError::NotFound => RecordError::taxpayer_not_found(payer_id),
            other => RecordError::Storage(other),
        })
    }

    pub async fn list_taxpayers(&self) -> Result<Vec<Taxpayer>, RecordError> {
        Ok(self.repo.list_taxpayers().await?)
    }

    /// Deletes the taxpayer and every assessment raised against it.
    pub async fn delete_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<(), RecordError> {
        self.repo.delete_taxpayer(payer_id).await.map_err(|e| match e {
            RepositoryError::NotFound => RecordError::taxpayer_not_found(payer_id),
            other => RecordError::Storage(other),
        })?;
        info!(%payer_id, "taxpayer deleted");
        Ok(())
    }

    // ── assessments ──────────────────────────────────────────────────────

    /// Derived figures for `request` without validating or saving anything.
    pub fn preview_assessment(
        &self,
        request: &AssessmentRequest,
    ) -> AssessmentFigures {
        self.calculator.calculate(&request.input())
    }

    pub async fn save_assessment(
        &self,
        mode: WriteMode,
        request: AssessmentRequest,
    ) -> Result<Assessment, RecordError> {
        let (payer_id, year) = request.validate().map_err(RecordError::Validation)?;

        let existing = match &mode {
            WriteMode::Create => None,
            WriteMode::Update(assessment_id) => Some(self.get_assessment(assessment_id).await?),
        };

        match self.repo.get_taxpayer(&payer_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => return Err(RecordError::unknown_payer()),
            Err(other) => return Err(RecordError::Storage(other)),
        }

        let input = request.input();
        let figures = self.calculator.calculate(&input);

        let result = match existing {
            None => {
                self.repo
                    .create_assessment(NewAssessment {
                        payer_id,
                        year,
                        input,
                        figures,
                    })
                    .await
            }
            Some(mut assessment) => {
                assessment.payer_id = payer_id;
                assessment.year = year;
                assessment.input = input;
                assessment.figures = figures;
                self.repo.update_assessment(&assessment).await
            }
        };

        let saved = result.map_err(|e| match e {
            RepositoryError::Conflict(_) => RecordError::unknown_payer(),
            RepositoryError::NotFound => match &mode {
                WriteMode::Update(id) => RecordError::assessment_not_found(id),
                WriteMode::Create => RecordError::Storage(RepositoryError::NotFound),
            },
            other => RecordError::Storage(other),
        })?;

        info!(
            assessment_id = %saved.assessment_id,
            payer_id = %saved.payer_id,
            year = saved.year,
            tax_due = %saved.figures.tax_due,
            "assessment {}",
            if matches!(mode, WriteMode::Create) { "created" } else { "updated" }
        );
        Ok(saved)
    }

    pub async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Assessment, RecordError> {
        self.repo
            .get_assessment(assessment_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => RecordError::assessment_not_found(assessment_id),
                other => RecordError::Storage(other),
            })
    }

    pub async fn list_assessments(
        &self,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, RecordError> {
        Ok(self.repo.list_assessments(filter).await?)
    }

    pub async fn delete_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<(), RecordError> {
        self.repo
            .delete_assessment(assessment_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => RecordError::assessment_not_found(assessment_id),
                other => RecordError::Storage(other),
            })?;
        info!(%assessment_id, "assessment deleted");
        Ok(())
    }
}
