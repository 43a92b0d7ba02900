use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Assessment, AssessmentFilter, NewAssessment, NewTaxpayer, Taxpayer};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    /// A uniqueness or foreign-key constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Storage for taxpayers and their assessments.
///
/// Implementations generate record ids on create (see [`crate::ids`]) and
/// stamp `created_at`/`updated_at`. Updates and deletes of unknown ids
/// return [`RepositoryError::NotFound`].
#[async_trait]
pub trait TaxRepository: Send + Sync {
    // Taxpayers
    async fn create_taxpayer(
        &self,
        taxpayer: NewTaxpayer,
    ) -> Result<Taxpayer, RepositoryError>;

    async fn get_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<Taxpayer, RepositoryError>;

    /// Looks up a taxpayer by already-normalized (lowercased) email.
    async fn find_taxpayer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Taxpayer>, RepositoryError>;

    async fn update_taxpayer(
        &self,
        taxpayer: &Taxpayer,
    ) -> Result<Taxpayer, RepositoryError>;

    /// Deletes the taxpayer together with its assessments.
    async fn delete_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<(), RepositoryError>;

    /// All taxpayers, newest first.
    async fn list_taxpayers(&self) -> Result<Vec<Taxpayer>, RepositoryError>;

    // Assessments
    async fn create_assessment(
        &self,
        assessment: NewAssessment,
    ) -> Result<Assessment, RepositoryError>;

    async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Assessment, RepositoryError>;

    async fn update_assessment(
        &self,
        assessment: &Assessment,
    ) -> Result<Assessment, RepositoryError>;

    async fn delete_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<(), RepositoryError>;

    /// Assessments matching `filter`, newest first.
    async fn list_assessments(
        &self,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, RepositoryError>;

    /// Cheap round trip to the store.
    async fn health_check(&self) -> Result<(), RepositoryError>;
}
