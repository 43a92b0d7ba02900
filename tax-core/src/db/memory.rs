//! Process-local repository. Data lives only as long as the process.
//!
//! Registered as the `memory` backend; handy for demos and tests that do
//! not need a database file.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::factory::{DbConfig, RepositoryFactory};
use super::repository::{RepositoryError, TaxRepository};
use crate::ids::{self, SequenceKind};
use crate::models::{Assessment, AssessmentFilter, NewAssessment, NewTaxpayer, Taxpayer};

#[derive(Default)]
struct Store {
    taxpayers: HashMap<String, Taxpayer>,
    assessments: HashMap<String, Assessment>,
    sequences: HashMap<SequenceKind, i64>,
    /// Insertion order per record id, like SQLite's `rowid`.
    rows: HashMap<String, u64>,
    next_row: u64,
}

impl Store {
    fn next_sequence(
        &mut self,
        kind: SequenceKind,
    ) -> i64 {
        let value = self.sequences.entry(kind).or_insert(0);
        *value += 1;
        *value
    }

    fn track_row(
        &mut self,
        id: &str,
    ) {
        self.next_row += 1;
        self.rows.insert(id.to_string(), self.next_row);
    }

    fn email_taken(
        &self,
        email: &str,
        except: Option<&str>,
    ) -> bool {
        self.taxpayers
            .values()
            .any(|t| t.email == email && Some(t.payer_id.as_str()) != except)
    }
}

/// [`TaxRepository`] backed by a mutex-guarded map.
///
/// Enforces the same constraints as the SQL schema: unique email, and
/// assessments must reference an existing taxpayer.
#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, RepositoryError> {
        self.store
            .lock()
            .map_err(|e| RepositoryError::Database(format!("store lock poisoned: {e}")))
    }
}

/// Newest first, later inserts winning ties on `created_at`.
fn newest_first<T>(
    records: &mut [T],
    rows: &HashMap<String, u64>,
    key: impl Fn(&T) -> (chrono::DateTime<Utc>, &str),
) {
    records.sort_by(|a, b| {
        let (a_created, a_id) = key(a);
        let (b_created, b_id) = key(b);
        (b_created, rows.get(b_id)).cmp(&(a_created, rows.get(a_id)))
    });
}

#[async_trait]
impl TaxRepository for MemoryRepository {
    async fn create_taxpayer(
        &self,
        taxpayer: NewTaxpayer,
    ) -> Result<Taxpayer, RepositoryError> {
        let mut store = self.lock()?;
        if store.email_taken(&taxpayer.email, None) {
            return Err(RepositoryError::Conflict(format!(
                "email '{}' already registered",
                taxpayer.email
            )));
        }

        let now = Utc::now();
        let payer_id = ids::payer_id(now, store.next_sequence(SequenceKind::Payer));
        let created = Taxpayer {
            payer_id: payer_id.clone(),
            first_name: taxpayer.first_name,
            last_name: taxpayer.last_name,
            email: taxpayer.email,
            phone: taxpayer.phone,
            address: taxpayer.address,
            dob: taxpayer.dob,
            occupation: taxpayer.occupation,
            annual_income: taxpayer.annual_income,
            created_at: now,
            updated_at: now,
        };
        store.track_row(&payer_id);
        store.taxpayers.insert(payer_id, created.clone());
        Ok(created)
    }

    async fn get_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<Taxpayer, RepositoryError> {
        self.lock()?
            .taxpayers
            .get(payer_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_taxpayer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Taxpayer>, RepositoryError> {
        Ok(self
            .lock()?
            .taxpayers
            .values()
            .find(|t| t.email == email)
            .cloned())
    }

    async fn update_taxpayer(
        &self,
        taxpayer: &Taxpayer,
    ) -> Result<Taxpayer, RepositoryError> {
        let mut store = self.lock()?;
        if store.email_taken(&taxpayer.email, Some(&taxpayer.payer_id)) {
            return Err(RepositoryError::Conflict(format!(
                "email '{}' already registered",
                taxpayer.email
            )));
        }

        let existing = store
            .taxpayers
            .get_mut(&taxpayer.payer_id)
            .ok_or(RepositoryError::NotFound)?;
        let created_at = existing.created_at;
        *existing = Taxpayer {
            created_at,
            updated_at: Utc::now(),
            ..taxpayer.clone()
        };
        Ok(existing.clone())
    }

    async fn delete_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut store = self.lock()?;
        store
            .taxpayers
            .remove(payer_id)
            .ok_or(RepositoryError::NotFound)?;
        store.rows.remove(payer_id);
        let Store {
            assessments, rows, ..
        } = &mut *store;
        assessments.retain(|id, a| {
            let keep = a.payer_id != payer_id;
            if !keep {
                rows.remove(id);
            }
            keep
        });
        Ok(())
    }

    async fn list_taxpayers(&self) -> Result<Vec<Taxpayer>, RepositoryError> {
        let store = self.lock()?;
        let mut taxpayers: Vec<_> = store.taxpayers.values().cloned().collect();
        newest_first(&mut taxpayers, &store.rows, |t| {
            (t.created_at, t.payer_id.as_str())
        });
        Ok(taxpayers)
    }

    async fn create_assessment(
        &self,
        assessment: NewAssessment,
    ) -> Result<Assessment, RepositoryError> {
        let mut store = self.lock()?;
        if !store.taxpayers.contains_key(&assessment.payer_id) {
            return Err(RepositoryError::Conflict(format!(
                "taxpayer '{}' does not exist",
                assessment.payer_id
            )));
        }

        let now = Utc::now();
        let sequence = store.next_sequence(SequenceKind::Assessment);
        let assessment_id = ids::assessment_id(assessment.year, sequence);
        let created = Assessment {
            assessment_id: assessment_id.clone(),
            payer_id: assessment.payer_id,
            year: assessment.year,
            input: assessment.input,
            figures: assessment.figures,
            created_at: now,
            updated_at: now,
        };
        store.track_row(&assessment_id);
        store.assessments.insert(assessment_id, created.clone());
        Ok(created)
    }

    async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Assessment, RepositoryError> {
        self.lock()?
            .assessments
            .get(assessment_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_assessment(
        &self,
        assessment: &Assessment,
    ) -> Result<Assessment, RepositoryError> {
        let mut store = self.lock()?;
        if !store.taxpayers.contains_key(&assessment.payer_id) {
            return Err(RepositoryError::Conflict(format!(
                "taxpayer '{}' does not exist",
                assessment.payer_id
            )));
        }

        let existing = store
            .assessments
            .get_mut(&assessment.assessment_id)
            .ok_or(RepositoryError::NotFound)?;
        let created_at = existing.created_at;
        *existing = Assessment {
            created_at,
            updated_at: Utc::now(),
            ..assessment.clone()
        };
        Ok(existing.clone())
    }

    async fn delete_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut store = self.lock()?;
        store
            .assessments
            .remove(assessment_id)
            .ok_or(RepositoryError::NotFound)?;
        store.rows.remove(assessment_id);
        Ok(())
    }

    async fn list_assessments(
        &self,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, RepositoryError> {
        let store = self.lock()?;
        let mut assessments: Vec<_> = store
            .assessments
            .values()
            .filter(|a| filter.payer_id.as_deref().is_none_or(|id| a.payer_id == id))
            .filter(|a| filter.year.is_none_or(|year| a.year == year))
            .cloned()
            .collect();
        newest_first(&mut assessments, &store.rows, |a| {
            (a.created_at, a.assessment_id.as_str())
        });
        Ok(assessments)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.lock().map(|_| ())
    }
}

/// [`RepositoryFactory`] for the `memory` backend.
pub struct MemoryRepositoryFactory;

#[async_trait]
impl RepositoryFactory for MemoryRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        _config: &DbConfig,
    ) -> Result<Box<dyn TaxRepository>, RepositoryError> {
        Ok(Box::new(MemoryRepository::new()))
    }
}
