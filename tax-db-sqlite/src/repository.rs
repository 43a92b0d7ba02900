use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tax_core::ids::{self, SequenceKind};
use tax_core::{
    Assessment, AssessmentFigures, AssessmentFilter, AssessmentInput, NewAssessment, NewTaxpayer,
    RepositoryError, TaxRepository, Taxpayer,
};

use crate::decimal::{decimal_to_text, get_decimal};

const TAXPAYER_COLUMNS: &str = "payer_id, first_name, last_name, email, phone, address, dob,
     occupation, annual_income, created_at, updated_at";

const ASSESSMENT_COLUMNS: &str = "assessment_id, payer_id, year, declared_income, other_income,
     pension_relief, total_income, consolidated_relief, allowable_deduction, taxable, tax_due,
     created_at, updated_at";

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens `database_url`, creating the file if needed.
    ///
    /// Accepts a bare path (`tax_app.db`), a sqlx URL (`sqlite://tax_app.db`)
    /// or `:memory:`. Foreign keys are enforced on every connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Maps constraint violations to [`RepositoryError::Conflict`], everything
/// else to [`RepositoryError::Database`].
fn db_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
    }
    RepositoryError::Database(e.to_string())
}

fn column<'r, T>(
    row: &'r SqliteRow,
    name: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", name, e)))
}

fn row_to_taxpayer(row: &SqliteRow) -> Result<Taxpayer, RepositoryError> {
    Ok(Taxpayer {
        payer_id: column(row, "payer_id")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        address: column(row, "address")?,
        dob: column::<Option<NaiveDate>>(row, "dob")?,
        occupation: column(row, "occupation")?,
        annual_income: get_decimal(row, "annual_income")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_assessment(row: &SqliteRow) -> Result<Assessment, RepositoryError> {
    Ok(Assessment {
        assessment_id: column(row, "assessment_id")?,
        payer_id: column(row, "payer_id")?,
        year: column(row, "year")?,
        input: AssessmentInput {
            declared_income: get_decimal(row, "declared_income")?,
            other_income: get_decimal(row, "other_income")?,
            pension_relief: get_decimal(row, "pension_relief")?,
        },
        figures: AssessmentFigures {
            total_income: get_decimal(row, "total_income")?,
            consolidated_relief: get_decimal(row, "consolidated_relief")?,
            allowable_deduction: get_decimal(row, "allowable_deduction")?,
            taxable: get_decimal(row, "taxable")?,
            tax_due: get_decimal(row, "tax_due")?,
        },
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

/// Bumps and returns the counter for `kind` inside `tx`.
async fn next_sequence(
    tx: &mut Transaction<'_, Sqlite>,
    kind: SequenceKind,
) -> Result<i64, RepositoryError> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO id_sequences (name, value) VALUES (?, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1
         RETURNING value",
    )
    .bind(kind.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_error)
}

#[async_trait]
impl TaxRepository for SqliteRepository {
    async fn create_taxpayer(
        &self,
        taxpayer: NewTaxpayer,
    ) -> Result<Taxpayer, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let payer_id = ids::payer_id(now, next_sequence(&mut tx, SequenceKind::Payer).await?);
        sqlx::query(&format!(
            "INSERT INTO taxpayers ({TAXPAYER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&payer_id)
        .bind(&taxpayer.first_name)
        .bind(&taxpayer.last_name)
        .bind(&taxpayer.email)
        .bind(&taxpayer.phone)
        .bind(&taxpayer.address)
        .bind(taxpayer.dob)
        .bind(&taxpayer.occupation)
        .bind(decimal_to_text(taxpayer.annual_income))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        self.get_taxpayer(&payer_id).await
    }

    async fn get_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<Taxpayer, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TAXPAYER_COLUMNS} FROM taxpayers WHERE payer_id = ?"
        ))
        .bind(payer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_taxpayer(&row)
    }

    async fn find_taxpayer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Taxpayer>, RepositoryError> {
        sqlx::query(&format!(
            "SELECT {TAXPAYER_COLUMNS} FROM taxpayers WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .as_ref()
        .map(row_to_taxpayer)
        .transpose()
    }

    async fn update_taxpayer(
        &self,
        taxpayer: &Taxpayer,
    ) -> Result<Taxpayer, RepositoryError> {
        let result = sqlx::query(
            "UPDATE taxpayers SET
                first_name = ?, last_name = ?, email = ?, phone = ?, address = ?,
                dob = ?, occupation = ?, annual_income = ?, updated_at = ?
             WHERE payer_id = ?",
        )
        .bind(&taxpayer.first_name)
        .bind(&taxpayer.last_name)
        .bind(&taxpayer.email)
        .bind(&taxpayer.phone)
        .bind(&taxpayer.address)
        .bind(taxpayer.dob)
        .bind(&taxpayer.occupation)
        .bind(decimal_to_text(taxpayer.annual_income))
        .bind(Utc::now())
        .bind(&taxpayer.payer_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_taxpayer(&taxpayer.payer_id).await
    }

    async fn delete_taxpayer(
        &self,
        payer_id: &str,
    ) -> Result<(), RepositoryError> {
        // assessments go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM taxpayers WHERE payer_id = ?")
            .bind(payer_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_taxpayers(&self) -> Result<Vec<Taxpayer>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TAXPAYER_COLUMNS} FROM taxpayers ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_taxpayer).collect()
    }

    async fn create_assessment(
        &self,
        assessment: NewAssessment,
    ) -> Result<Assessment, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sequence = next_sequence(&mut tx, SequenceKind::Assessment).await?;
        let assessment_id = ids::assessment_id(assessment.year, sequence);
        let NewAssessment {
            payer_id,
            year,
            input,
            figures,
        } = assessment;

        sqlx::query(&format!(
            "INSERT INTO assessments ({ASSESSMENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&assessment_id)
        .bind(&payer_id)
        .bind(year)
        .bind(decimal_to_text(input.declared_income))
        .bind(decimal_to_text(input.other_income))
        .bind(decimal_to_text(input.pension_relief))
        .bind(decimal_to_text(figures.total_income))
        .bind(decimal_to_text(figures.consolidated_relief))
        .bind(decimal_to_text(figures.allowable_deduction))
        .bind(decimal_to_text(figures.taxable))
        .bind(decimal_to_text(figures.tax_due))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        self.get_assessment(&assessment_id).await
    }

    async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Assessment, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE assessment_id = ?"
        ))
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_assessment(&row)
    }

    async fn update_assessment(
        &self,
        assessment: &Assessment,
    ) -> Result<Assessment, RepositoryError> {
        let Assessment { input, figures, .. } = assessment;
        let result = sqlx::query(
            "UPDATE assessments SET
                payer_id = ?, year = ?, declared_income = ?, other_income = ?,
                pension_relief = ?, total_income = ?, consolidated_relief = ?,
                allowable_deduction = ?, taxable = ?, tax_due = ?, updated_at = ?
             WHERE assessment_id = ?",
        )
        .bind(&assessment.payer_id)
        .bind(assessment.year)
        .bind(decimal_to_text(input.declared_income))
        .bind(decimal_to_text(input.other_income))
        .bind(decimal_to_text(input.pension_relief))
        .bind(decimal_to_text(figures.total_income))
        .bind(decimal_to_text(figures.consolidated_relief))
        .bind(decimal_to_text(figures.allowable_deduction))
        .bind(decimal_to_text(figures.taxable))
        .bind(decimal_to_text(figures.tax_due))
        .bind(Utc::now())
        .bind(&assessment.assessment_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_assessment(&assessment.assessment_id).await
    }

    async fn delete_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM assessments WHERE assessment_id = ?")
            .bind(assessment_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_assessments(
        &self,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments
             WHERE (?1 IS NULL OR payer_id = ?1) AND (?2 IS NULL OR year = ?2)
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(filter.payer_id.as_deref())
        .bind(filter.year)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_assessment).collect()
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| RepositoryError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    async fn setup_test_db() -> SqliteRepository {
        let repo = SqliteRepository::new("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        repo.run_migrations()
            .await
            .expect("Failed to run migrations");
        repo
    }

    fn new_taxpayer(email: &str) -> NewTaxpayer {
        NewTaxpayer {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            phone: Some("+353 1 555 0100".to_string()),
            address: None,
            dob: NaiveDate::from_ymd_opt(1990, 4, 1),
            occupation: Some("Engineer".to_string()),
            annual_income: dec!(50000.50),
        }
    }

    fn new_assessment(
        payer_id: &str,
        year: i32,
    ) -> NewAssessment {
        NewAssessment {
            payer_id: payer_id.to_string(),
            year,
            input: AssessmentInput {
                declared_income: dec!(50000),
                other_income: dec!(10000),
                pension_relief: dec!(5000),
            },
            figures: AssessmentFigures {
                total_income: dec!(60000),
                consolidated_relief: dec!(12000.00),
                allowable_deduction: dec!(0.00),
                taxable: dec!(43000.00),
                tax_due: dec!(9840.00),
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_get_taxpayer() {
        let repo = setup_test_db().await;

        let created = repo
            .create_taxpayer(new_taxpayer("john@test.com"))
            .await
            .expect("Should create taxpayer");

        assert!(ids::is_payer_id(&created.payer_id));
        assert!(created.payer_id.ends_with("-0001"));
        assert_eq!(created.annual_income, dec!(50000.50));
        assert_eq!(created.dob, NaiveDate::from_ymd_opt(1990, 4, 1));
        assert_eq!(created.address, None);

        let fetched = repo
            .get_taxpayer(&created.payer_id)
            .await
            .expect("Should fetch taxpayer");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_payer_ids_never_repeat() {
        let repo = setup_test_db().await;

        let first = repo.create_taxpayer(new_taxpayer("a@test.com")).await.unwrap();
        repo.delete_taxpayer(&first.payer_id).await.unwrap();
        let second = repo.create_taxpayer(new_taxpayer("b@test.com")).await.unwrap();

        assert_ne!(first.payer_id, second.payer_id);
        assert!(second.payer_id.ends_with("-0002"));
    }

    #[tokio::test]
    async fn test_get_taxpayer_not_found() {
        let repo = setup_test_db().await;

        let result = repo.get_taxpayer("P-202501-0001").await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let repo = setup_test_db().await;
        repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();

        let result = repo.create_taxpayer(new_taxpayer("john@test.com")).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert_eq!(repo.list_taxpayers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_taxpayer_by_email() {
        let repo = setup_test_db().await;
        let created = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();

        let found = repo.find_taxpayer_by_email("john@test.com").await.unwrap();
        let missing = repo.find_taxpayer_by_email("jane@test.com").await.unwrap();

        assert_eq!(found, Some(created));
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_update_taxpayer_keeps_created_at() {
        let repo = setup_test_db().await;
        let created = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();

        let mut changed = created.clone();
        changed.first_name = "Johnny".to_string();
        changed.annual_income = dec!(65000);
        changed.created_at = Utc::now();
        let updated = repo.update_taxpayer(&changed).await.unwrap();

        assert_eq!(updated.first_name, "Johnny");
        assert_eq!(updated.annual_income, dec!(65000));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_taxpayer_not_found() {
        let repo = setup_test_db().await;
        let mut ghost = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        ghost.payer_id = "P-202501-9999".to_string();

        let result = repo.update_taxpayer(&ghost).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_taxpayer_cascades_to_assessments() {
        let repo = setup_test_db().await;
        let payer = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        let assessment = repo
            .create_assessment(new_assessment(&payer.payer_id, 2025))
            .await
            .unwrap();

        repo.delete_taxpayer(&payer.payer_id).await.unwrap();

        assert_eq!(
            repo.get_assessment(&assessment.assessment_id).await,
            Err(RepositoryError::NotFound)
        );
        assert_eq!(
            repo.delete_taxpayer(&payer.payer_id).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_create_and_get_assessment() {
        let repo = setup_test_db().await;
        let payer = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();

        let created = repo
            .create_assessment(new_assessment(&payer.payer_id, 2025))
            .await
            .expect("Should create assessment");

        assert_eq!(created.assessment_id, "A-2025-0001");
        assert_eq!(created.figures.tax_due, dec!(9840.00));
        assert_eq!(created.figures.tax_due.to_string(), "9840.00");
        assert_eq!(created.input.other_income, dec!(10000));

        let fetched = repo.get_assessment("A-2025-0001").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_assessment_for_unknown_payer_is_conflict() {
        let repo = setup_test_db().await;

        let result = repo
            .create_assessment(new_assessment("P-202501-0001", 2025))
            .await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_assessment() {
        let repo = setup_test_db().await;
        let payer = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        let created = repo
            .create_assessment(new_assessment(&payer.payer_id, 2025))
            .await
            .unwrap();

        let mut changed = created.clone();
        changed.year = 2024;
        changed.figures.tax_due = dec!(100.00);
        let updated = repo.update_assessment(&changed).await.unwrap();

        assert_eq!(updated.assessment_id, created.assessment_id);
        assert_eq!(updated.year, 2024);
        assert_eq!(updated.figures.tax_due, dec!(100.00));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_assessment_not_found() {
        let repo = setup_test_db().await;
        let payer = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        let mut ghost = repo
            .create_assessment(new_assessment(&payer.payer_id, 2025))
            .await
            .unwrap();
        ghost.assessment_id = "A-2025-9999".to_string();

        assert_eq!(
            repo.update_assessment(&ghost).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_delete_assessment() {
        let repo = setup_test_db().await;
        let payer = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        let created = repo
            .create_assessment(new_assessment(&payer.payer_id, 2025))
            .await
            .unwrap();

        repo.delete_assessment(&created.assessment_id)
            .await
            .expect("Should delete assessment");

        assert_eq!(
            repo.delete_assessment(&created.assessment_id).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_list_assessments_with_filters() {
        let repo = setup_test_db().await;
        let john = repo.create_taxpayer(new_taxpayer("john@test.com")).await.unwrap();
        let jane = repo.create_taxpayer(new_taxpayer("jane@test.com")).await.unwrap();
        repo.create_assessment(new_assessment(&john.payer_id, 2024)).await.unwrap();
        repo.create_assessment(new_assessment(&john.payer_id, 2025)).await.unwrap();
        repo.create_assessment(new_assessment(&jane.payer_id, 2025)).await.unwrap();

        let all = repo.list_assessments(&AssessmentFilter::default()).await.unwrap();
        let johns = repo
            .list_assessments(&AssessmentFilter {
                payer_id: Some(john.payer_id.clone()),
                year: None,
            })
            .await
            .unwrap();
        let year_2025 = repo
            .list_assessments(&AssessmentFilter {
                payer_id: None,
                year: Some(2025),
            })
            .await
            .unwrap();
        let johns_2024 = repo
            .list_assessments(&AssessmentFilter {
                payer_id: Some(john.payer_id.clone()),
                year: Some(2024),
            })
            .await
            .unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(all[0].assessment_id, "A-2025-0003");
        assert_eq!(johns.len(), 2);
        assert_eq!(year_2025.len(), 2);
        assert_eq!(johns_2024.len(), 1);
        assert_eq!(johns_2024[0].assessment_id, "A-2024-0001");
    }

    #[tokio::test]
    async fn test_list_taxpayers_newest_first() {
        let repo = setup_test_db().await;
        let first = repo.create_taxpayer(new_taxpayer("a@test.com")).await.unwrap();
        let second = repo.create_taxpayer(new_taxpayer("b@test.com")).await.unwrap();

        let listed = repo.list_taxpayers().await.unwrap();

        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = setup_test_db().await;
        assert_eq!(repo.health_check().await, Ok(()));
    }
}
