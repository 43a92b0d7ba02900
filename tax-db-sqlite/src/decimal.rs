//! Decimal columns.
//!
//! Amounts are written as TEXT so they round-trip exactly. Reads also
//! accept INTEGER and REAL, which is what SQLite hands back for rows typed
//! in by hand.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};
use tax_core::RepositoryError;

/// Reads a non-null decimal column.
pub fn get_decimal(
    row: &SqliteRow,
    column: &str,
) -> Result<Decimal, RepositoryError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;

    if value_ref.is_null() {
        return Err(RepositoryError::Database(format!(
            "Column '{}' is NULL",
            column
        )));
    }

    let type_name = value_ref.type_info().name().to_string();
    match type_name.as_str() {
        "TEXT" => {
            let text: String = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get TEXT from '{}': {}", column, e))
            })?;
            Decimal::from_str(text.trim()).map_err(|e| {
                RepositoryError::Database(format!(
                    "Invalid decimal '{}' in '{}': {}",
                    text, column, e
                ))
            })
        }
        "INTEGER" => {
            let val: i64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!(
                    "Failed to get INTEGER from '{}': {}",
                    column, e
                ))
            })?;
            Ok(Decimal::from(val))
        }
        "REAL" => {
            let val: f64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get REAL from '{}': {}", column, e))
            })?;
            Decimal::try_from(val).map_err(|e| {
                RepositoryError::Database(format!("Failed to convert {} to Decimal: {}", val, e))
            })
        }
        other => Err(RepositoryError::Database(format!(
            "Unexpected type '{}' for column '{}'",
            other, column
        ))),
    }
}

/// Storage form of an amount. Keeps the scale, so `9840.00` stays `9840.00`.
pub fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}
