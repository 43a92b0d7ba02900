//! Record identifiers.
//!
//! | Record     | Format          | Example         |
//! |------------|-----------------|-----------------|
//! | Taxpayer   | `P-YYYYMM-NNNN` | `P-202510-0007` |
//! | Assessment | `A-YYYY-NNNN`   | `A-2025-0012`   |
//!
//! `YYYYMM` is the UTC month the taxpayer was registered, `YYYY` the
//! assessment year, and `NNNN` a per-kind counter kept by the store. The
//! counter is zero-padded to four digits and simply grows wider past 9999.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

static PAYER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^P-\d{4}(0[1-9]|1[0-2])-\d{4,}$").expect("valid regex"));

static ASSESSMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^A-\d{4}-\d{4,}$").expect("valid regex"));

/// Counter namespaces in the sequence store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    Payer,
    Assessment,
}

impl SequenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payer => "payer",
            Self::Assessment => "assessment",
        }
    }
}

/// Formats a payer id for a taxpayer registered at `registered_at`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tax_core::ids::payer_id;
///
/// let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
/// assert_eq!(payer_id(at, 7), "P-202503-0007");
/// ```
pub fn payer_id(
    registered_at: DateTime<Utc>,
    sequence: i64,
) -> String {
    format!(
        "P-{:04}{:02}-{:04}",
        registered_at.year(),
        registered_at.month(),
        sequence
    )
}

/// Formats an assessment id for `year`.
///
/// ```
/// use tax_core::ids::assessment_id;
///
/// assert_eq!(assessment_id(2025, 12), "A-2025-0012");
/// ```
pub fn assessment_id(
    year: i32,
    sequence: i64,
) -> String {
    format!("A-{:04}-{:04}", year, sequence)
}

pub fn is_payer_id(id: &str) -> bool {
    PAYER_ID.is_match(id)
}

pub fn is_assessment_id(id: &str) -> bool {
    ASSESSMENT_ID.is_match(id)
}
