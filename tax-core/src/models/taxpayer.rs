use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxpayer {
    pub payer_id: String,

    pub first_name: String,
    pub last_name: String,
    /// Stored trimmed and lowercased; unique across taxpayers.
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dob: Option<NaiveDate>,
    pub occupation: Option<String>,
    pub annual_income: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Taxpayer {
    /// Replaces every mutable field, keeping `payer_id` and `created_at`.
    pub fn apply(
        &mut self,
        fields: NewTaxpayer,
    ) {
        self.first_name = fields.first_name;
        self.last_name = fields.last_name;
        self.email = fields.email;
        self.phone = fields.phone;
        self.address = fields.address;
        self.dob = fields.dob;
        self.occupation = fields.occupation;
        self.annual_income = fields.annual_income;
    }
}

/// Validated taxpayer fields (no id or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaxpayer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dob: Option<NaiveDate>,
    pub occupation: Option<String>,
    pub annual_income: Decimal,
}
