//! Lenient numeric input handling.
//!
//! Browser forms send amounts as JSON numbers, numeric strings, empty
//! strings or not at all. Assessment inputs coerce anything unusable to
//! zero; required taxpayer fields use the `Option` variants so a missing
//! value can be reported instead.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Deserializer;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};

/// Normalizes input for decimal parsing: trims whitespace and removes commas (thousands separator).
fn normalize_decimal_input(s: &str) -> String {
    s.trim().replace(',', "")
}

/// Parses a form amount such as `"1,234.56"`.
///
/// Returns `None` for blank or unparseable input.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let normalized = normalize_decimal_input(s);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse().map_or_else(
        |e| {
            tracing::debug!(input = %s, "ignoring invalid amount: {}", e);
            None
        },
        Some,
    )
}

/// Coerces a form amount to a decimal, treating anything unusable as zero.
pub fn coerce_amount(s: &str) -> Decimal {
    parse_amount(s).unwrap_or(Decimal::ZERO)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Option<Decimal>;

    fn expecting(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    fn visit_i64<E: de::Error>(
        self,
        v: i64,
    ) -> Result<Self::Value, E> {
        Ok(Some(Decimal::from(v)))
    }

    fn visit_u64<E: de::Error>(
        self,
        v: u64,
    ) -> Result<Self::Value, E> {
        Ok(Some(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(
        self,
        v: f64,
    ) -> Result<Self::Value, E> {
        Ok(Decimal::from_f64(v))
    }

    fn visit_str<E: de::Error>(
        self,
        v: &str,
    ) -> Result<Self::Value, E> {
        Ok(parse_amount(v))
    }

    fn visit_bool<E: de::Error>(
        self,
        _: bool,
    ) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
    ) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// `deserialize_with` target for required amounts: `None` when the value
/// is absent, null, blank or not a number.
///
/// Pair with `#[serde(default)]` so a missing field also becomes `None`.
pub fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

/// `deserialize_with` target for lenient amounts: unusable values become zero.
pub fn deserialize_lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_amount(deserializer)?.unwrap_or(Decimal::ZERO))
}

/// `deserialize_with` target for a year given as a number or numeric
/// string. Fractions and out-of-range values become `None`.
pub fn deserialize_optional_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_amount(deserializer)?
        .filter(|value| value.fract().is_zero())
        .and_then(|value| value.to_i32()))
}
