//! Typed SQL values and JSON coercion
//!
//! Entity data moves through the engine as `serde_json::Value`. Before it is
//! bound to a statement it is coerced into a [`SqlValue`] whose variant
//! matches the target column, carrying a typed NULL where needed so
//! PostgreSQL never has to guess a parameter type.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};

use crate::error::{EntityError, Result};
use crate::field_type::FieldType;

/// Format used when rendering timestamps back to JSON
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQL value representation for dynamic binding
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i32>),
    BigInt(Option<i64>),
    Decimal(Option<Decimal>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl SqlValue {
    /// A NULL typed for the given logical field type
    pub fn null_for(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Int => Self::Int(None),
            FieldType::Decimal => Self::Decimal(None),
            FieldType::String | FieldType::Text => Self::Text(None),
            FieldType::Date => Self::Timestamp(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Int(v) => v.is_none(),
            Self::BigInt(v) => v.is_none(),
            Self::Decimal(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
        }
    }
}

/// Values for the five EAV value columns of one attribute row
///
/// Exactly one column carries the value; the other four stay NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValue {
    pub field_type: FieldType,
    pub value: SqlValue,
}

impl AttributeValue {
    /// Coerce `value` into the column for `field_type`
    ///
    /// Returns `None` when the value does not fit the type.
    pub fn coerce(field_type: FieldType, value: &JsonValue) -> Option<Self> {
        let value = match field_type {
            FieldType::Int => SqlValue::Int(Some(json_to_i32(value)?)),
            FieldType::Decimal => SqlValue::Decimal(Some(json_to_decimal(value)?)),
            FieldType::String | FieldType::Text => SqlValue::Text(Some(json_to_text(value)?)),
            FieldType::Date => SqlValue::Timestamp(Some(json_to_timestamp(value)?)),
        };
        Some(Self { field_type, value })
    }

    /// A row of `field_type` with every value column NULL
    pub fn empty(field_type: FieldType) -> Self {
        Self {
            field_type,
            value: SqlValue::null_for(field_type),
        }
    }

    /// Bind order: value_int, value_decimal, value_string, value_text, value_date
    pub fn columns(&self) -> [SqlValue; 5] {
        let pick = |ty: FieldType| {
            if ty == self.field_type {
                self.value.clone()
            } else {
                SqlValue::null_for(ty)
            }
        };
        [
            pick(FieldType::Int),
            pick(FieldType::Decimal),
            pick(FieldType::String),
            pick(FieldType::Text),
            pick(FieldType::Date),
        ]
    }
}

pub fn json_to_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn json_to_i32(value: &JsonValue) -> Option<i32> {
    json_to_i64(value).and_then(|n| i32::try_from(n).ok())
}

pub fn json_to_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        },
        JsonValue::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

/// Scalars render as text; objects, arrays and NULL do not
pub fn json_to_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn json_to_timestamp(value: &JsonValue) -> Option<NaiveDateTime> {
    let raw = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Interpret scanned text the way the read path does: JSON if it parses,
/// the raw string otherwise
pub fn scanned_text_to_json(raw: String) -> JsonValue {
    serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))
}

/// One decoded column of a scanned row
///
/// Character data stays raw until the binder knows whether the column is a
/// base field (kept verbatim) or a custom field (parsed as JSON if possible).
#[derive(Debug, Clone, PartialEq)]
pub enum ScannedValue {
    Native(JsonValue),
    Text(String),
}

impl ScannedValue {
    /// Value for a base field: text verbatim
    pub fn into_raw(self) -> JsonValue {
        match self {
            Self::Native(value) => value,
            Self::Text(raw) => JsonValue::String(raw),
        }
    }

    /// Value for the custom field bag
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Native(value) => value,
            Self::Text(raw) => scanned_text_to_json(raw),
        }
    }
}

pub fn decimal_to_json(d: Decimal) -> JsonValue {
    match serde_json::from_str::<JsonValue>(&d.normalize().to_string()) {
        Ok(v @ JsonValue::Number(_)) => v,
        _ => d.to_f64().map(|f| json!(f)).unwrap_or_else(|| json!(d.to_string())),
    }
}

pub fn timestamp_to_json(ts: NaiveDateTime) -> JsonValue {
    json!(ts.format(TIMESTAMP_FORMAT).to_string())
}

/// Integer for a base column, failing loudly where the read path would
/// otherwise silently store zero
pub fn base_integer(field: &str, value: &JsonValue) -> Result<i64> {
    json_to_i64(value)
        .ok_or_else(|| EntityError::mapping(field, format!("expected an integer, got {}", value)))
}

pub fn base_text(field: &str, value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::Null => Err(EntityError::mapping(field, "value must not be null")),
        JsonValue::String(s) => Ok(s.clone()),
        other => Ok(json_to_text(other).unwrap_or_else(|| other.to_string())),
    }
}

pub fn base_optional_text(field: &str, value: &JsonValue) -> Result<Option<String>> {
    match value {
        JsonValue::Null => Ok(None),
        other => base_text(field, other).map(Some),
    }
}

pub fn base_optional_integer(field: &str, value: &JsonValue) -> Result<Option<i64>> {
    match value {
        JsonValue::Null => Ok(None),
        other => base_integer(field, other).map(Some),
    }
}
