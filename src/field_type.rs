//! Logical field types and their physical representation
//!
//! A custom field is declared with one of five logical types. Each maps to a
//! column type in the flattened projection and to exactly one value column of
//! the EAV main table. Anything unrecognised is treated as `string`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// EAV value columns, in table order
pub const VALUE_COLUMNS: [&str; 5] = [
    "value_int",
    "value_decimal",
    "value_string",
    "value_text",
    "value_date",
];

/// Logical type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Decimal,
    String,
    Text,
    Date,
}

impl FieldType {
    /// Strict lookup, `None` for names outside the fixed set
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "int" => Some(Self::Int),
            "decimal" => Some(Self::Decimal),
            "string" => Some(Self::String),
            "text" => Some(Self::Text),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// Lookup used for configured fields: unknown names fall back to `String`
    pub fn from_config(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            warn!(field_type = raw, "unknown field type, falling back to string");
            Self::String
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Text => "text",
            Self::Date => "date",
        }
    }

    /// Column type used in the flattened table
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Int => "INTEGER",
            Self::Decimal => "NUMERIC(10,2)",
            Self::String => "VARCHAR(255)",
            Self::Text => "TEXT",
            Self::Date => "TIMESTAMP",
        }
    }

    /// Column of the main table holding values of this type
    pub fn value_column(self) -> &'static str {
        match self {
            Self::Int => "value_int",
            Self::Decimal => "value_decimal",
            Self::String => "value_string",
            Self::Text => "value_text",
            Self::Date => "value_date",
        }
    }

    /// Map a live catalog type (`information_schema.columns.data_type`) back
    /// to the logical type whose value column should receive the data
    pub fn from_catalog_type(data_type: &str) -> Self {
        let data_type = data_type.to_ascii_lowercase();
        match data_type.as_str() {
            "integer" | "bigint" | "smallint" => Self::Int,
            "numeric" | "decimal" | "real" | "double precision" => Self::Decimal,
            "character varying" | "character" | "varchar" | "char" => Self::String,
            "text" => Self::Text,
            "date" => Self::Date,
            t if t.starts_with("timestamp") => Self::Date,
            _ => Self::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
