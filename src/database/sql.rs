//! Dynamic parameter binding and row decoding
//!
//! Queries against the per-type tables are built at runtime, so values are
//! bound from [`SqlValue`] and rows come back as column → JSON maps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};
use std::collections::BTreeMap;

use crate::error::{EntityError, Result};
use crate::values::{decimal_to_json, timestamp_to_json, ScannedValue, SqlValue};

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Bind one value, keeping the parameter type even when NULL
pub(crate) fn bind_sql_value<'q>(query: PgQuery<'q>, value: &SqlValue) -> PgQuery<'q> {
    match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::BigInt(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Timestamp(v) => query.bind(*v),
    }
}

pub(crate) fn bind_all<'q>(mut query: PgQuery<'q>, values: &[SqlValue]) -> PgQuery<'q> {
    for value in values {
        query = bind_sql_value(query, value);
    }
    query
}

fn decode<'r, T>(row: &'r PgRow, name: &str) -> Result<Option<T>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(name)
        .map_err(|e| EntityError::mapping(name, e.to_string()))
}

/// Decode a row into a column → value map
///
/// NULL columns are left out. Character data and unrecognised column types
/// are read as raw text.
pub(crate) fn row_to_map(row: &PgRow) -> Result<BTreeMap<String, ScannedValue>> {
    let mut map = BTreeMap::new();

    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name();

        let native: Option<JsonValue> = match type_name {
            "INT2" => decode::<i16>(row, name)?.map(|i| json!(i)),
            "INT4" => decode::<i32>(row, name)?.map(|i| json!(i)),
            "INT8" => decode::<i64>(row, name)?.map(|i| json!(i)),
            "FLOAT4" => decode::<f32>(row, name)?.map(|f| json!(f)),
            "FLOAT8" => decode::<f64>(row, name)?.map(|f| json!(f)),
            "NUMERIC" => decode::<Decimal>(row, name)?.map(decimal_to_json),
            "BOOL" => decode::<bool>(row, name)?.map(|b| json!(b)),
            "TIMESTAMP" => decode::<NaiveDateTime>(row, name)?.map(timestamp_to_json),
            "TIMESTAMPTZ" => {
                decode::<DateTime<Utc>>(row, name)?.map(|t| timestamp_to_json(t.naive_utc()))
            }
            "DATE" => decode::<NaiveDate>(row, name)?
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(timestamp_to_json),
            "JSON" | "JSONB" => decode::<JsonValue>(row, name)?,
            _ => {
                if let Some(raw) = decode::<String>(row, name)? {
                    map.insert(name.to_string(), ScannedValue::Text(raw));
                }
                continue;
            }
        };

        if let Some(value) = native {
            map.insert(name.to_string(), ScannedValue::Native(value));
        }
    }

    Ok(map)
}
