//! Decoding of sqlx rows into [`Value`]s.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! Decoding failures are errors, never silent NULLs: a catalog row that cannot
//! be read must fail the introspection that asked for it. Types without a
//! dedicated decoder (arrays, intervals, geometric and user-defined types) are
//! rendered rather than rejected: arrays as JSON, the rest as text or raw bytes.

use crate::error::{DialectError, DialectResult};
use crate::models::{Backend, ColumnInfo, Row, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    Date,
    Time,
    TimeTz,
    Interval,
    Array,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, backend: Backend) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // PostgreSQL arrays: "INT4[]", or "_int4" for the internal name
    if lower.ends_with("[]") || (backend == Backend::PostgreSQL && lower.starts_with('_')) {
        return TypeCategory::Array;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if backend == Backend::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // "interval" and "point" would otherwise match the integer check below
    if lower == "interval" {
        return TypeCategory::Interval;
    }
    if lower == "point" {
        return TypeCategory::Unknown;
    }

    if lower == "oid" || lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "timetz" || lower == "time with time zone" {
        return TypeCategory::TimeTz;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "enum" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Conversion of backend rows into the canonical [`Row`] form.
pub trait DecodeRow {
    fn column_info(&self) -> Vec<ColumnInfo>;
    fn decode_values(&self) -> DialectResult<Vec<Value>>;

    fn column_names(&self) -> Arc<[String]> {
        self.column_info().into_iter().map(|c| c.name).collect()
    }

    /// Decode into a [`Row`] sharing an existing column list.
    fn decode_row(&self, columns: Arc<[String]>) -> DialectResult<Row> {
        Ok(Row::new(columns, self.decode_values()?))
    }
}

/// Decode a buffered result set. Column names are shared between rows.
pub fn decode_rows<R: DecodeRow>(rows: &[R]) -> DialectResult<(Vec<ColumnInfo>, Vec<Row>)> {
    let Some(first) = rows.first() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let columns = first.column_info();
    let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
    let decoded = rows
        .iter()
        .map(|r| r.decode_row(Arc::clone(&names)))
        .collect::<DialectResult<Vec<_>>>()?;
    Ok((columns, decoded))
}

fn column_error(idx: usize, type_name: &str, err: sqlx::Error) -> DialectError {
    DialectError::internal(format!(
        "Failed to decode column {} of type {}: {}",
        idx, type_name, err
    ))
}

macro_rules! impl_decode_row {
    ($row:ty, $backend:expr, $decoder:path) => {
        impl DecodeRow for $row {
            fn column_info(&self) -> Vec<ColumnInfo> {
                self.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            }

            fn decode_values(&self) -> DialectResult<Vec<Value>> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        if self.try_get_raw(idx)?.is_null() {
                            return Ok(Value::Null);
                        }
                        let type_name = col.type_info().name();
                        let category = categorize_type(type_name, $backend);
                        $decoder(self, idx, type_name, category)
                    })
                    .collect()
            }
        }
    };
}

impl_decode_row!(MySqlRow, Backend::MySQL, mysql::decode_column);
impl_decode_row!(PgRow, Backend::PostgreSQL, postgres::decode_column);
impl_decode_row!(SqliteRow, Backend::SQLite, sqlite::decode_column);

// =============================================================================
// Backend-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DialectResult<Value> {
        match category {
            TypeCategory::Decimal => row
                .try_get::<Decimal, _>(idx)
                .map(|v| Value::Text(v.to_string()))
                .map_err(|e| column_error(idx, type_name, e)),
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => decode_boolean(row, idx, type_name),
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(Value::Bytes)
                .map_err(|e| column_error(idx, type_name, e)),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .map(Value::Json)
                .map_err(|e| column_error(idx, type_name, e)),
            TypeCategory::Timestamp => {
                if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
                    return Ok(Value::Timestamp(v));
                }
                row.try_get::<NaiveDateTime, _>(idx)
                    .map(|v| Value::Timestamp(v.and_utc()))
                    .map_err(|e| column_error(idx, type_name, e))
            }
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| Value::Text(v.to_string()))
                .map_err(|e| column_error(idx, type_name, e)),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .map(|v| Value::Text(v.to_string()))
                .map_err(|e| column_error(idx, type_name, e)),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> DialectResult<Value> {
        // Try signed types
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Value::Int(v));
        }
        // Try unsigned types
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        match row.try_get::<u64, _>(idx) {
            // BIGINT UNSIGNED above i64::MAX keeps its exact digits
            Ok(v) => Ok(i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()))),
            Err(e) => Err(column_error(idx, type_name, e)),
        }
    }

    fn decode_boolean(row: &MySqlRow, idx: usize, type_name: &str) -> DialectResult<Value> {
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Ok(Value::Bool(v));
        }
        decode_integer(row, idx, type_name)
    }

    fn decode_float(row: &MySqlRow, idx: usize, type_name: &str) -> DialectResult<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Value::Float(v));
        }
        row.try_get::<f32, _>(idx)
            .map(|v| Value::Float(v.into()))
            .map_err(|e| column_error(idx, type_name, e))
    }

    /// Catalog strings can arrive as VARBINARY depending on the connection
    /// charset; those are kept as bytes and read through `Value::as_str`.
    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> DialectResult<Value> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Value::Text(v));
        }
        row.try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .map_err(|e| column_error(idx, type_name, e))
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
    use tracing::debug;
    use uuid::Uuid;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DialectResult<Value> {
        let value = match category {
            TypeCategory::Decimal => row.try_get::<Decimal, _>(idx).map(|v| Value::Text(v.to_string())),
            TypeCategory::Integer => return decode_integer(row, idx, type_name),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(Value::Bool),
            TypeCategory::Float => {
                if let Ok(v) = row.try_get::<f32, _>(idx) {
                    return Ok(Value::Float(v.into()));
                }
                row.try_get::<f64, _>(idx).map(Value::Float)
            }
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes),
            TypeCategory::Json => row.try_get::<serde_json::Value, _>(idx).map(Value::Json),
            TypeCategory::Uuid => row.try_get::<Uuid, _>(idx).map(|v| Value::Text(v.to_string())),
            TypeCategory::Timestamp => {
                if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
                    return Ok(Value::Timestamp(v));
                }
                row.try_get::<NaiveDateTime, _>(idx)
                    .map(|v| Value::Timestamp(v.and_utc()))
            }
            TypeCategory::Date => row.try_get::<NaiveDate, _>(idx).map(|v| Value::Text(v.to_string())),
            TypeCategory::Time => row.try_get::<NaiveTime, _>(idx).map(|v| Value::Text(v.to_string())),
            TypeCategory::TimeTz => row
                .try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(idx)
                .map(|v| Value::Text(format!("{}{}", v.time, v.offset))),
            TypeCategory::Interval => row
                .try_get::<PgInterval, _>(idx)
                .map(|v| Value::Text(format_interval(&v))),
            TypeCategory::Array => return Ok(decode_array(row, idx, type_name)),
            TypeCategory::Text => row.try_get::<String, _>(idx).map(Value::Text),
            TypeCategory::Unknown => return Ok(decode_fallback(row, idx, type_name)),
        };
        value.map_err(|e| column_error(idx, type_name, e))
    }

    /// Arrays of common element types become JSON arrays; NULL elements stay
    /// `null`. Anything else falls back to the raw value.
    fn decode_array(row: &PgRow, idx: usize, type_name: &str) -> Value {
        fn json<T: serde::Serialize>(items: Vec<Option<T>>) -> Value {
            serde_json::to_value(items).map_or(Value::Null, Value::Json)
        }

        if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<i64>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<String>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<f32>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<bool>>, _>(idx) {
            return json(v);
        }
        if let Ok(v) = row.try_get::<Vec<Option<Uuid>>, _>(idx) {
            return json(v.into_iter().map(|u| u.map(|u| u.to_string())).collect());
        }
        decode_fallback(row, idx, type_name)
    }

    /// Text for types whose wire form is text (enums, domains over text),
    /// raw bytes otherwise.
    fn decode_fallback(row: &PgRow, idx: usize, type_name: &str) -> Value {
        if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
            return Value::Text(v);
        }
        match row.try_get_unchecked::<Vec<u8>, _>(idx) {
            Ok(v) => Value::Bytes(v),
            Err(e) => {
                debug!(column = idx, type_name, error = %e, "Undecodable column read as NULL");
                Value::Null
            }
        }
    }

    pub(super) fn format_interval(interval: &PgInterval) -> String {
        let mut parts = Vec::new();
        let (years, months) = (interval.months / 12, interval.months % 12);
        if years != 0 {
            parts.push(plural(years.into(), "year"));
        }
        if months != 0 {
            parts.push(plural(months.into(), "mon"));
        }
        if interval.days != 0 {
            parts.push(plural(interval.days.into(), "day"));
        }
        let micros = interval.microseconds;
        if micros != 0 || parts.is_empty() {
            let sign = if micros < 0 { "-" } else { "" };
            let micros = micros.unsigned_abs();
            let secs = micros / 1_000_000;
            let frac = micros % 1_000_000;
            let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
            if frac != 0 {
                clock.push_str(format!(".{frac:06}").trim_end_matches('0'));
            }
            parts.push(clock);
        }
        parts.join(" ")
    }

    fn plural(n: i64, unit: &str) -> String {
        if n.abs() == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    }

    fn decode_integer(row: &PgRow, idx: usize, type_name: &str) -> DialectResult<Value> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Value::Int(v));
        }
        row.try_get::<Oid, _>(idx)
            .map(|v| Value::Int(v.0.into()))
            .map_err(|e| column_error(idx, type_name, e))
    }
}

mod sqlite {
    use super::*;

    /// SQLite column types are advisory: the decoder trusts the storage class
    /// of the value itself and only uses the declared type to spot booleans.
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DialectResult<Value> {
        let raw = row.try_get_raw(idx)?;
        let storage = raw.type_info().name().to_ascii_uppercase();

        let value = match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(Value::Bool),
            "INTEGER" => row.try_get::<i64, _>(idx).map(Value::Int),
            "REAL" => row.try_get::<f64, _>(idx).map(Value::Float),
            "BLOB" => row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes),
            _ => match row.try_get::<String, _>(idx) {
                Ok(v) if category == TypeCategory::Json => Ok(serde_json::from_str(&v)
                    .map(Value::Json)
                    .unwrap_or(Value::Text(v))),
                other => other.map(Value::Text),
            },
        };
        value.map_err(|e| column_error(idx, type_name, e))
    }
}
