//! Row decoding into JSON values
//!
//! Driver rows are shaped into `column -> serde_json::Value` maps by trying decoders
//! from most to least specific. Values no decoder accepts become `null`.

use crate::execution::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row as SqlxRow, Type};
use tracing::debug;

macro_rules! try_decode {
    ($row:expr, $idx:expr, $ty:ty, $map:expr) => {
        if let Ok(value) = $row.try_get::<Option<$ty>, _>($idx) {
            return Some(value.map($map).unwrap_or(Value::Null));
        }
    };
}

pub(crate) fn pg_row(row: &PgRow) -> Row {
    decode_row(row, |row, idx| {
        try_decode!(row, idx, Decimal, decimal_value);
        try_decode!(row, idx, uuid::Uuid, |u| Value::String(u.to_string()));
        try_decode!(row, idx, Value, |v| v);
        None
    })
}

pub(crate) fn mysql_row(row: &MySqlRow) -> Row {
    decode_row(row, |row, idx| {
        try_decode!(row, idx, Decimal, decimal_value);
        try_decode!(row, idx, u64, Value::from);
        None
    })
}

pub(crate) fn sqlite_row(row: &SqliteRow) -> Row {
    decode_row(row, |_, _| None)
}

fn decode_row<R, F>(row: &R, dialect_decoder: F) -> Row
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    F: Fn(&R, usize) -> Option<Value>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = dialect_decoder(row, idx)
                .or_else(|| decode_common(row, idx))
                .unwrap_or_else(|| {
                    debug!("No decoder accepted column {}, returning null", column.name());
                    Value::Null
                });
            (column.name().to_string(), value)
        })
        .collect()
}

fn decode_common<R>(row: &R, idx: usize) -> Option<Value>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    try_decode!(row, idx, i64, Value::from);
    try_decode!(row, idx, i32, Value::from);
    try_decode!(row, idx, i16, Value::from);
    try_decode!(row, idx, f64, float_value);
    try_decode!(row, idx, f32, |f| float_value(f as f64));
    try_decode!(row, idx, bool, Value::Bool);
    try_decode!(row, idx, String, Value::String);
    try_decode!(row, idx, NaiveDate, |d| Value::String(d.format("%Y-%m-%d").to_string()));
    try_decode!(row, idx, NaiveDateTime, |d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()));
    try_decode!(row, idx, DateTime<Utc>, |d| Value::String(d.to_rfc3339()));
    try_decode!(row, idx, NaiveTime, |t| Value::String(t.format("%H:%M:%S").to_string()));

    // Types without a registered decoder (enums, citext, ...) are usually text on the wire.
    row.try_get_unchecked::<Option<String>, _>(idx)
        .ok()
        .map(|value| value.map(Value::String).unwrap_or(Value::Null))
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decimal_value(d: Decimal) -> Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_decimal_value() {
        assert_eq!(decimal_value(Decimal::from_str("12.50").unwrap()), serde_json::json!(12.5));
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(float_value(f64::NAN), Value::Null);
        assert_eq!(float_value(2.0), serde_json::json!(2.0));
    }
}
