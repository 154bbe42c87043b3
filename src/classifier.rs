//! Rule-based classification of an executed query and its result shape

use crate::execution::{has_row_limit, Row};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column-name fragments that mark a temporal column.
pub const TIME_TOKENS: &[&str] = &["date", "time", "year", "month", "day", "created_at", "updated_at"];

lazy_static! {
    static ref AGGREGATE: Regex =
        Regex::new(r"(?i)\bgroup\s+by\b|\b(count|sum|avg|max|min)\s*\(").expect("valid aggregate pattern");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_list: bool,
    pub is_aggregate: bool,
    pub is_time_series: bool,
    pub should_visualize: bool,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub date_columns: Vec<String>,
    /// (rows, columns); (0, 0) for an empty result
    pub data_shape: (usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Date,
    Categorical,
}

pub fn is_time_column(name: &str) -> bool {
    let name = name.to_lowercase();
    TIME_TOKENS.iter().any(|token| name.contains(token))
}

pub fn is_aggregate_sql(sql: &str) -> bool {
    AGGREGATE.is_match(sql)
}

/// Whether a JSON value reads as a number. Booleans do not.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn numeric_kind(column: &str, rows: &[Row]) -> Option<ColumnKind> {
    let mut seen = false;
    for value in rows.iter().filter_map(|row| row.get(column)) {
        if value.is_null() {
            continue;
        }
        numeric_value(value)?;
        seen = true;
    }
    seen.then_some(ColumnKind::Numeric)
}

fn date_kind(column: &str) -> Option<ColumnKind> {
    is_time_column(column).then_some(ColumnKind::Date)
}

fn column_kind(column: &str, rows: &[Row]) -> ColumnKind {
    numeric_kind(column, rows)
        .or_else(|| date_kind(column))
        .unwrap_or(ColumnKind::Categorical)
}

pub struct ResultClassifier;

impl ResultClassifier {
    /// Classify from SQL text and column names; row values are only read to
    /// partition columns by type.
    pub fn classify(sql: &str, rows: &[Row], columns: &[String]) -> Classification {
        let is_aggregate = is_aggregate_sql(sql);
        let is_list = has_row_limit(sql) && !is_aggregate;
        let is_time_series = columns.iter().any(|c| is_time_column(c));

        let mut classification = Classification {
            is_list,
            is_aggregate,
            is_time_series,
            should_visualize: !is_list && (is_aggregate || is_time_series),
            numeric_columns: Vec::new(),
            categorical_columns: Vec::new(),
            date_columns: Vec::new(),
            data_shape: (0, 0),
        };

        if rows.is_empty() {
            return classification;
        }

        classification.data_shape = (rows.len(), columns.len());
        for column in columns {
            let bucket = match column_kind(column, rows) {
                ColumnKind::Numeric => &mut classification.numeric_columns,
                ColumnKind::Date => &mut classification.date_columns,
                ColumnKind::Categorical => &mut classification.categorical_columns,
            };
            bucket.push(column.clone());
        }
        classification
    }
}
