//! Descriptive statistics over materialized rows

use crate::classifier::numeric_value;
use crate::execution::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnStatistics {
    Numeric {
        /// Values that read as numbers
        count: usize,
        min: f64,
        max: f64,
        avg: f64,
        non_null_count: usize,
    },
    Text {
        count: usize,
        unique_count: usize,
        most_common: Option<String>,
    },
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Statistics for every column with at least one non-null value.
///
/// A column is summarised numerically as soon as any of its values reads as a
/// number; the rest of its values are then ignored for min/max/avg.
pub fn describe(rows: &[Row], columns: &[String]) -> BTreeMap<String, ColumnStatistics> {
    let mut stats = BTreeMap::new();

    for column in columns {
        let values: Vec<&Value> = rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            continue;
        }

        let numbers: Vec<f64> = values.iter().filter_map(|v| numeric_value(v)).collect();
        let column_stats = if numbers.is_empty() {
            text_statistics(&values)
        } else {
            ColumnStatistics::Numeric {
                count: numbers.len(),
                min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
                max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                avg: numbers.iter().sum::<f64>() / numbers.len() as f64,
                non_null_count: values.len(),
            }
        };
        stats.insert(column.clone(), column_stats);
    }
    stats
}

fn text_statistics(values: &[&Value]) -> ColumnStatistics {
    let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        *frequencies.entry(display_value(value)).or_insert(0) += 1;
    }

    // Sorted iteration plus a strict comparison keeps the smallest value on ties
    let mut most_common: Option<(&String, usize)> = None;
    for (value, &count) in &frequencies {
        if most_common.map_or(true, |(_, best)| count > best) {
            most_common = Some((value, count));
        }
    }

    ColumnStatistics::Text {
        count: values.len(),
        unique_count: frequencies.len(),
        most_common: most_common.map(|(value, _)| value.clone()),
    }
}
