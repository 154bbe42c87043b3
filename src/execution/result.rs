//! Query Result - materialized rows from an executed statement

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One result row keyed by column name.
pub type Row = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,

    pub rows: Vec<Row>,

    /// Always equal to `rows.len()`
    pub row_count: usize,

    /// Statement as sent to the database, after row-cap enforcement
    pub executed_sql: String,

    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, executed_sql: String, execution_time_ms: u64) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            executed_sql,
            execution_time_ms,
        }
    }

    /// First `n` rows
    pub fn preview(&self, n: usize) -> Vec<Row> {
        self.rows.iter().take(n).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_count_matches_rows() {
        let rows: Vec<Row> = (0..3)
            .map(|i| Row::from([("id".to_string(), json!(i))]))
            .collect();
        let result = QueryResult::new(vec!["id".to_string()], rows, "SELECT id FROM t LIMIT 3".to_string(), 4);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.preview(2).len(), 2);
        assert_eq!(result.preview(10).len(), 3);
    }
}
