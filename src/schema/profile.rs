//! Table sampling and profiling through the query executor

use crate::error::Result;
use crate::execution::{QueryExecutor, Row};
use crate::schema::SchemaIntrospector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Numeric columns profiled per table
const MAX_PROFILED_COLUMNS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSample {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    pub table_name: String,
    pub row_count: u64,
    /// `avg_<col>`, `min_<col>`, `max_<col>` for the first numeric-typed columns
    pub numeric_stats: BTreeMap<String, Value>,
}

pub struct TableProfiler {
    introspector: Arc<SchemaIntrospector>,
    executor: Arc<QueryExecutor>,
}

impl TableProfiler {
    pub fn new(introspector: Arc<SchemaIntrospector>, executor: Arc<QueryExecutor>) -> Self {
        Self { introspector, executor }
    }

    pub async fn sample_rows(&self, table: &str, limit: usize) -> Result<TableSample> {
        // Resolves the table first so unknown names fail as TableNotFound
        self.introspector.get_table_schema(table, false).await?;

        let dialect = self.introspector.store().dialect();
        let sql = format!("SELECT * FROM {} LIMIT {}", dialect.quote_identifier(table), limit);
        let result = self.executor.execute(&sql, &[]).await?;

        Ok(TableSample {
            table_name: table.to_string(),
            columns: result.columns,
            rows: result.rows,
        })
    }

    pub async fn table_profile(&self, table: &str) -> Result<TableProfile> {
        let schema = self.introspector.get_table_schema(table, false).await?;
        let dialect = self.introspector.store().dialect();
        let quoted_table = dialect.quote_identifier(table);

        let count = self
            .executor
            .execute(&format!("SELECT COUNT(*) AS row_count FROM {}", quoted_table), &[])
            .await?;
        let row_count = count
            .rows
            .first()
            .and_then(|row| row.get("row_count"))
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .unwrap_or(0);

        let numeric: Vec<&str> = schema
            .columns
            .iter()
            .filter(|c| c.is_numeric_type())
            .take(MAX_PROFILED_COLUMNS)
            .map(|c| c.name.as_str())
            .collect();

        let mut numeric_stats = BTreeMap::new();
        if !numeric.is_empty() {
            let projections: Vec<String> = numeric
                .iter()
                .flat_map(|column| {
                    let quoted = dialect.quote_identifier(column);
                    ["avg", "min", "max"].into_iter().map(move |agg| {
                        format!(
                            "{}({}) AS {}",
                            agg.to_uppercase(),
                            quoted,
                            dialect.quote_identifier(&format!("{}_{}", agg, column))
                        )
                    })
                })
                .collect();
            let sql = format!("SELECT {} FROM {}", projections.join(", "), quoted_table);
            debug!("Profiling {} numeric columns of {}", numeric.len(), table);

            let stats = self.executor.execute(&sql, &[]).await?;
            if let Some(row) = stats.rows.into_iter().next() {
                numeric_stats.extend(row);
            }
        }

        Ok(TableProfile {
            table_name: table.to_string(),
            row_count,
            numeric_stats,
        })
    }
}
