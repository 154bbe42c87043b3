//! Relational store contract consumed by the pipeline

use crate::db::Dialect;
use crate::error::Result;
use crate::execution::Row;
use crate::schema::{ColumnSchema, ForeignKey, IndexInfo};
use async_trait::async_trait;

/// Rows materialized from a read statement.
#[derive(Debug, Clone, Default)]
pub struct FetchedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Narrow view of the warehouse: metadata reads, comment DDL, read-only queries and
/// dry runs. Every call acquires and releases its own connection.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn database_name(&self) -> &str;

    /// Base tables visible to the connection, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Table comment, empty when absent or when the dialect has no comments.
    async fn table_comment(&self, table: &str) -> Result<String>;

    /// Columns in ordinal order; empty when the table does not exist.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnSchema>>;

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    /// Run a single DDL statement inside a transaction.
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Run a read statement with positional parameters and materialize every row.
    async fn fetch_rows(&self, sql: &str, params: &[serde_json::Value]) -> Result<FetchedRows>;

    /// Check a statement without executing it.
    async fn dry_run(&self, sql: &str) -> Result<()>;
}
