//! sqlx-backed warehouse store
//!
//! Dispatches every store operation to the pool variant for the configured dialect.

use crate::config::Config;
use crate::db::{init_pool, mysql, postgres, sqlite, value, DbPool, Dialect, FetchedRows, WarehouseStore};
use crate::error::Result;
use crate::schema::{ColumnSchema, ForeignKey, IndexInfo};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Column, Executor, Row};
use tracing::{debug, info};

/// Bind JSON parameters positionally onto a sqlx query.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64().unwrap_or_default()),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

/// Fetch rows and column names; column names come from the statement description
/// when the result is empty.
macro_rules! fetch_with {
    ($pool:expr, $sql:expr, $params:expr, $decode:path) => {{
        let rows = bind_params!(sqlx::query($sql), $params).fetch_all($pool).await?;
        let columns: Vec<String> = match rows.first() {
            Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
            None => $pool
                .describe($sql)
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };
        FetchedRows {
            columns,
            rows: rows.iter().map($decode).collect(),
        }
    }};
}

macro_rules! run_ddl {
    ($pool:expr, $statement:expr) => {{
        let mut tx = $pool.begin().await?;
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql($statement)).await?;
        tx.commit().await?;
    }};
}

#[derive(Debug, Clone)]
pub struct SqlxWarehouse {
    pool: DbPool,
    database_name: String,
}

impl SqlxWarehouse {
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Connecting to {} warehouse", config.dialect);
        let pool = init_pool(
            &config.database_url,
            config.dialect,
            config.db_max_connections,
            config.db_timeout,
        )
        .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: DbPool) -> Result<Self> {
        let database_name = match &pool {
            DbPool::Postgres(p) => postgres::database_name(p).await?,
            DbPool::MySql(p) => mysql::database_name(p).await?,
            DbPool::Sqlite(_) => "main".to_string(),
        };
        info!("Connected to database {}", database_name);
        Ok(Self { pool, database_name })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WarehouseStore for SqlxWarehouse {
    fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::list_tables(p).await,
            DbPool::MySql(p) => mysql::list_tables(p).await,
            DbPool::Sqlite(p) => sqlite::list_tables(p).await,
        }
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::table_comment(p, table).await,
            DbPool::MySql(p) => mysql::table_comment(p, table).await,
            DbPool::Sqlite(_) => Ok(String::new()),
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::columns(p, table).await,
            DbPool::MySql(p) => mysql::columns(p, table).await,
            DbPool::Sqlite(p) => sqlite::columns(p, table).await,
        }
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::primary_keys(p, table).await,
            DbPool::MySql(p) => mysql::primary_keys(p, table).await,
            DbPool::Sqlite(p) => sqlite::primary_keys(p, table).await,
        }
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::foreign_keys(p, table).await,
            DbPool::MySql(p) => mysql::foreign_keys(p, table).await,
            DbPool::Sqlite(p) => sqlite::foreign_keys(p, table).await,
        }
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::indexes(p, table).await,
            DbPool::MySql(p) => mysql::indexes(p, table).await,
            DbPool::Sqlite(p) => sqlite::indexes(p, table).await,
        }
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        debug!("Executing DDL: {}", statement);
        match &self.pool {
            DbPool::Postgres(p) => run_ddl!(p, statement),
            DbPool::MySql(p) => run_ddl!(p, statement),
            DbPool::Sqlite(p) => run_ddl!(p, statement),
        }
        Ok(())
    }

    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<FetchedRows> {
        let fetched = match &self.pool {
            DbPool::Postgres(p) => fetch_with!(p, sql, params, value::pg_row),
            DbPool::MySql(p) => fetch_with!(p, sql, params, value::mysql_row),
            DbPool::Sqlite(p) => fetch_with!(p, sql, params, value::sqlite_row),
        };
        Ok(fetched)
    }

    async fn dry_run(&self, sql: &str) -> Result<()> {
        let explain = self.dialect().explain(sql);
        match &self.pool {
            DbPool::Postgres(p) => {
                sqlx::query(&explain).fetch_all(p).await?;
            }
            DbPool::MySql(p) => {
                sqlx::query(&explain).fetch_all(p).await?;
            }
            DbPool::Sqlite(p) => {
                sqlx::query(&explain).fetch_all(p).await?;
            }
        }
        Ok(())
    }
}
