//! Database connection management using sqlx

use crate::db::Dialect;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

/// Connection pool for whichever warehouse the URL points at.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Postgres(_) => Dialect::Postgres,
            DbPool::MySql(_) => Dialect::MySql,
            DbPool::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Initialize the database connection pool
pub async fn init_pool(
    database_url: &str,
    dialect: Dialect,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    let pool = match dialect {
        Dialect::Postgres => DbPool::Postgres(
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(database_url)
                .await?,
        ),
        Dialect::MySql => DbPool::MySql(
            MySqlPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(database_url)
                .await?,
        ),
        Dialect::Sqlite => DbPool::Sqlite(
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(database_url)
                .await?,
        ),
    };

    // Test the connection
    match &pool {
        DbPool::Postgres(p) => {
            sqlx::query("SELECT 1").execute(p).await?;
        }
        DbPool::MySql(p) => {
            sqlx::query("SELECT 1").execute(p).await?;
        }
        DbPool::Sqlite(p) => {
            sqlx::query("SELECT 1").execute(p).await?;
        }
    }

    Ok(pool)
}
