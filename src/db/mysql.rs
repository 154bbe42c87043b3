//! MySQL catalog queries against `information_schema`, scoped to `DATABASE()`.

use crate::error::Result;
use crate::schema::{ColumnSchema, ForeignKey, IndexInfo};
use sqlx::{MySqlPool, Row};
use std::collections::BTreeMap;

pub(crate) async fn database_name(pool: &MySqlPool) -> Result<String> {
    let row = sqlx::query("SELECT CAST(DATABASE() AS CHAR) AS name")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<Option<String>, _>("name")?.unwrap_or_default())
}

pub(crate) async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY TABLE_NAME",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get("table_name").map_err(Into::into))
        .collect()
}

pub(crate) async fn table_comment(pool: &MySqlPool, table: &str) -> Result<String> {
    let row = sqlx::query(
        "SELECT CAST(TABLE_COMMENT AS CHAR) AS table_comment FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
    )
    .bind(table)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .and_then(|r| r.try_get::<Option<String>, _>("table_comment").ok().flatten())
        .unwrap_or_default())
}

pub(crate) async fn columns(pool: &MySqlPool, table: &str) -> Result<Vec<ColumnSchema>> {
    let rows = sqlx::query(
        "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
                CAST(COLUMN_TYPE AS CHAR) AS data_type, \
                CAST(IS_NULLABLE AS CHAR) AS is_nullable, \
                CAST(COLUMN_DEFAULT AS CHAR) AS column_default, \
                CAST(COLUMN_COMMENT AS CHAR) AS column_comment \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
         ORDER BY ORDINAL_POSITION",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let nullable: String = row.try_get("is_nullable")?;
        columns.push(ColumnSchema {
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            nullable: nullable == "YES",
            default: row.try_get("column_default").ok().flatten(),
            comment: row
                .try_get::<Option<String>, _>("column_comment")
                .ok()
                .flatten()
                .unwrap_or_default(),
        });
    }
    Ok(columns)
}

pub(crate) async fn primary_keys(pool: &MySqlPool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
         ORDER BY ORDINAL_POSITION",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get("column_name").map_err(Into::into))
        .collect()
}

pub(crate) async fn foreign_keys(pool: &MySqlPool, table: &str) -> Result<Vec<ForeignKey>> {
    let rows = sqlx::query(
        "SELECT CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name, \
                CAST(COLUMN_NAME AS CHAR) AS column_name, \
                CAST(REFERENCED_TABLE_NAME AS CHAR) AS foreign_table, \
                CAST(REFERENCED_COLUMN_NAME AS CHAR) AS foreign_column \
         FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL \
         ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<String, ForeignKey> = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("constraint_name")?;
        let foreign_table: String = row.try_get("foreign_table")?;
        let entry = grouped.entry(name).or_insert_with(|| ForeignKey {
            constrained_columns: Vec::new(),
            referred_table: foreign_table,
            referred_columns: Vec::new(),
        });
        entry.constrained_columns.push(row.try_get("column_name")?);
        entry.referred_columns.push(row.try_get("foreign_column")?);
    }
    Ok(grouped.into_values().collect())
}

pub(crate) async fn indexes(pool: &MySqlPool, table: &str) -> Result<Vec<IndexInfo>> {
    let rows = sqlx::query(
        "SELECT CAST(INDEX_NAME AS CHAR) AS index_name, \
                CAST(COLUMN_NAME AS CHAR) AS column_name, \
                CAST(NON_UNIQUE AS SIGNED) AS non_unique \
         FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
         ORDER BY INDEX_NAME, SEQ_IN_INDEX",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<String, IndexInfo> = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("index_name")?;
        let non_unique: i64 = row.try_get("non_unique")?;
        let column: Option<String> = row.try_get("column_name")?;
        let entry = grouped.entry(name.clone()).or_insert_with(|| IndexInfo {
            name,
            columns: Vec::new(),
            unique: non_unique == 0,
        });
        // Functional index parts have no column name
        if let Some(column) = column {
            entry.columns.push(column);
        }
    }
    Ok(grouped.into_values().collect())
}
