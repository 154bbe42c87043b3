//! SQLite catalog queries (`sqlite_master` and PRAGMAs). SQLite has no comments.

use crate::db::Dialect;
use crate::error::Result;
use crate::schema::{ColumnSchema, ForeignKey, IndexInfo};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

fn quoted(table: &str) -> String {
    Dialect::Sqlite.quote_identifier(table)
}

pub(crate) async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get("name").map_err(Into::into))
        .collect()
}

pub(crate) async fn columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnSchema>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quoted(table)))
        .fetch_all(pool)
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let notnull: i64 = row.try_get("notnull")?;
        columns.push(ColumnSchema {
            name: row.try_get("name")?,
            data_type: row.try_get("type")?,
            nullable: notnull == 0,
            default: row.try_get("dflt_value").ok().flatten(),
            comment: String::new(),
        });
    }
    Ok(columns)
}

pub(crate) async fn primary_keys(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quoted(table)))
        .fetch_all(pool)
        .await?;

    let mut keys: Vec<(i64, String)> = Vec::new();
    for row in rows {
        let position: i64 = row.try_get("pk")?;
        if position > 0 {
            keys.push((position, row.try_get("name")?));
        }
    }
    keys.sort();
    Ok(keys.into_iter().map(|(_, name)| name).collect())
}

pub(crate) async fn foreign_keys(pool: &SqlitePool, table: &str) -> Result<Vec<ForeignKey>> {
    let rows = sqlx::query(&format!("PRAGMA foreign_key_list({})", quoted(table)))
        .fetch_all(pool)
        .await?;

    let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let referred_table: String = row.try_get("table")?;
        let entry = grouped.entry(id).or_insert_with(|| ForeignKey {
            constrained_columns: Vec::new(),
            referred_table,
            referred_columns: Vec::new(),
        });
        entry.constrained_columns.push(row.try_get("from")?);
        // `to` is NULL when the reference targets the parent's primary key implicitly
        if let Some(to) = row.try_get::<Option<String>, _>("to")? {
            entry.referred_columns.push(to);
        }
    }
    Ok(grouped.into_values().collect())
}

pub(crate) async fn indexes(pool: &SqlitePool, table: &str) -> Result<Vec<IndexInfo>> {
    let index_rows = sqlx::query(&format!("PRAGMA index_list({})", quoted(table)))
        .fetch_all(pool)
        .await?;

    let mut indexes = Vec::new();
    for row in index_rows {
        let origin: Option<String> = row.try_get("origin").ok().flatten();
        if origin.as_deref() == Some("pk") {
            continue;
        }
        let name: String = row.try_get("name")?;
        let unique: i64 = row.try_get("unique")?;
        let info = sqlx::query(&format!("PRAGMA index_info({})", quoted(&name)))
            .fetch_all(pool)
            .await?;
        let columns = info
            .iter()
            .filter_map(|i| i.try_get::<Option<String>, _>("name").ok().flatten())
            .collect();
        indexes.push(IndexInfo {
            name,
            columns,
            unique: unique != 0,
        });
    }
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}
