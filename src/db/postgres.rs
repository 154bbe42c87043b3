//! PostgreSQL catalog queries
//!
//! Everything is scoped to `current_schema()`. Catalog text columns are cast to
//! `text` because information_schema exposes them through domain types.

use crate::error::Result;
use crate::schema::{ColumnSchema, ForeignKey, IndexInfo};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

pub(crate) async fn database_name(pool: &PgPool) -> Result<String> {
    let row = sqlx::query("SELECT current_database()::text AS name")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("name")?)
}

pub(crate) async fn list_tables(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get("table_name").map_err(Into::into))
        .collect()
}

pub(crate) async fn table_comment(pool: &PgPool, table: &str) -> Result<String> {
    let row = sqlx::query(
        "SELECT pg_catalog.obj_description(c.oid, 'pg_class') AS table_comment \
         FROM pg_catalog.pg_class c \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relname = $1 AND c.relkind IN ('r', 'p') AND n.nspname = current_schema()",
    )
    .bind(table)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .and_then(|r| r.try_get::<Option<String>, _>("table_comment").ok().flatten())
        .unwrap_or_default())
}

pub(crate) async fn columns(pool: &PgPool, table: &str) -> Result<Vec<ColumnSchema>> {
    let rows = sqlx::query(
        "SELECT c.column_name::text AS column_name, \
                c.data_type::text AS data_type, \
                c.is_nullable::text AS is_nullable, \
                c.column_default::text AS column_default, \
                pg_catalog.col_description(pc.oid, c.ordinal_position::int) AS column_comment \
         FROM information_schema.columns c \
         JOIN pg_catalog.pg_namespace pn ON pn.nspname = c.table_schema \
         JOIN pg_catalog.pg_class pc ON pc.relname = c.table_name AND pc.relnamespace = pn.oid \
         WHERE c.table_schema = current_schema() AND c.table_name = $1 \
         ORDER BY c.ordinal_position",
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

pub(crate) async fn primary_keys(pool: &PgPool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT a.attname::text AS column_name \
         FROM pg_catalog.pg_index i \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
         WHERE i.indrelid = to_regclass(quote_ident($1)) AND i.indisprimary \
         ORDER BY a.attnum",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get("column_name").map_err(Into::into))
        .collect()
}

pub(crate) async fn foreign_keys(pool: &PgPool, table: &str) -> Result<Vec<ForeignKey>> {
    let rows = sqlx::query(
        "SELECT tc.constraint_name::text AS constraint_name, \
                kcu.column_name::text AS column_name, \
                ccu.table_name::text AS foreign_table, \
                ccu.column_name::text AS foreign_column \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_name = kcu.table_name \
         JOIN information_schema.constraint_column_usage ccu \
           ON ccu.constraint_name = tc.constraint_name \
         WHERE tc.table_schema = current_schema() AND tc.table_name = $1 \
           AND tc.constraint_type = 'FOREIGN KEY' \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<String, ForeignKey> = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("constraint_name")?;
        let column: String = row.try_get("column_name")?;
        let foreign_table: String = row.try_get("foreign_table")?;
        let foreign_column: String = row.try_get("foreign_column")?;
        let entry = grouped.entry(name).or_insert_with(|| ForeignKey {
            constrained_columns: Vec::new(),
            referred_table: foreign_table,
            referred_columns: Vec::new(),
        });
        if !entry.constrained_columns.contains(&column) {
            entry.constrained_columns.push(column);
        }
        if !entry.referred_columns.contains(&foreign_column) {
            entry.referred_columns.push(foreign_column);
        }
    }
    Ok(grouped.into_values().collect())
}

pub(crate) async fn indexes(pool: &PgPool, table: &str) -> Result<Vec<IndexInfo>> {
    let rows = sqlx::query(
        "SELECT i.relname::text AS index_name, ix.indisunique AS is_unique, a.attname::text AS column_name \
         FROM pg_catalog.pg_class t \
         JOIN pg_catalog.pg_index ix ON t.oid = ix.indrelid \
         JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
         JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS ord(attnum, ordinality) ON true \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ord.attnum \
         WHERE t.oid = to_regclass(quote_ident($1)) AND NOT ix.indisprimary \
         ORDER BY index_name, ord.ordinality",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<String, IndexInfo> = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("index_name")?;
        let unique: bool = row.try_get("is_unique")?;
        let column: String = row.try_get("column_name")?;
        grouped
            .entry(name.clone())
            .or_insert_with(|| IndexInfo {
                name,
                columns: Vec::new(),
                unique,
            })
            .columns
            .push(column);
    }
    Ok(grouped.into_values().collect())
}
