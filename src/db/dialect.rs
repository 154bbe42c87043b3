//! SQL dialect handling
//!
//! Everything that differs between the supported warehouses lives here:
//! identifier and literal quoting, comment DDL and the dry-run form of a statement.

use crate::error::{ChatBiError, Result};
use crate::schema::ColumnSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

/// Defaults that MySQL expects unquoted in a column definition.
const UNQUOTED_DEFAULTS: &[&str] = &["CURRENT_TIMESTAMP", "NOW()", "NULL"];

impl Dialect {
    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(ChatBiError::Config(format!("Unsupported database URL scheme: {}", scheme))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn supports_comments(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    pub fn quote_literal(&self, value: &str) -> String {
        let escaped = match self {
            Dialect::MySql => value.replace('\\', "\\\\").replace('\'', "''"),
            Dialect::Postgres | Dialect::Sqlite => value.replace('\'', "''"),
        };
        format!("'{}'", escaped)
    }

    /// Non-executing form of a statement used for syntax checks.
    pub fn explain(&self, sql: &str) -> String {
        format!("EXPLAIN {}", sql.trim().trim_end_matches(';'))
    }

    pub fn table_comment_ddl(&self, table: &str, comment: &str) -> Result<String> {
        match self {
            Dialect::Postgres => Ok(format!(
                "COMMENT ON TABLE {} IS {}",
                self.quote_identifier(table),
                self.quote_literal(comment)
            )),
            Dialect::MySql => Ok(format!(
                "ALTER TABLE {} COMMENT = {}",
                self.quote_identifier(table),
                self.quote_literal(comment)
            )),
            Dialect::Sqlite => Err(self.unsupported("Updating table comments")),
        }
    }

    /// `column_definition` is only consulted for MySQL, which restates the full
    /// column definition when changing a comment.
    pub fn column_comment_ddl(
        &self,
        table: &str,
        column: &str,
        comment: &str,
        column_definition: Option<&str>,
    ) -> Result<String> {
        match self {
            Dialect::Postgres => Ok(format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                self.quote_identifier(table),
                self.quote_identifier(column),
                self.quote_literal(comment)
            )),
            Dialect::MySql => {
                let definition = column_definition.ok_or_else(|| {
                    ChatBiError::Metadata(format!("MySQL needs a column definition to comment {}.{}", table, column))
                })?;
                Ok(format!(
                    "ALTER TABLE {} MODIFY COLUMN {} {} COMMENT {}",
                    self.quote_identifier(table),
                    self.quote_identifier(column),
                    definition,
                    self.quote_literal(comment)
                ))
            }
            Dialect::Sqlite => Err(self.unsupported("Updating column comments")),
        }
    }

    /// Rebuild a MySQL column definition (`<type> NULL|NOT NULL [DEFAULT x]`) from
    /// introspected metadata.
    pub fn mysql_column_definition(&self, column: &ColumnSchema) -> String {
        let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
        let default_clause = match column.default.as_deref() {
            Some(value) if is_unquoted_default(value) => format!(" DEFAULT {}", value),
            Some(value) => format!(" DEFAULT {}", self.quote_literal(value)),
            None => String::new(),
        };
        format!("{} {}{}", column.data_type, nullability, default_clause)
    }

    pub(crate) fn unsupported(&self, operation: &str) -> ChatBiError {
        ChatBiError::UnsupportedDialect {
            dialect: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}

fn is_unquoted_default(value: &str) -> bool {
    UNQUOTED_DEFAULTS.contains(&value.to_uppercase().as_str()) || value.parse::<f64>().is_ok()
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
