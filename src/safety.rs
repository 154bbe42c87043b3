//! SQL safety gate
//!
//! Generated SQL must pass three checks before it reaches the executor: a lexical
//! deny-list of write/DDL keywords, a statement-shape check (one SELECT/WITH
//! statement), and a dry run of `EXPLAIN <sql>` on the live connection.

use crate::db::WarehouseStore;
use crate::error::{bounded, ChatBiError, Result};
use crate::execution::executor::top_level_text;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Matched as case-insensitive substrings, so identifiers that embed a keyword
/// (`updated_at`) are rejected too.
pub const DENY_LIST: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "EXEC", "EXECUTE",
];

/// Earliest deny-listed keyword contained in the statement; the longest wins when
/// two start at the same offset (`EXECUTE` over `EXEC`).
pub fn find_denied_keyword(sql: &str) -> Option<&'static str> {
    let upper = sql.to_uppercase();
    DENY_LIST
        .iter()
        .copied()
        .filter_map(|keyword| upper.find(keyword).map(|pos| (pos, keyword)))
        .min_by_key(|(pos, keyword)| (*pos, Reverse(keyword.len())))
        .map(|(_, keyword)| keyword)
}

/// Lexical and shape checks that need no database.
pub fn check_statement(sql: &str) -> Result<()> {
    if let Some(keyword) = find_denied_keyword(sql) {
        return Err(ChatBiError::validation(sql, format!("Dangerous SQL keyword detected: {}", keyword)));
    }

    let trimmed = sql.trim();
    if trimmed.trim_end_matches(';').trim().is_empty() {
        return Err(ChatBiError::validation(sql, "Empty SQL statement"));
    }

    if statement_count(trimmed) > 1 {
        return Err(ChatBiError::validation(sql, "Only a single SQL statement is allowed"));
    }

    let first_keyword: String = trimmed
        .trim_start_matches('(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();
    if first_keyword != "SELECT" && first_keyword != "WITH" {
        return Err(ChatBiError::validation(sql, "Only SELECT queries are allowed"));
    }

    Ok(())
}

/// Number of non-empty `;`-separated statements, ignoring separators inside
/// quoted literals and identifiers.
/// Non-blank `;`-separated statements, ignoring separators in literals, comments
/// and parentheses.
fn statement_count(sql: &str) -> usize {
    top_level_text(sql)
        .text
        .split(';')
        .filter(|statement| !statement.trim().is_empty())
        .count()
}

pub struct SqlSafetyValidator {
    store: Arc<dyn WarehouseStore>,
    timeout: Duration,
}

impl SqlSafetyValidator {
    pub fn new(store: Arc<dyn WarehouseStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Full gate: lexical checks, then a non-executing dry run.
    pub async fn validate(&self, sql: &str) -> Result<()> {
        if let Err(e) = check_statement(sql) {
            warn!("Rejected SQL: {}", e);
            return Err(e);
        }

        debug!("Dry-running SQL: {}", sql);
        match bounded("SQL syntax check", self.timeout, self.store.dry_run(sql)).await {
            Ok(()) => Ok(()),
            Err(e @ (ChatBiError::Connection(_) | ChatBiError::Timeout { .. })) => Err(e),
            Err(e) => {
                let reason = match e {
                    ChatBiError::Execution(message) => message,
                    other => other.to_string(),
                };
                warn!("SQL failed dry run: {}", reason);
                Err(ChatBiError::validation(sql, format!("SQL syntax error: {}", reason)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_list_any_case() {
        for keyword in DENY_LIST {
            let sql = format!("select 1; {} table users", keyword.to_lowercase());
            let err = check_statement(&sql).unwrap_err();
            assert!(err.to_string().ends_with(&format!("Dangerous SQL keyword detected: {}", keyword)), "{}", err);
        }
    }

    #[test]
    fn test_deny_list_names_keyword() {
        let err = check_statement("DROP TABLE users").unwrap_err();
        assert_eq!(err.to_string(), "SQL validation failed: Dangerous SQL keyword detected: DROP");
        assert_eq!(err.offending_sql(), Some("DROP TABLE users"));
    }

    #[test]
    fn test_substring_match_is_kept() {
        assert_eq!(find_denied_keyword("SELECT updated_at FROM t"), Some("UPDATE"));
    }

    #[test]
    fn test_shape_checks() {
        assert!(check_statement("SELECT * FROM orders").is_ok());
        assert!(check_statement("  with t as (select 1) select * from t;").is_ok());
        assert!(check_statement("(SELECT 1) UNION (SELECT 2)").is_ok());
        assert!(check_statement("SELECT 'a;b' AS x").is_ok());
        assert!(check_statement("").is_err());
        assert!(check_statement(" ; ").is_err());
        assert!(check_statement("SELECT 1; SELECT 2").is_err());
        assert!(check_statement("PRAGMA table_info(orders)").is_err());
    }

    #[test]
    fn test_statement_count() {
        assert_eq!(statement_count("SELECT 1;"), 1);
        assert_eq!(statement_count("SELECT 1;;"), 1);
        assert_eq!(statement_count("SELECT ';' ; SELECT 2"), 2);
        assert_eq!(statement_count("SELECT 1 -- trailing; comment"), 1);
        assert_eq!(statement_count("SELECT 1; -- done"), 1);
    }
}
