//! Read-only query execution with row-cap enforcement

use crate::db::WarehouseStore;
use crate::error::{bounded, Result};
use crate::execution::QueryResult;
use lazy_static::lazy_static;
use regex::{Match, Regex};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

lazy_static! {
    static ref LIMIT_CLAUSE: Regex =
        Regex::new(r"(?i)\blimit\s+(\d+|all)\b(?:\s*,\s*(\d+))?").expect("valid LIMIT pattern");
    static ref FETCH_CLAUSE: Regex =
        Regex::new(r"(?i)\bfetch\s+(?:first|next)\b(?:\s+(\d+))?").expect("valid FETCH pattern");
    static ref READ_STATEMENT: Regex = Regex::new(r"(?i)^\s*\(*\s*(select|with)\b").expect("valid SELECT pattern");
}

/// Statement text with everything below the top level blanked out.
pub(crate) struct TopLevelText {
    /// Same byte length as the input; quoted text, comments and parenthesised
    /// content are replaced by spaces, their delimiters kept.
    pub text: String,
    /// The input ends inside a `--` comment
    pub ends_in_comment: bool,
}

#[derive(Clone, Copy)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

fn push_blank(text: &mut String, c: char) {
    text.extend(std::iter::repeat(' ').take(c.len_utf8()));
}

pub(crate) fn top_level_text(sql: &str) -> TopLevelText {
    let mut text = String::with_capacity(sql.len());
    let mut state = Scan::Code;
    let mut depth = 0usize;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        let visible = match state {
            Scan::Quoted(quote) => {
                if c == quote {
                    state = Scan::Code;
                    depth == 0
                } else {
                    false
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
                c == '\n'
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    text.push(' ');
                    state = Scan::Code;
                }
                false
            }
            Scan::Code => match c {
                '\'' | '"' | '`' => {
                    state = Scan::Quoted(c);
                    depth == 0
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = Scan::LineComment;
                    false
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    text.push(' ');
                    state = Scan::BlockComment;
                    false
                }
                '(' => {
                    depth += 1;
                    depth == 1
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    depth == 0
                }
                _ => depth == 0,
            },
        };

        if visible {
            text.push(c);
        } else {
            push_blank(&mut text, c);
        }
    }

    TopLevelText {
        text,
        ends_in_comment: matches!(state, Scan::LineComment),
    }
}

/// Whether the statement itself carries a row-limiting clause. Clauses in
/// subqueries, literals or comments do not count, nor does `LIMIT ALL`.
pub fn has_row_limit(sql: &str) -> bool {
    let scan = top_level_text(sql);
    LIMIT_CLAUSE
        .captures_iter(&scan.text)
        .any(|caps| caps.get(2).is_some() || !caps[1].eq_ignore_ascii_case("all"))
        || FETCH_CLAUSE.is_match(&scan.text)
}

/// Cap the rows a read statement can return.
///
/// Statements without a top-level row-limiting clause get `LIMIT max_rows`
/// appended; a `LIMIT n`, `LIMIT ALL` or `FETCH FIRST n` above the cap is lowered
/// to it. Anything that is not SELECT/WITH is returned trimmed but otherwise
/// untouched.
pub fn enforce_row_limit(sql: &str, max_rows: usize) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if !READ_STATEMENT.is_match(sql) {
        return sql.to_string();
    }
    let scan = top_level_text(sql);

    if let Some(caps) = LIMIT_CLAUSE.captures_iter(&scan.text).last() {
        // MySQL `LIMIT offset, count` puts the count second
        let count = caps.get(2).or_else(|| caps.get(1));
        return match count {
            Some(count) => lower_count(sql, count, max_rows),
            None => sql.to_string(),
        };
    }

    if let Some(caps) = FETCH_CLAUSE.captures_iter(&scan.text).last() {
        // `FETCH FIRST ROW ONLY` without a count means one row
        return match caps.get(1) {
            Some(count) => lower_count(sql, count, max_rows),
            None => sql.to_string(),
        };
    }

    let separator = if scan.ends_in_comment { "\n" } else { " " };
    format!("{}{}LIMIT {}", sql, separator, max_rows)
}

/// Replace the matched count with `max_rows` when it exceeds it or is not a number.
fn lower_count(sql: &str, count: Match<'_>, max_rows: usize) -> String {
    let over_cap = count
        .as_str()
        .parse::<u128>()
        .map_or(true, |n| n > max_rows as u128);
    if !over_cap {
        return sql.to_string();
    }
    format!("{}{}{}", &sql[..count.start()], max_rows, &sql[count.end()..])
}

pub struct QueryExecutor {
    store: Arc<dyn WarehouseStore>,
    max_rows: usize,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn WarehouseStore>, max_rows: usize, timeout: Duration) -> Self {
        Self {
            store,
            max_rows,
            timeout,
        }
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let executed_sql = enforce_row_limit(sql, self.max_rows);
        debug!("Executing SQL: {}", executed_sql);

        let start = Instant::now();
        let fetched = bounded("SQL execution", self.timeout, self.store.fetch_rows(&executed_sql, params)).await?;
        let elapsed = start.elapsed().as_millis() as u64;

        let mut rows = fetched.rows;
        rows.truncate(self.max_rows);

        info!("Query returned {} rows in {}ms", rows.len(), elapsed);
        Ok(QueryResult::new(fetched.columns, rows, executed_sql, elapsed))
    }
}
