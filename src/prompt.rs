//! SQL generation prompts and completion parsing
//!
//! The composer renders the schema into deterministic instructions, asks the
//! completion service for a structured answer and resolves whatever comes back
//! into a `SqlGenerationResult`. Generated SQL is row-capped and safety-gated
//! before it is handed to the caller.

use crate::db::Dialect;
use crate::error::{bounded, Result};
use crate::execution::enforce_row_limit;
use crate::llm::{CompletionRequest, CompletionResponse, CompletionService};
use crate::safety::SqlSafetyValidator;
use crate::schema::SchemaModel;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const UNPARSABLE_CONFIDENCE: f64 = 0.3;
const DEFAULT_QUERY_TYPE: &str = "unspecified";
const PLACEHOLDER_SQL: &str = "SELECT 'Unable to parse the generated response' AS message";

lazy_static! {
    static ref SQL_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid fence pattern");
    static ref STATEMENT_START: Regex = Regex::new(r"(?im)^\s*(select|with)\b").expect("valid statement pattern");
}

const SYSTEM_PROMPT: &str = "You are an expert SQL analyst. You translate business questions into \
precise SQL for the database described below. You only ever write read-only SELECT queries and never \
produce statements that modify data or schema.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlGenerationResult {
    pub sql: String,
    pub explanation: String,
    /// In `[0, 1]`
    pub confidence: f64,
    pub tables_used: Vec<String>,
    pub query_type: String,
    /// Set when the completion could not be read in the expected shape
    pub degraded: bool,
}

/// A completion response resolved against the expected output shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCompletion {
    Structured(SqlGenerationResult),
    PlainText(SqlGenerationResult),
    Unparsable { reason: String },
}

impl ParsedCompletion {
    pub fn parse(response: &CompletionResponse) -> Self {
        match response {
            CompletionResponse::Structured(Value::Object(fields)) => from_fields(fields),
            CompletionResponse::Structured(other) => parse_text(&other.to_string(), 0),
            CompletionResponse::Text(text) => parse_text(text, 0),
        }
    }

    pub fn into_result(self) -> SqlGenerationResult {
        match self {
            ParsedCompletion::Structured(result) | ParsedCompletion::PlainText(result) => result,
            ParsedCompletion::Unparsable { reason } => SqlGenerationResult {
                sql: PLACEHOLDER_SQL.to_string(),
                explanation: format!("The generated response could not be parsed: {}", reason),
                confidence: UNPARSABLE_CONFIDENCE,
                tables_used: Vec::new(),
                query_type: "parse_error".to_string(),
                degraded: true,
            },
        }
    }
}

fn from_fields(fields: &Map<String, Value>) -> ParsedCompletion {
    let sql = match fields.get("sql").and_then(Value::as_str).map(str::trim) {
        Some(sql) if !sql.is_empty() => sql.to_string(),
        _ => {
            return ParsedCompletion::Unparsable {
                reason: "response has no `sql` field".to_string(),
            }
        }
    };

    let confidence = fields
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .map(clamp_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let tables_used = fields
        .get("tables_used")
        .and_then(Value::as_array)
        .map(|tables| tables.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    ParsedCompletion::Structured(SqlGenerationResult {
        sql,
        explanation: fields
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence,
        tables_used,
        query_type: fields
            .get("query_type")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_QUERY_TYPE)
            .to_string(),
        degraded: false,
    })
}

fn parse_text(text: &str, depth: u8) -> ParsedCompletion {
    let unfenced = SQL_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    match serde_json::from_str::<Value>(unfenced) {
        Ok(Value::Object(fields)) => return from_fields(&fields),
        // JSON-encoded string wrapping the actual payload
        Ok(Value::String(inner)) if depth == 0 => return parse_text(&inner, depth + 1),
        _ => {}
    }

    match extract_sql(text) {
        Some(sql) => ParsedCompletion::PlainText(SqlGenerationResult {
            sql,
            explanation: String::new(),
            confidence: DEFAULT_CONFIDENCE,
            tables_used: Vec::new(),
            query_type: DEFAULT_QUERY_TYPE.to_string(),
            degraded: true,
        }),
        None => ParsedCompletion::Unparsable {
            reason: "response is neither JSON nor a SQL statement".to_string(),
        },
    }
}

/// First SELECT/WITH statement in free text, preferring fenced code blocks.
pub fn extract_sql(text: &str) -> Option<String> {
    let from_fence = SQL_FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|block| STATEMENT_START.is_match(block));

    let candidate = match from_fence {
        Some(block) => block,
        None => {
            let start = STATEMENT_START.find(text)?.start();
            text[start..].split("```").next().unwrap_or_default()
        }
    };

    let statement = candidate.split(';').next().unwrap_or_default().trim();
    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// JSON schema of the structured generation output.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sql": {"type": "string", "description": "The generated SQL query"},
            "explanation": {"type": "string", "description": "Plain-language explanation of the query logic"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0, "description": "Confidence between 0.0 and 1.0"},
            "tables_used": {"type": "array", "items": {"type": "string"}, "description": "Tables referenced by the query"},
            "query_type": {"type": "string", "description": "Short label describing the kind of query"}
        },
        "required": ["sql", "explanation", "confidence", "tables_used", "query_type"]
    })
}

/// Render the schema as prompt text. Tables iterate by name so the output is stable.
pub fn describe_schema(schema: &SchemaModel) -> String {
    let tables = schema
        .tables
        .iter()
        .map(|(name, table)| {
            let mut lines = vec![format!("Table: {}", name)];
            if table.has_comment() {
                lines.push(format!("Description: {}", table.comment.trim()));
            }
            lines.push("Columns:".to_string());
            lines.extend(table.columns.iter().map(|column| {
                let nullability = if column.nullable { "nullable" } else { "not null" };
                let mut line = format!("  - {} ({}, {})", column.name, column.data_type, nullability);
                if column.has_comment() {
                    line.push_str(&format!(" - {}", column.comment.trim()));
                }
                line
            }));
            if !table.primary_keys.is_empty() {
                lines.push(format!("Primary key: {}", table.primary_keys.iter().join(", ")));
            }
            if !table.foreign_keys.is_empty() {
                lines.push("Foreign keys:".to_string());
                lines.extend(table.foreign_keys.iter().map(|fk| {
                    format!(
                        "  - ({}) -> {}({})",
                        fk.constrained_columns.join(", "),
                        fk.referred_table,
                        fk.referred_columns.join(", ")
                    )
                }));
            }
            format!("\n{}\n", lines.join("\n"))
        })
        .collect::<String>();

    format!(
        "Database: {}\n\nAvailable tables and columns:\n{}",
        schema.database_name, tables
    )
}

pub struct PromptComposer {
    completion: Arc<dyn CompletionService>,
    validator: Arc<SqlSafetyValidator>,
    dialect: Dialect,
    max_rows: usize,
    model: String,
    timeout: Duration,
}

impl PromptComposer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        validator: Arc<SqlSafetyValidator>,
        dialect: Dialect,
        max_rows: usize,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            validator,
            dialect,
            max_rows,
            model: model.into(),
            timeout,
        }
    }

    pub fn build_request(&self, user_query: &str, schema: &SchemaModel) -> CompletionRequest {
        let user = format!(
            "Database schema ({dialect}):\n{schema}\n\
             User question: {query}\n\n\
             Rules:\n\
             1. Generate only a single SELECT query; never INSERT, UPDATE, DELETE or any DDL.\n\
             2. Write syntactically valid {dialect} SQL.\n\
             3. Always include a LIMIT clause of at most {max} rows.\n\
             4. Use precise WHERE conditions and JOINs on the documented keys.\n\
             5. Use LIKE for fuzzy text matching.\n\
             6. Use the table descriptions and column comments to understand business terms and match the question's intent.\n\
             7. When a column name is ambiguous, pick the column whose comment matches the question.\n\
             8. Choose tables according to the business purpose given in their descriptions.",
            dialect = self.dialect,
            schema = describe_schema(schema),
            query = user_query.trim(),
            max = self.max_rows,
        );

        CompletionRequest::structured(SYSTEM_PROMPT, user, output_schema()).with_model(self.model.clone())
    }

    /// Generate, row-cap and validate SQL for a question.
    pub async fn generate(&self, user_query: &str, schema: &SchemaModel) -> Result<SqlGenerationResult> {
        let request = self.build_request(user_query, schema);
        debug!("Generation prompt:\n{}", request.user);

        let response = bounded("SQL generation", self.timeout, self.completion.complete(request)).await?;
        let parsed = ParsedCompletion::parse(&response);
        let mut result = parsed.into_result();
        if result.degraded {
            warn!(
                "Completion response was not in the expected shape; degraded result with confidence {}",
                result.confidence
            );
        }

        result.sql = enforce_row_limit(&result.sql, self.max_rows);
        self.validator.validate(&result.sql).await?;

        info!("Generated SQL (confidence {:.2}): {}", result.confidence, result.sql);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, ForeignKey, TableSchema};

    fn text(t: &str) -> CompletionResponse {
        CompletionResponse::Text(t.to_string())
    }

    #[test]
    fn test_structured_defaults_and_clamp() {
        let parsed = ParsedCompletion::parse(&CompletionResponse::Structured(json!({
            "sql": "SELECT 1",
            "confidence": 3.2
        })));
        let ParsedCompletion::Structured(result) = parsed else {
            panic!("expected structured result");
        };
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.query_type, "unspecified");
        assert!(result.explanation.is_empty());
        assert!(!result.degraded);
    }

    #[test]
    fn test_missing_sql_is_unparsable() {
        let result = ParsedCompletion::parse(&CompletionResponse::Structured(json!({
            "explanation": "forgot the query"
        })))
        .into_result();
        assert!(result.degraded);
        assert!(result.confidence <= 0.5);
        assert!(result.explanation.contains("no `sql` field"));
        assert!(result.sql.starts_with("SELECT"));
    }

    #[test]
    fn test_fenced_json_string() {
        let parsed = ParsedCompletion::parse(&text(
            "```json\n{\"sql\": \"SELECT name FROM products\", \"confidence\": 0.9, \"tables_used\": [\"products\"]}\n```",
        ));
        let ParsedCompletion::Structured(result) = parsed else {
            panic!("expected structured result");
        };
        assert_eq!(result.tables_used, vec!["products"]);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_json_encoded_string() {
        let encoded = serde_json::to_string("{\"sql\": \"SELECT 1\"}").unwrap();
        assert!(matches!(ParsedCompletion::parse(&text(&encoded)), ParsedCompletion::Structured(_)));
    }

    #[test]
    fn test_plain_text_sql() {
        let parsed = ParsedCompletion::parse(&text(
            "Here is the query:\n\nSELECT region, SUM(amount) FROM sales GROUP BY region;\nIt sums sales.",
        ));
        let ParsedCompletion::PlainText(result) = parsed else {
            panic!("expected plain text result");
        };
        assert_eq!(result.sql, "SELECT region, SUM(amount) FROM sales GROUP BY region");
        assert!(result.degraded);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_prose_is_unparsable() {
        assert!(matches!(
            ParsedCompletion::parse(&text("I cannot answer that.")),
            ParsedCompletion::Unparsable { .. }
        ));
    }

    #[test]
    fn test_nan_confidence_is_zero() {
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(-1.0), 0.0);
    }

    #[test]
    fn test_describe_schema_is_ordered() {
        let mut schema = SchemaModel {
            database_name: "shop".to_string(),
            ..Default::default()
        };
        for name in ["orders", "customers"] {
            schema.tables.insert(
                name.to_string(),
                TableSchema {
                    name: name.to_string(),
                    comment: format!("All {}", name),
                    columns: vec![ColumnSchema {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                        default: None,
                        comment: "Identifier".to_string(),
                    }],
                    primary_keys: ["id".to_string()].into_iter().collect(),
                    foreign_keys: if name == "orders" {
                        vec![ForeignKey {
                            constrained_columns: vec!["customer_id".to_string()],
                            referred_table: "customers".to_string(),
                            referred_columns: vec!["id".to_string()],
                        }]
                    } else {
                        Vec::new()
                    },
                    indexes: Vec::new(),
                },
            );
        }

        let text = describe_schema(&schema);
        assert!(text.find("Table: customers").unwrap() < text.find("Table: orders").unwrap());
        assert!(text.contains("  - id (integer, not null) - Identifier"));
        assert!(text.contains("  - (customer_id) -> customers(id)"));
        assert_eq!(text, describe_schema(&schema.clone()));
    }

    #[test]
    fn test_describe_schema_layout() {
        let empty = SchemaModel {
            database_name: "shop".to_string(),
            ..Default::default()
        };
        assert_eq!(describe_schema(&empty), "Database: shop\n\nAvailable tables and columns:\n");

        let mut schema = empty.clone();
        schema.tables.insert(
            "orders".to_string(),
            TableSchema {
                name: "orders".to_string(),
                comment: " Customer orders ".to_string(),
                columns: vec![
                    ColumnSchema {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                        default: None,
                        comment: String::new(),
                    },
                    ColumnSchema {
                        name: "customer_id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: true,
                        default: None,
                        comment: "Buyer".to_string(),
                    },
                ],
                primary_keys: ["id".to_string()].into_iter().collect(),
                foreign_keys: vec![ForeignKey {
                    constrained_columns: vec!["customer_id".to_string()],
                    referred_table: "customers".to_string(),
                    referred_columns: vec!["id".to_string()],
                }],
                indexes: Vec::new(),
            },
        );
        schema.tables.insert(
            "tags".to_string(),
            TableSchema {
                name: "tags".to_string(),
                comment: String::new(),
                columns: vec![ColumnSchema {
                    name: "label".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    default: None,
                    comment: String::new(),
                }],
                primary_keys: Default::default(),
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
            },
        );

        assert_eq!(
            describe_schema(&schema),
            "Database: shop\n\nAvailable tables and columns:\n\
             \nTable: orders\n\
             Description: Customer orders\n\
             Columns:\n\
             \x20 - id (integer, not null)\n\
             \x20 - customer_id (integer, nullable) - Buyer\n\
             Primary key: id\n\
             Foreign keys:\n\
             \x20 - (customer_id) -> customers(id)\n\
             \nTable: tags\n\
             Columns:\n\
             \x20 - label (text, nullable)\n"
        );
    }
}
