use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatBiError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SQL validation failed: {reason}")]
    Validation { sql: String, reason: String },

    #[error("SQL execution failed: {0}")]
    Execution(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("{operation} is not supported for {dialect}")]
    UnsupportedDialect { dialect: String, operation: String },

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatBiError>;

/// Machine-readable failure taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    ValidationError,
    ExecutionError,
    MetadataError,
    CompletionError,
    TimeoutError,
    InvalidInput,
    ConfigError,
    GenerationDegraded,
    NarrativeUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::MetadataError => "MetadataError",
            ErrorKind::CompletionError => "CompletionError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::GenerationDegraded => "GenerationDegraded",
            ErrorKind::NarrativeUnavailable => "NarrativeUnavailable",
        };
        write!(f, "{}", label)
    }
}

impl ChatBiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatBiError::Connection(_) => ErrorKind::ConnectionError,
            ChatBiError::Validation { .. } => ErrorKind::ValidationError,
            ChatBiError::Execution(_) | ChatBiError::Json(_) => ErrorKind::ExecutionError,
            ChatBiError::Metadata(_)
            | ChatBiError::TableNotFound(_)
            | ChatBiError::ColumnNotFound { .. }
            | ChatBiError::UnsupportedDialect { .. } => ErrorKind::MetadataError,
            ChatBiError::Completion(_) => ErrorKind::CompletionError,
            ChatBiError::Timeout { .. } => ErrorKind::TimeoutError,
            ChatBiError::InvalidInput(_) => ErrorKind::InvalidInput,
            ChatBiError::Config(_) => ErrorKind::ConfigError,
        }
    }

    /// SQL the failure relates to, when the error carries it.
    pub fn offending_sql(&self) -> Option<&str> {
        match self {
            ChatBiError::Validation { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub(crate) fn validation(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        ChatBiError::Validation {
            sql: sql.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for ChatBiError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ChatBiError::Connection(error.to_string()),
            sqlx::Error::Database(db_error) => ChatBiError::Execution(db_error.message().to_string()),
            other => ChatBiError::Execution(other.to_string()),
        }
    }
}

/// Run an external call under a deadline. On expiry the call's future is dropped.
pub(crate) async fn bounded<T, F>(operation: &str, after: Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(ChatBiError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}

/// Structured failure returned to callers of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub user_query: String,
    pub sql: Option<String>,
}

impl PipelineFailure {
    pub fn from_error(error: &ChatBiError, user_query: &str) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            user_query: user_query.to_string(),
            sql: error.offending_sql().map(str::to_string),
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}
