//! Runtime configuration loaded from the environment (and `.env`).

use crate::db::Dialect;
use crate::error::{ChatBiError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub dialect: Dialect,
    pub db_max_connections: u32,
    pub db_timeout: Duration,
    pub max_results_limit: usize,
    pub max_query_length: usize,
    pub api_key: Option<String>,
    pub llm_base_url: String,
    pub sql_model: String,
    pub analysis_model: String,
    pub completion_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from the environment; `database_url` takes precedence over `DATABASE_URL`.
    pub fn load(database_url: Option<String>) -> Result<Self> {
        if dotenv::dotenv().is_err() {
            warn!("No .env file found. Using system environment variables.");
        } else {
            info!("Loaded environment variables from .env file");
        }

        let database_url = match database_url {
            Some(url) => url,
            None => env::var("DATABASE_URL")
                .or_else(|_| env::var("DB_URL"))
                .map_err(|_| ChatBiError::Config("DATABASE_URL environment variable not set".to_string()))?,
        };
        let dialect = Dialect::from_url(&database_url)?;

        let sql_model = env::var("SQL_MODEL")
            .or_else(|_| env::var("OPENAI_MODEL"))
            .unwrap_or_else(|_| "gpt-4o-mini".into());
        let analysis_model = env::var("ANALYSIS_MODEL").unwrap_or_else(|_| sql_model.clone());

        let config = Self {
            database_url,
            dialect,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            db_timeout: Duration::from_secs(parse_var("DB_TIMEOUT_SECS", 30)?),
            max_results_limit: parse_var("MAX_RESULTS_LIMIT", 1000)?,
            max_query_length: parse_var("MAX_QUERY_LENGTH", 1000)?,
            api_key: env::var("OPENAI_API_KEY").or_else(|_| env::var("LLM_API_KEY")).ok(),
            llm_base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            sql_model,
            analysis_model,
            completion_timeout: Duration::from_secs(parse_var("COMPLETION_TIMEOUT_SECS", 60)?),
        };

        info!(
            "Configuration: dialect={}, row cap={}, db timeout={:?}, completion timeout={:?}",
            config.dialect, config.max_results_limit, config.db_timeout, config.completion_timeout
        );

        Ok(config)
    }

    /// Replace the database URL (e.g. from a CLI flag) and re-derive the dialect.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        self.dialect = Dialect::from_url(&url)?;
        self.database_url = url;
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_results_limit == 0 {
            return Err(ChatBiError::Config("MAX_RESULTS_LIMIT must be greater than zero".to_string()));
        }
        if self.db_max_connections == 0 {
            return Err(ChatBiError::Config("DB_MAX_CONNECTIONS must be greater than zero".to_string()));
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ChatBiError::Config(
                "OPENAI_API_KEY is not set; SQL generation needs a completion service key".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ChatBiError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
