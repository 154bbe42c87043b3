//! Explicitly owned pipeline dependencies

use crate::config::Config;
use crate::db::WarehouseStore;
use crate::llm::CompletionService;
use std::sync::Arc;
use std::time::Duration;

/// Limits and model choices shared by the pipeline components.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_results_limit: usize,
    pub max_query_length: usize,
    pub db_timeout: Duration,
    pub completion_timeout: Duration,
    pub sql_model: String,
    pub analysis_model: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_results_limit: 1000,
            max_query_length: 1000,
            db_timeout: Duration::from_secs(30),
            completion_timeout: Duration::from_secs(60),
            sql_model: "gpt-4o-mini".to_string(),
            analysis_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_results_limit: config.max_results_limit,
            max_query_length: config.max_query_length,
            db_timeout: config.db_timeout,
            completion_timeout: config.completion_timeout,
            sql_model: config.sql_model.clone(),
            analysis_model: config.analysis_model.clone(),
        }
    }
}

/// Everything a request needs: the store, the completion backend and the limits.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn WarehouseStore>,
    pub completion: Arc<dyn CompletionService>,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn WarehouseStore>,
        completion: Arc<dyn CompletionService>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            completion,
            settings,
        }
    }
}
