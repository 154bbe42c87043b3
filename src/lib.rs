pub mod classifier;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod execution;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod safety;
pub mod schema;
pub mod statistics;
pub mod telemetry;
pub mod visualization;

pub use classifier::{Classification, ResultClassifier};
pub use config::Config;
pub use context::{PipelineContext, PipelineSettings};
pub use db::{Dialect, SqlxWarehouse, WarehouseStore};
pub use error::{ChatBiError, ErrorKind, PipelineFailure, Result};
pub use execution::{QueryExecutor, QueryResult, Row};
pub use llm::{CompletionRequest, CompletionResponse, CompletionService, OpenAiCompatibleClient};
pub use orchestrator::{Analysis, ChatOutcome, ChatResponse, Orchestrator, SuggestedQuery};
pub use prompt::{ParsedCompletion, PromptComposer, SqlGenerationResult};
pub use safety::SqlSafetyValidator;
pub use schema::{MetadataCoverageReport, SchemaIntrospector, SchemaModel, TableSchema};
pub use visualization::{ChartKind, VisualizationAdvice, VisualizationAdvisor, VisualizationSuggestion};
