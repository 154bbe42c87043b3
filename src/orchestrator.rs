//! Request orchestration
//!
//! One question flows through generation, execution, classification and chart
//! advice; the narrative and statistics are attached afterwards. Every failure
//! comes back as a `PipelineFailure` inside the response.

use crate::classifier::{Classification, ResultClassifier};
use crate::context::PipelineContext;
use crate::error::{bounded, ChatBiError, PipelineFailure, Result};
use crate::execution::{QueryExecutor, QueryResult, Row};
use crate::llm::CompletionRequest;
use crate::prompt::{PromptComposer, SqlGenerationResult};
use crate::safety::SqlSafetyValidator;
use crate::schema::{
    MetadataCoverageReport, MetadataQuality, SchemaIntrospector, SchemaModel, TableProfile, TableProfiler,
    TableSample, TableSummary,
};
use crate::statistics::{self, ColumnStatistics};
use crate::visualization::{VisualizationAdvice, VisualizationAdvisor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Rows included in the analysis preview
const PREVIEW_ROWS: usize = 10;
/// Rows shown to the narrative model
const NARRATIVE_SAMPLE_ROWS: usize = 5;

pub const NARRATIVE_FALLBACK: &str =
    "Narrative analysis is temporarily unavailable, but the query completed successfully.";

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a data analyst. You find the useful facts in query results \
and explain them clearly to non-technical readers.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub narrative: String,
    pub narrative_available: bool,
    pub data_preview: Vec<Row>,
    pub statistics: BTreeMap<String, ColumnStatistics>,
    pub classification: Classification,
    pub visualization: VisualizationAdvice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatOutcome {
    Answered {
        sql_info: SqlGenerationResult,
        query_results: QueryResult,
        analysis: Analysis,
    },
    Failed {
        error: PipelineFailure,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: Uuid,
    pub user_query: String,
    pub success: bool,
    #[serde(flatten)]
    pub outcome: ChatOutcome,
}

impl ChatResponse {
    pub fn failure(&self) -> Option<&PipelineFailure> {
        match &self.outcome {
            ChatOutcome::Failed { error } => Some(error),
            ChatOutcome::Answered { .. } => None,
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        match &self.outcome {
            ChatOutcome::Answered { analysis, .. } => Some(analysis),
            ChatOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedQuery {
    pub query: String,
    pub description: String,
}

impl SuggestedQuery {
    fn new(query: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
        }
    }
}

pub struct Orchestrator {
    context: PipelineContext,
    introspector: Arc<SchemaIntrospector>,
    executor: Arc<QueryExecutor>,
    composer: PromptComposer,
    profiler: TableProfiler,
}

impl Orchestrator {
    pub fn new(context: PipelineContext) -> Self {
        let settings = &context.settings;
        let dialect = context.store.dialect();

        let introspector = Arc::new(SchemaIntrospector::new(Arc::clone(&context.store), settings.db_timeout));
        let executor = Arc::new(QueryExecutor::new(
            Arc::clone(&context.store),
            settings.max_results_limit,
            settings.db_timeout,
        ));
        let validator = Arc::new(SqlSafetyValidator::new(Arc::clone(&context.store), settings.db_timeout));
        let composer = PromptComposer::new(
            Arc::clone(&context.completion),
            validator,
            dialect,
            settings.max_results_limit,
            settings.sql_model.clone(),
            settings.completion_timeout,
        );
        let profiler = TableProfiler::new(Arc::clone(&introspector), Arc::clone(&executor));

        Self {
            context,
            introspector,
            executor,
            composer,
            profiler,
        }
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    fn check_question(&self, user_query: &str) -> Result<()> {
        let question = user_query.trim();
        if question.is_empty() {
            return Err(ChatBiError::InvalidInput("Question must not be empty".to_string()));
        }
        let max = self.context.settings.max_query_length;
        if question.chars().count() > max {
            return Err(ChatBiError::InvalidInput(format!(
                "Question is longer than {} characters",
                max
            )));
        }
        Ok(())
    }

    pub async fn generate_sql(&self, user_query: &str) -> Result<SqlGenerationResult> {
        self.check_question(user_query)?;
        let schema = self.introspector.get_database_schema().await?;
        self.composer.generate(user_query, &schema).await
    }

    /// Answer a question end to end. Failures are reported inside the response.
    pub async fn answer(&self, user_query: &str) -> ChatResponse {
        let request_id = Uuid::new_v4();
        info!("[{}] Answering: {}", request_id, user_query);

        let outcome = match self.try_answer(user_query).await {
            Ok((sql_info, query_results, analysis)) => ChatOutcome::Answered {
                sql_info,
                query_results,
                analysis,
            },
            Err(error) => {
                warn!("[{}] {} failure: {}", request_id, error.kind, error.message);
                ChatOutcome::Failed { error }
            }
        };

        ChatResponse {
            request_id,
            user_query: user_query.to_string(),
            success: matches!(outcome, ChatOutcome::Answered { .. }),
            outcome,
        }
    }

    pub async fn run_pipeline(&self, user_query: &str) -> ChatResponse {
        self.answer(user_query).await
    }

    async fn try_answer(
        &self,
        user_query: &str,
    ) -> std::result::Result<(SqlGenerationResult, QueryResult, Analysis), PipelineFailure> {
        let fail = |e: ChatBiError| PipelineFailure::from_error(&e, user_query);

        let sql_info = self.generate_sql(user_query).await.map_err(fail)?;
        let query_results = self
            .executor
            .execute(&sql_info.sql, &[])
            .await
            .map_err(|e| fail(e).with_sql(sql_info.sql.clone()))?;

        let analysis = self.analyze(user_query, &sql_info, &query_results).await;
        Ok((sql_info, query_results, analysis))
    }

    async fn analyze(&self, user_query: &str, sql_info: &SqlGenerationResult, result: &QueryResult) -> Analysis {
        let classification = ResultClassifier::classify(&result.executed_sql, &result.rows, &result.columns);
        let visualization = VisualizationAdvisor::suggest(&classification, &result.rows);
        let statistics = statistics::describe(&result.rows, &result.columns);

        let (narrative, narrative_available) = match self.narrative(user_query, sql_info, result, &classification).await {
            Ok(text) => (text, true),
            Err(e) => {
                warn!("Narrative unavailable: {}", e);
                (NARRATIVE_FALLBACK.to_string(), false)
            }
        };

        Analysis {
            summary: format!(
                "Found {} records with {} columns",
                result.row_count,
                result.columns.len()
            ),
            narrative,
            narrative_available,
            data_preview: result.preview(PREVIEW_ROWS),
            statistics,
            classification,
            visualization,
        }
    }

    async fn narrative(
        &self,
        user_query: &str,
        sql_info: &SqlGenerationResult,
        result: &QueryResult,
        classification: &Classification,
    ) -> Result<String> {
        let sample = serde_json::to_string_pretty(&result.preview(NARRATIVE_SAMPLE_ROWS))?;
        let prompt = format!(
            "Original question: {question}\n\
             Generated SQL: {sql}\n\
             Query explanation: {explanation}\n\n\
             Result overview:\n\
             - Rows returned: {rows}\n\
             - Column count: {column_count}\n\
             - Columns: {columns}\n\n\
             Query type:\n\
             - List query: {is_list}\n\
             - Aggregate query: {is_aggregate}\n\
             - Time series: {is_time_series}\n\n\
             First rows:\n{sample}\n\n\
             Please provide:\n\
             1. An overview of the data and the main findings\n\
             2. Statistical characteristics of the numeric data, if any\n\
             3. Possible business insights\n\
             4. An assessment of data quality\n\
             5. Suggested follow-up analyses",
            question = user_query,
            sql = sql_info.sql,
            explanation = sql_info.explanation,
            rows = result.row_count,
            column_count = result.columns.len(),
            columns = result.columns.join(", "),
            is_list = classification.is_list,
            is_aggregate = classification.is_aggregate,
            is_time_series = classification.is_time_series,
            sample = sample,
        );

        let request = CompletionRequest::text(ANALYSIS_SYSTEM_PROMPT, prompt)
            .with_model(self.context.settings.analysis_model.clone());
        let response = bounded(
            "Narrative analysis",
            self.context.settings.completion_timeout,
            self.context.completion.complete(request),
        )
        .await?;

        let text = response.as_text();
        if text.trim().is_empty() {
            return Err(ChatBiError::Completion("Empty narrative".to_string()));
        }
        Ok(text)
    }

    pub async fn get_schema(&self) -> Result<SchemaModel> {
        self.introspector.get_database_schema().await
    }

    pub async fn update_table_comment(&self, table: &str, comment: &str) -> Result<()> {
        self.introspector.update_table_comment(table, comment).await
    }

    pub async fn update_column_comment(
        &self,
        table: &str,
        column: &str,
        comment: &str,
        column_definition: Option<&str>,
    ) -> Result<()> {
        self.introspector
            .update_column_comment(table, column, comment, column_definition)
            .await
    }

    pub async fn metadata_completeness_report(&self) -> Result<MetadataCoverageReport> {
        let schema = self.introspector.get_database_schema().await?;
        Ok(MetadataCoverageReport::from_schema(&schema))
    }

    pub async fn metadata_quality(&self) -> Result<MetadataQuality> {
        Ok(self.metadata_completeness_report().await?.quality)
    }

    pub async fn table_summaries(&self) -> Result<Vec<TableSummary>> {
        self.introspector.table_summaries().await
    }

    /// Example questions, plus two for `table` when it exists.
    pub async fn suggested_queries(&self, table: Option<&str>) -> Result<Vec<SuggestedQuery>> {
        let mut suggestions = vec![
            SuggestedQuery::new("Monthly total revenue trend for this year", "Time series analysis"),
            SuggestedQuery::new("Total sales by product line last month", "Bar chart comparison"),
            SuggestedQuery::new("Top 10 customers by number of orders", "Ranking"),
        ];

        if let Some(table) = table {
            if self.introspector.list_tables().await?.iter().any(|t| t == table) {
                suggestions.push(SuggestedQuery::new(
                    format!("Show basic statistics for the {} table", table),
                    format!("Overview of the data in {}", table),
                ));
                suggestions.push(SuggestedQuery::new(
                    format!("Show the first 20 rows of the {} table", table),
                    format!("Preview {} data", table),
                ));
            }
        }
        Ok(suggestions)
    }

    pub async fn table_profile(&self, table: &str) -> Result<TableProfile> {
        self.profiler.table_profile(table).await
    }

    pub async fn sample_rows(&self, table: &str, limit: usize) -> Result<TableSample> {
        self.profiler.sample_rows(table, limit).await
    }

    pub fn clear_cache(&self) {
        self.introspector.clear_cache();
    }
}
