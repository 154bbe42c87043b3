mod support;

use chatbi::orchestrator::NARRATIVE_FALLBACK;
use chatbi::visualization::ChartBindings;
use chatbi::{ChartKind, ErrorKind, Orchestrator, PipelineContext, PipelineSettings};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{rows, shop_warehouse, MemoryWarehouse, ScriptedCompletion};

const MONTHLY_SQL: &str = "SELECT month, SUM(amount) AS total FROM sales GROUP BY month ORDER BY month";

fn monthly_warehouse() -> MemoryWarehouse {
    shop_warehouse().with_result(
        "FROM sales",
        &["month", "total"],
        rows(vec![
            json!({"month": "2024-01", "total": 120.5}),
            json!({"month": "2024-02", "total": 98.0}),
            json!({"month": "2024-03", "total": 143.25}),
        ]),
    )
}

fn monthly_generation() -> serde_json::Value {
    json!({
        "sql": MONTHLY_SQL,
        "explanation": "Sums sales per month",
        "confidence": 0.9,
        "tables_used": ["sales"],
        "query_type": "aggregation"
    })
}

fn orchestrator(
    store: Arc<MemoryWarehouse>,
    completion: Arc<ScriptedCompletion>,
    settings: PipelineSettings,
) -> Orchestrator {
    Orchestrator::new(PipelineContext::new(store, completion, settings))
}

#[tokio::test]
async fn test_monthly_trend_end_to_end() {
    let store = Arc::new(monthly_warehouse());
    let completion = Arc::new(
        ScriptedCompletion::new()
            .structured(monthly_generation())
            .text("Sales peaked in March."),
    );
    let chat = orchestrator(Arc::clone(&store), Arc::clone(&completion), PipelineSettings::default());

    let response = chat.answer("Monthly sales trend").await;
    assert!(response.success, "{:?}", response.failure());
    assert_eq!(response.user_query, "Monthly sales trend");

    let chatbi::ChatOutcome::Answered { sql_info, query_results, analysis } = &response.outcome else {
        panic!("expected an answer");
    };
    assert_eq!(sql_info.confidence, 0.9);
    assert_eq!(sql_info.tables_used, vec!["sales"]);
    assert!(!sql_info.degraded);
    assert!(query_results.executed_sql.ends_with("LIMIT 1000"));
    assert_eq!(store.last_executed().as_deref(), Some(query_results.executed_sql.as_str()));
    assert_eq!(query_results.row_count, 3);

    assert!(analysis.narrative_available);
    assert_eq!(analysis.narrative, "Sales peaked in March.");
    assert_eq!(analysis.summary, "Found 3 records with 2 columns");
    assert!(analysis.classification.is_aggregate);
    assert!(analysis.classification.is_time_series);
    assert!(!analysis.classification.is_list);

    let primary = analysis.visualization.primary_suggestion.as_ref().unwrap();
    assert_eq!(primary.chart_type, ChartKind::Line);
    assert_eq!(
        primary.bindings,
        ChartBindings::Axes {
            x_column: "month".to_string(),
            y_column: "total".to_string()
        }
    );
    assert!(analysis.statistics.contains_key("total"));

    // generation prompt carries the schema descriptions
    let requests = completion.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].output_schema.is_some());
    assert!(requests[0].user.contains("Monthly sales totals"));
    assert!(requests[0].user.contains("Net sales amount"));
    assert!(requests[1].output_schema.is_none());
}

#[tokio::test]
async fn test_narrative_failure_keeps_the_answer() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .structured(monthly_generation())
            .failing("service overloaded"),
    );
    let chat = orchestrator(Arc::new(monthly_warehouse()), completion, PipelineSettings::default());

    let response = chat.answer("Monthly sales trend").await;
    assert!(response.success);
    let analysis = response.analysis().unwrap();
    assert!(!analysis.narrative_available);
    assert_eq!(analysis.narrative, NARRATIVE_FALLBACK);
    assert_eq!(analysis.data_preview.len(), 3);
}

#[tokio::test]
async fn test_destructive_sql_is_rejected_before_execution() {
    let store = Arc::new(shop_warehouse());
    let completion = Arc::new(ScriptedCompletion::new().structured(json!({
        "sql": "DROP TABLE orders",
        "explanation": "",
        "confidence": 0.8,
        "tables_used": ["orders"],
        "query_type": "other"
    })));
    let chat = orchestrator(Arc::clone(&store), completion, PipelineSettings::default());

    let response = chat.answer("remove all orders").await;
    assert!(!response.success);
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::ValidationError);
    assert!(failure.message.contains("Dangerous SQL keyword detected: DROP"));
    assert_eq!(failure.sql.as_deref(), Some("DROP TABLE orders"));
    assert_eq!(failure.user_query, "remove all orders");
    assert!(store.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_sql_field_degrades() {
    let completion = Arc::new(ScriptedCompletion::new().structured(json!({"explanation": "no idea"})));
    let chat = orchestrator(Arc::new(shop_warehouse()), completion, PipelineSettings::default());

    let generated = chat.generate_sql("How many orders?").await.unwrap();
    assert!(generated.degraded);
    assert_eq!(generated.confidence, 0.3);
    assert_eq!(generated.query_type, "parse_error");
    assert!(generated.sql.starts_with("SELECT 'Unable to parse the generated response'"));
}

#[tokio::test]
async fn test_plain_text_completion_is_accepted() {
    let completion = Arc::new(
        ScriptedCompletion::new().text("Here you go:\n```sql\nSELECT customer FROM orders;\n```"),
    );
    let chat = orchestrator(Arc::new(shop_warehouse()), completion, PipelineSettings::default());

    let generated = chat.generate_sql("List customers").await.unwrap();
    assert!(generated.degraded);
    assert_eq!(generated.confidence, 0.5);
    assert_eq!(generated.sql, "SELECT customer FROM orders LIMIT 1000");
}

#[tokio::test]
async fn test_question_bounds() {
    let completion = Arc::new(ScriptedCompletion::new());
    let settings = PipelineSettings {
        max_query_length: 20,
        ..PipelineSettings::default()
    };
    let chat = orchestrator(Arc::new(shop_warehouse()), Arc::clone(&completion), settings);

    let empty = chat.answer("   ").await;
    assert_eq!(empty.failure().unwrap().kind, ErrorKind::InvalidInput);

    let long = chat.answer("what were the total sales per region last year").await;
    assert_eq!(long.failure().unwrap().kind, ErrorKind::InvalidInput);

    assert!(completion.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_timeout() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .structured(monthly_generation())
            .with_delay(Duration::from_millis(500)),
    );
    let settings = PipelineSettings {
        completion_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    let chat = orchestrator(Arc::new(monthly_warehouse()), completion, settings);

    let response = chat.answer("Monthly sales trend").await;
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::TimeoutError);
    assert!(failure.message.contains("SQL generation"));
}

#[tokio::test]
async fn test_dry_run_failure_is_a_syntax_error() {
    let store = Arc::new(monthly_warehouse());
    *store.dry_run_error.lock().unwrap() = Some("syntax error at or near \"FORM\"".to_string());
    let completion = Arc::new(ScriptedCompletion::new().structured(monthly_generation()));
    let chat = orchestrator(Arc::clone(&store), completion, PipelineSettings::default());

    let response = chat.answer("Monthly sales trend").await;
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::ValidationError);
    assert!(failure.message.contains("SQL syntax error"));
    assert!(store.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_execution_failure_reports_sql() {
    let store = Arc::new(monthly_warehouse());
    *store.fetch_error.lock().unwrap() = Some("permission denied for table sales".to_string());
    let completion = Arc::new(ScriptedCompletion::new().structured(monthly_generation()));
    let chat = orchestrator(Arc::clone(&store), completion, PipelineSettings::default());

    let response = chat.answer("Monthly sales trend").await;
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::ExecutionError);
    assert!(failure.message.contains("permission denied"));
    assert_eq!(failure.sql.as_deref(), Some(format!("{} LIMIT 1000", MONTHLY_SQL).as_str()));
}

#[tokio::test]
async fn test_row_cap_applies_to_generated_sql() {
    let many: Vec<_> = (0..8).map(|i| json!({"customer": format!("c{}", i)})).collect();
    let store = Arc::new(shop_warehouse().with_result("FROM orders", &["customer"], rows(many)));
    let completion = Arc::new(
        ScriptedCompletion::new()
            .structured(json!({"sql": "SELECT customer FROM orders LIMIT 500", "confidence": 1.4}))
            .text("Eight customers."),
    );
    let settings = PipelineSettings {
        max_results_limit: 5,
        ..PipelineSettings::default()
    };
    let chat = orchestrator(Arc::clone(&store), completion, settings);

    let response = chat.answer("List customers").await;
    let chatbi::ChatOutcome::Answered { sql_info, query_results, analysis } = &response.outcome else {
        panic!("expected an answer: {:?}", response.failure());
    };
    assert_eq!(sql_info.sql, "SELECT customer FROM orders LIMIT 5");
    assert_eq!(sql_info.confidence, 1.0);
    assert_eq!(query_results.row_count, 5);
    assert!(analysis.classification.is_list);
    assert!(!analysis.visualization.should_visualize);
}

#[tokio::test]
async fn test_response_serializes_with_flattened_outcome() {
    let completion = Arc::new(ScriptedCompletion::new().structured(json!({"sql": "DELETE FROM orders"})));
    let chat = orchestrator(Arc::new(shop_warehouse()), completion, PipelineSettings::default());

    let value = serde_json::to_value(chat.answer("clean up").await).unwrap();
    assert_eq!(value["success"], json!(false));
    assert_eq!(value["error"]["kind"], json!("validation_error"));
    assert!(value["request_id"].is_string());
}

#[tokio::test]
async fn test_nested_limit_still_gets_capped() {
    let completion = Arc::new(ScriptedCompletion::new().structured(json!({
        "sql": "SELECT customer FROM orders WHERE id IN (SELECT id FROM orders LIMIT 5)",
        "confidence": 0.7
    })));
    let chat = orchestrator(Arc::new(shop_warehouse()), completion, PipelineSettings::default());

    let generated = chat.generate_sql("Customers of the first orders").await.unwrap();
    assert_eq!(
        generated.sql,
        "SELECT customer FROM orders WHERE id IN (SELECT id FROM orders LIMIT 5) LIMIT 1000"
    );
}

#[tokio::test]
async fn test_completion_failure_during_generation() {
    let completion = Arc::new(ScriptedCompletion::new().failing("connection refused"));
    let chat = orchestrator(Arc::new(shop_warehouse()), completion, PipelineSettings::default());

    let response = chat.answer("How many orders?").await;
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::CompletionError);
    assert!(failure.message.contains("connection refused"));
}
