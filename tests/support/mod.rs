//! In-memory doubles for the warehouse and the completion service
#![allow(dead_code)]

use async_trait::async_trait;
use chatbi::db::FetchedRows;
use chatbi::error::{ChatBiError, Result};
use chatbi::schema::{ColumnSchema, ForeignKey, IndexInfo};
use chatbi::{CompletionRequest, CompletionResponse, CompletionService, Dialect, Row, WarehouseStore};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub comment: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

pub fn column(name: &str, data_type: &str) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
        default: None,
        comment: String::new(),
    }
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).expect("row object"))
        .collect()
}

/// Warehouse held in memory. Comment DDL in PostgreSQL form is applied to the
/// stored metadata; reads return whichever scripted result matches the SQL.
pub struct MemoryWarehouse {
    dialect: Dialect,
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    results: Mutex<Vec<(String, FetchedRows)>>,
    pub executed: Mutex<Vec<String>>,
    pub ddl: Mutex<Vec<String>>,
    pub column_reads: AtomicUsize,
    pub column_delay: Mutex<Option<Duration>>,
    pub dry_run_error: Mutex<Option<String>>,
    pub fetch_error: Mutex<Option<String>>,
    pub ddl_error: Mutex<Option<String>>,
}

impl MemoryWarehouse {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: Mutex::new(BTreeMap::new()),
            results: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            ddl: Mutex::new(Vec::new()),
            column_reads: AtomicUsize::new(0),
            column_delay: Mutex::new(None),
            dry_run_error: Mutex::new(None),
            fetch_error: Mutex::new(None),
            ddl_error: Mutex::new(None),
        }
    }

    pub fn with_table(self, name: &str, table: MemoryTable) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), table);
        self
    }

    /// Reads whose SQL contains `pattern` return `rows`.
    pub fn with_result(self, pattern: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.results.lock().unwrap().push((
            pattern.to_string(),
            FetchedRows {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        ));
        self
    }

    pub fn last_executed(&self) -> Option<String> {
        self.executed.lock().unwrap().last().cloned()
    }

    fn table(&self, name: &str) -> Option<MemoryTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    fn apply_comment(&self, statement: &str) -> Result<()> {
        let table_re = Regex::new(r#"^COMMENT ON TABLE "([^"]+)" IS '(.*)'$"#).unwrap();
        let column_re = Regex::new(r#"^COMMENT ON COLUMN "([^"]+)"\."([^"]+)" IS '(.*)'$"#).unwrap();
        let mut tables = self.tables.lock().unwrap();

        if let Some(caps) = table_re.captures(statement) {
            let table = tables
                .get_mut(&caps[1])
                .ok_or_else(|| ChatBiError::Execution(format!("relation \"{}\" does not exist", &caps[1])))?;
            table.comment = caps[2].replace("''", "'");
            return Ok(());
        }
        if let Some(caps) = column_re.captures(statement) {
            let table = tables
                .get_mut(&caps[1])
                .ok_or_else(|| ChatBiError::Execution(format!("relation \"{}\" does not exist", &caps[1])))?;
            let column = table
                .columns
                .iter_mut()
                .find(|c| c.name == caps[2])
                .ok_or_else(|| ChatBiError::Execution(format!("column \"{}\" does not exist", &caps[2])))?;
            column.comment = caps[3].replace("''", "'");
            return Ok(());
        }
        Err(ChatBiError::Execution(format!("unsupported statement: {}", statement)))
    }
}

#[async_trait]
impl WarehouseStore for MemoryWarehouse {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database_name(&self) -> &str {
        "memory"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn table_comment(&self, table: &str) -> Result<String> {
        Ok(self.table(table).map(|t| t.comment).unwrap_or_default())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        self.column_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.column_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.table(table).map(|t| t.columns).unwrap_or_default())
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table).map(|t| t.primary_keys).unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.table(table).map(|t| t.foreign_keys).unwrap_or_default())
    }

    async fn indexes(&self, _table: &str) -> Result<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        self.ddl.lock().unwrap().push(statement.to_string());
        if let Some(message) = self.ddl_error.lock().unwrap().clone() {
            return Err(ChatBiError::Execution(message));
        }
        self.apply_comment(statement)
    }

    async fn fetch_rows(&self, sql: &str, _params: &[Value]) -> Result<FetchedRows> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(message) = self.fetch_error.lock().unwrap().clone() {
            return Err(ChatBiError::Execution(message));
        }
        let results = self.results.lock().unwrap();
        Ok(results
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, fetched)| fetched.clone())
            .unwrap_or_default())
    }

    async fn dry_run(&self, _sql: &str) -> Result<()> {
        match self.dry_run_error.lock().unwrap().clone() {
            Some(message) => Err(ChatBiError::Execution(message)),
            None => Ok(()),
        }
    }
}

/// Completion service that replays queued responses in order.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<CompletionResponse>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub delay: Mutex<Option<Duration>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn structured(self, value: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(CompletionResponse::Structured(value)));
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(CompletionResponse::Text(text.to_string())));
        self
    }

    pub fn failing(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(ChatBiError::Completion(message.to_string())));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatBiError::Completion("no scripted response left".to_string())))
    }
}

/// `sales(month, amount)` and `orders(id, customer, amount)`.
pub fn shop_warehouse() -> MemoryWarehouse {
    let mut month = column("month", "varchar(7)");
    month.comment = "Calendar month, YYYY-MM".to_string();
    let mut amount = column("amount", "numeric(12,2)");
    amount.comment = "Net sales amount".to_string();

    MemoryWarehouse::new(Dialect::Postgres)
        .with_table(
            "sales",
            MemoryTable {
                comment: "Monthly sales totals".to_string(),
                columns: vec![month, amount],
                ..Default::default()
            },
        )
        .with_table(
            "orders",
            MemoryTable {
                comment: String::new(),
                columns: vec![
                    column("id", "integer"),
                    column("customer", "text"),
                    column("amount", "numeric(12,2)"),
                ],
                primary_keys: vec!["id".to_string()],
                ..Default::default()
            },
        )
}
