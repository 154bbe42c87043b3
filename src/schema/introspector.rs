//! Schema introspection with a per-table cache
//!
//! Table schemas are read lazily from the store and cached as `Arc<TableSchema>`.
//! Every slot carries an epoch that comment updates bump, so a fetch that raced an
//! update never re-inserts what it read before the update landed.

use crate::db::{Dialect, WarehouseStore};
use crate::error::{bounded, ChatBiError, Result};
use crate::schema::{SchemaModel, TableSchema, TableSummary};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct CacheSlot {
    epoch: u64,
    schema: Option<Arc<TableSchema>>,
}

pub struct SchemaIntrospector {
    store: Arc<dyn WarehouseStore>,
    db_timeout: Duration,
    slots: DashMap<String, CacheSlot>,
}

impl SchemaIntrospector {
    pub fn new(store: Arc<dyn WarehouseStore>, db_timeout: Duration) -> Self {
        Self {
            store,
            db_timeout,
            slots: DashMap::new(),
        }
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let mut tables = bounded("Listing tables", self.db_timeout, self.store.list_tables()).await?;
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    pub async fn get_table_schema(&self, table: &str, force_refresh: bool) -> Result<Arc<TableSchema>> {
        let observed_epoch = match self.slots.get(table) {
            Some(slot) => {
                if let (false, Some(schema)) = (force_refresh, slot.schema.as_ref()) {
                    return Ok(Arc::clone(schema));
                }
                slot.epoch
            }
            None => 0,
        };

        debug!("Loading schema for table {}", table);
        let schema = Arc::new(self.fetch_table_schema(table).await?);

        let mut slot = self.slots.entry(table.to_string()).or_default();
        if slot.epoch == observed_epoch {
            slot.schema = Some(Arc::clone(&schema));
        } else {
            warn!("Schema for {} changed while it was being read; not caching", table);
        }
        Ok(schema)
    }

    async fn fetch_table_schema(&self, table: &str) -> Result<TableSchema> {
        let store = &self.store;
        let columns = bounded("Reading columns", self.db_timeout, store.columns(table)).await?;
        if columns.is_empty() {
            return Err(ChatBiError::TableNotFound(table.to_string()));
        }

        let (comment, primary_keys, foreign_keys, indexes) = tokio::try_join!(
            bounded("Reading table comment", self.db_timeout, store.table_comment(table)),
            bounded("Reading primary keys", self.db_timeout, store.primary_keys(table)),
            bounded("Reading foreign keys", self.db_timeout, store.foreign_keys(table)),
            bounded("Reading indexes", self.db_timeout, store.indexes(table)),
        )?;

        Ok(TableSchema {
            name: table.to_string(),
            comment,
            columns,
            primary_keys: primary_keys.into_iter().collect(),
            foreign_keys,
            indexes,
        })
    }

    /// Every table in the database, read through the cache.
    pub async fn get_database_schema(&self) -> Result<SchemaModel> {
        let mut model = SchemaModel {
            database_name: self.store.database_name().to_string(),
            ..Default::default()
        };

        for table in self.list_tables().await? {
            match self.get_table_schema(&table, false).await {
                Ok(schema) => {
                    model.tables.insert(table, schema.as_ref().clone());
                }
                // Dropped between listing and reading
                Err(ChatBiError::TableNotFound(_)) => warn!("Table {} disappeared during introspection", table),
                Err(e) => return Err(e),
            }
        }

        info!("Loaded schema for {} tables", model.tables.len());
        Ok(model)
    }

    pub async fn update_table_comment(&self, table: &str, comment: &str) -> Result<()> {
        let dialect = self.store.dialect();
        let ddl = dialect.table_comment_ddl(table, comment)?;
        self.ensure_table_exists(table).await?;

        if let Err(e) = bounded("Updating table comment", self.db_timeout, self.store.execute_ddl(&ddl)).await {
            error!("Failed to update comment on table {}: {}", table, e);
            return Err(e);
        }

        self.invalidate(table);
        info!("Updated comment on table {}", table);
        Ok(())
    }

    /// `column_definition` is only used by MySQL; when absent it is rebuilt from the
    /// column's current metadata.
    pub async fn update_column_comment(
        &self,
        table: &str,
        column: &str,
        comment: &str,
        column_definition: Option<&str>,
    ) -> Result<()> {
        let dialect = self.store.dialect();
        if !dialect.supports_comments() {
            return Err(dialect.unsupported("Updating column comments"));
        }
        self.ensure_table_exists(table).await?;

        let columns = bounded("Reading columns", self.db_timeout, self.store.columns(table)).await?;
        let current = columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| ChatBiError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })?;

        let definition = match (column_definition, dialect) {
            (Some(definition), _) => Some(definition.to_string()),
            (None, Dialect::MySql) => Some(dialect.mysql_column_definition(current)),
            (None, _) => None,
        };
        let ddl = dialect.column_comment_ddl(table, column, comment, definition.as_deref())?;

        if let Err(e) = bounded("Updating column comment", self.db_timeout, self.store.execute_ddl(&ddl)).await {
            error!("Failed to update comment on {}.{}: {}", table, column, e);
            return Err(e);
        }

        self.invalidate(table);
        info!("Updated comment on column {}.{}", table, column);
        Ok(())
    }

    async fn ensure_table_exists(&self, table: &str) -> Result<()> {
        if self.list_tables().await?.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(ChatBiError::TableNotFound(table.to_string()))
        }
    }

    fn invalidate(&self, table: &str) {
        let mut slot = self.slots.entry(table.to_string()).or_default();
        slot.epoch += 1;
        slot.schema = None;
    }

    pub fn clear_cache(&self) {
        for mut slot in self.slots.iter_mut() {
            slot.epoch += 1;
            slot.schema = None;
        }
        info!("Schema cache cleared");
    }

    /// The cached schema of a table, without touching the store.
    pub fn cached_table(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.slots.get(table).and_then(|slot| slot.schema.clone())
    }

    pub async fn table_summaries(&self) -> Result<Vec<TableSummary>> {
        let model = self.get_database_schema().await?;
        Ok(model.tables.values().map(TableSchema::summary).collect())
    }

    pub fn store(&self) -> &Arc<dyn WarehouseStore> {
        &self.store
    }
}
