//! Schema metadata model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Whole-database view handed to prompt composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaModel {
    pub database_name: String,

    /// Keyed by table name; ordered so that prompts built from it are stable.
    pub tables: BTreeMap<String, TableSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,

    /// Business description of the table; empty when absent or unsupported.
    pub comment: String,

    /// Columns in ordinal order
    pub columns: Vec<ColumnSchema>,

    pub primary_keys: BTreeSet<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,

    /// Declared type as reported by the catalog (e.g. `varchar(255)`, `integer`)
    pub data_type: String,

    pub nullable: bool,
    pub default: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Condensed per-table view used by metadata editing screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub table_name: String,
    pub table_comment: String,
    pub column_count: usize,
    pub has_primary_key: bool,
    pub has_foreign_keys: bool,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_comment(&self) -> bool {
        !self.comment.trim().is_empty()
    }

    pub fn commented_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.has_comment()).count()
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            table_name: self.name.clone(),
            table_comment: self.comment.clone(),
            column_count: self.columns.len(),
            has_primary_key: !self.primary_keys.is_empty(),
            has_foreign_keys: !self.foreign_keys.is_empty(),
        }
    }
}

impl ColumnSchema {
    pub fn has_comment(&self) -> bool {
        !self.comment.trim().is_empty()
    }

    /// Whether the declared type is numeric, judged from the type tag.
    pub fn is_numeric_type(&self) -> bool {
        let data_type = self.data_type.to_uppercase();
        ["INT", "FLOAT", "DOUBLE", "DECIMAL", "NUMERIC", "REAL"]
            .iter()
            .any(|tag| data_type.contains(tag))
    }
}
