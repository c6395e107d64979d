/// Schema Introspection Module
///
/// This module holds the column metadata produced by each dialect's
/// introspection query and the per-session cache of it. The cache decides
/// whether DDL must CREATE or ALTER a table and resolves primary keys for
/// filters and LEFT JOIN decoding.

use crate::core::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Represents a database column with its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Type as reported by the database (e.g. "int(11)", "INTEGER", "text")
    pub column_type: String,
    /// Whether the column allows NULL values
    pub nullable: bool,
    /// Default value, if the column declares one
    pub default: Option<Value>,
    /// Whether this column is (part of) the primary key
    pub is_primary: bool,
    /// Whether the database generates values for this column
    pub auto_increment: bool,
}

impl ColumnDescriptor {
    /// Creates a nullable, non-key column without default
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        ColumnDescriptor {
            name: name.into(),
            column_type: column_type.into(),
            nullable: true,
            default: None,
            is_primary: false,
            auto_increment: false,
        }
    }
}

/// Name of the first primary-key column, if any
pub fn primary_key_of(columns: &[ColumnDescriptor]) -> Option<&str> {
    columns
        .iter()
        .find(|c| c.is_primary)
        .map(|c| c.name.as_str())
}

/// Per-session column metadata, keyed by table name
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: HashMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the cached columns; the cached entry is never handed out
    pub fn get(&self, table: &str) -> Option<Vec<ColumnDescriptor>> {
        self.tables.get(table).cloned()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Caches an introspection result. Empty results are not cached so a
    /// missing table is introspected again next time.
    pub fn insert(&mut self, table: &str, columns: Vec<ColumnDescriptor>) {
        if columns.is_empty() {
            return;
        }
        self.tables.insert(table.to_string(), columns);
    }

    /// Drops one table's entry; returns whether it was cached
    pub fn invalidate(&mut self, table: &str) -> bool {
        let removed = self.tables.remove(table).is_some();
        if removed {
            debug!(table, "schema cache invalidated");
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.tables.is_empty() {
            debug!(tables = self.tables.len(), "schema cache cleared");
        }
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
