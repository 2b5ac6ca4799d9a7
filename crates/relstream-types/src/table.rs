//! Table metadata consumed by the stream and join compilers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
}

impl TableId {
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: None,
            table: table.into(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}.{}", self.database, schema, self.table),
            None => write!(f, "{}.{}", self.database, self.table),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Column definition. Disabled columns are never selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
        }
    }
}

/// A table and its columns, in result-set order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub id: TableId,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    #[must_use]
    pub fn new(id: TableId, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        Self {
            id,
            columns: columns.into_iter().collect(),
        }
    }

    /// Columns that take part in SELECT lists.
    pub fn enabled_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.enabled)
    }

    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.enabled_columns().count()
    }

    /// Position of `column` among the enabled columns.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.enabled_columns().position(|c| c.name == column)
    }
}

/// A column of a specific table, as referenced by join predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: TableId,
    pub column: String,
}

impl ColumnRef {
    #[must_use]
    pub fn new(table: TableId, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}
