use std::path::PathBuf;

use anyhow::{anyhow, Result};
use relstream_core::join::{JoinCondition, JoinOperator, JoinStage, JoinType};
use relstream_core::DialectKind;
use relstream_types::{ColumnDef, ColumnRef, Inclusion, PredicateOp, PredicateSpec, TableDef, TableId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub version: String,
    /// `SQLite` database file the `run` command executes against.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub dialect: DialectKind,
    #[serde(default = "default_pagination")]
    pub pagination: bool,
    pub tables: Vec<TableConfig>,
    pub join: Vec<StageConfig>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

fn default_pagination() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnConfig>,
}

fn default_database() -> String {
    "main".to_string()
}

/// A column given either by name or with an explicit `enabled` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnConfig {
    Name(String),
    Full(ColumnDef),
}

impl ColumnConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Full(def) => &def.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub table: String,
    #[serde(rename = "type", default)]
    pub join_type: Option<JoinType>,
    #[serde(default)]
    pub operator: Option<JoinOperator>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub foreign: Vec<ForeignConfig>,
    #[serde(default)]
    pub inclusion: Inclusion,
    #[serde(default)]
    pub predicates: Vec<PredicateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignConfig {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateConfig {
    pub column: String,
    pub op: PredicateOp,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub inclusion: Inclusion,
}

impl TableConfig {
    pub fn id(&self) -> TableId {
        let id = TableId::new(&self.database, &self.name);
        match &self.schema {
            Some(schema) => id.with_schema(schema),
            None => id,
        }
    }

    pub fn definition(&self) -> TableDef {
        TableDef::new(
            self.id(),
            self.columns.iter().map(|column| match column {
                ColumnConfig::Name(name) => ColumnDef::new(name),
                ColumnConfig::Full(def) => def.clone(),
            }),
        )
    }
}

impl QueryConfig {
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Join stages in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage names a table that is not declared.
    pub fn join_stages(&self) -> Result<Vec<JoinStage>> {
        self.join.iter().map(|stage| self.join_stage(stage)).collect()
    }

    fn join_stage(&self, stage: &StageConfig) -> Result<JoinStage> {
        let table = self
            .table(&stage.table)
            .ok_or_else(|| anyhow!("Unknown table '{}'", stage.table))?;

        let mut foreign = Vec::with_capacity(stage.foreign.len());
        for column in &stage.foreign {
            let referenced = self
                .table(&column.table)
                .ok_or_else(|| anyhow!("Unknown foreign table '{}'", column.table))?;
            foreign.push(ColumnRef::new(referenced.id(), &column.column));
        }

        let condition = match (stage.operator, &stage.local) {
            (Some(operator), Some(local)) => Some(JoinCondition {
                operator,
                local: local.clone(),
                foreign,
                inclusion: stage.inclusion,
            }),
            _ => None,
        };

        Ok(JoinStage {
            table: table.definition(),
            join_type: stage.join_type,
            condition,
            predicates: stage
                .predicates
                .iter()
                .map(|p| {
                    PredicateSpec::new(&p.column, p.op, p.values.clone()).with_inclusion(p.inclusion)
                })
                .collect(),
        })
    }
}
