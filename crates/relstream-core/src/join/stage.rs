use serde::{Deserialize, Serialize};

use relstream_types::{ColumnRef, Inclusion, PredicateOp, PredicateSpec, TableDef};

/// How a stage is joined to the stages before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    Cross,
}

impl JoinType {
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }

    /// Whether rows of the joined stage may be absent.
    #[must_use]
    pub fn is_nullable(self) -> bool {
        matches!(self, Self::LeftOuter)
    }
}

/// Operator of a join's ON condition, relating the stage's local column to
/// columns of earlier stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOperator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Between,
    NotBetween,
}

impl JoinOperator {
    /// The equivalent binary predicate operator, `None` for ranges.
    #[must_use]
    pub fn comparison(self) -> Option<PredicateOp> {
        match self {
            Self::Equal => Some(PredicateOp::Equal),
            Self::NotEqual => Some(PredicateOp::NotEqual),
            Self::LessThan => Some(PredicateOp::LessThan),
            Self::LessOrEqual => Some(PredicateOp::LessOrEqual),
            Self::GreaterThan => Some(PredicateOp::GreaterThan),
            Self::GreaterOrEqual => Some(PredicateOp::GreaterOrEqual),
            Self::Between | Self::NotBetween => None,
        }
    }

    /// Number of foreign columns the operator relates to.
    #[must_use]
    pub fn foreign_arity(self) -> usize {
        if self.comparison().is_some() {
            1
        } else {
            2
        }
    }
}

/// ON condition of a non-driving stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub operator: JoinOperator,
    /// Column of this stage's table.
    pub local: String,
    /// Columns of earlier stages: one for comparisons, `[start, end]` for ranges.
    pub foreign: Vec<ColumnRef>,
    #[serde(default)]
    pub inclusion: Inclusion,
}

/// One table of a join together with how it attaches and what filters it.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinStage {
    pub table: TableDef,
    /// `None` for the driving (first) stage.
    pub join_type: Option<JoinType>,
    pub condition: Option<JoinCondition>,
    /// WHERE predicates on this stage's columns.
    pub predicates: Vec<PredicateSpec>,
}

impl JoinStage {
    /// The driving stage.
    #[must_use]
    pub fn from(table: TableDef) -> Self {
        Self {
            table,
            join_type: None,
            condition: None,
            predicates: Vec::new(),
        }
    }

    /// A stage joined on `local <operator> foreign`.
    #[must_use]
    pub fn join(
        table: TableDef,
        join_type: JoinType,
        operator: JoinOperator,
        local: impl Into<String>,
        foreign: Vec<ColumnRef>,
    ) -> Self {
        Self {
            table,
            join_type: Some(join_type),
            condition: Some(JoinCondition {
                operator,
                local: local.into(),
                foreign,
                inclusion: Inclusion::default(),
            }),
            predicates: Vec::new(),
        }
    }

    /// A stage joined without a condition.
    #[must_use]
    pub fn cross(table: TableDef) -> Self {
        Self {
            table,
            join_type: Some(JoinType::Cross),
            condition: None,
            predicates: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_inclusion(mut self, inclusion: Inclusion) -> Self {
        if let Some(condition) = &mut self.condition {
            condition.inclusion = inclusion;
        }
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: PredicateSpec) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.join_type.is_some_and(JoinType::is_nullable)
    }
}

#[cfg(test)]
mod tests {
    use relstream_types::{ColumnDef, TableId};

    use super::*;

    fn table(name: &str) -> TableDef {
        TableDef::new(TableId::new("db", name), [ColumnDef::new("id")])
    }

    #[test]
    fn operator_arity() {
        assert_eq!(JoinOperator::Equal.foreign_arity(), 1);
        assert_eq!(JoinOperator::NotBetween.foreign_arity(), 2);
        assert_eq!(JoinOperator::GreaterThan.comparison(), Some(PredicateOp::GreaterThan));
    }

    #[test]
    fn only_left_outer_is_nullable() {
        assert!(JoinStage::join(
            table("b"),
            JoinType::LeftOuter,
            JoinOperator::Equal,
            "id",
            vec![ColumnRef::new(TableId::new("db", "a"), "id")],
        )
        .is_nullable());
        assert!(!JoinStage::cross(table("c")).is_nullable());
        assert!(!JoinStage::from(table("a")).is_nullable());
    }

    #[test]
    fn join_type_from_yaml_name() {
        let ty: JoinType = serde_json::from_str("\"left_outer\"").unwrap();
        assert_eq!(ty, JoinType::LeftOuter);
        assert_eq!(ty.sql(), "LEFT JOIN");
    }
}
