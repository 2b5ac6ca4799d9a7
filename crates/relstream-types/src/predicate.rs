//! Structural predicate and ordering descriptions.
//!
//! A [`PredicateSpec`] is the renderable form of a field predicate: a
//! column, an operator and its operands. Dialects turn it into a SQL
//! fragment; [`PredicateSpec::test`] evaluates the same predicate in memory
//! with SQL three-valued semantics collapsed to `false` for UNKNOWN.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator of a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Between,
    NotBetween,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    StartsWith,
    EndsWith,
    Contains,
}

impl PredicateOp {
    /// SQL operator for the binary comparisons.
    #[must_use]
    pub fn comparison_sql(self) -> Option<&'static str> {
        match self {
            Self::Equal => Some("="),
            Self::NotEqual => Some("<>"),
            Self::LessThan => Some("<"),
            Self::LessOrEqual => Some("<="),
            Self::GreaterThan => Some(">"),
            Self::GreaterOrEqual => Some(">="),
            _ => None,
        }
    }

    /// The operator that holds with operands swapped (`a < b` ⇔ `b > a`).
    #[must_use]
    pub fn mirrored(self) -> Self {
        match self {
            Self::LessThan => Self::GreaterThan,
            Self::LessOrEqual => Self::GreaterOrEqual,
            Self::GreaterThan => Self::LessThan,
            Self::GreaterOrEqual => Self::LessOrEqual,
            other => other,
        }
    }

    /// Number of operands the operator expects, `None` for variadic.
    #[must_use]
    pub fn arity(self) -> Option<usize> {
        match self {
            Self::IsNull | Self::IsNotNull => Some(0),
            Self::Between | Self::NotBetween => Some(2),
            Self::In | Self::NotIn => None,
            _ => Some(1),
        }
    }
}

/// Which ends of a BETWEEN range are included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    StartInclusiveEndInclusive,
    #[default]
    StartInclusiveEndExclusive,
    StartExclusiveEndInclusive,
    StartExclusiveEndExclusive,
}

impl Inclusion {
    #[must_use]
    pub fn includes_start(self) -> bool {
        matches!(
            self,
            Self::StartInclusiveEndInclusive | Self::StartInclusiveEndExclusive
        )
    }

    #[must_use]
    pub fn includes_end(self) -> bool {
        matches!(
            self,
            Self::StartInclusiveEndInclusive | Self::StartExclusiveEndInclusive
        )
    }

    /// Lower-bound comparison operator.
    #[must_use]
    pub fn start_op(self) -> &'static str {
        if self.includes_start() {
            ">="
        } else {
            ">"
        }
    }

    /// Upper-bound comparison operator.
    #[must_use]
    pub fn end_op(self) -> &'static str {
        if self.includes_end() {
            "<="
        } else {
            "<"
        }
    }

    /// Whether `value` lies in `[start, end]` under this inclusion.
    /// `None` when any comparison is UNKNOWN.
    #[must_use]
    pub fn contains(self, value: &Value, start: &Value, end: &Value) -> Option<bool> {
        let lower = value.affinity_cmp(start)?;
        let upper = value.affinity_cmp(end)?;
        let above = lower == Ordering::Greater || (lower == Ordering::Equal && self.includes_start());
        let below = upper == Ordering::Less || (upper == Ordering::Equal && self.includes_end());
        Some(above && below)
    }
}

/// Renderable predicate over a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub column: String,
    pub op: PredicateOp,
    #[serde(default)]
    pub operands: Vec<Value>,
    #[serde(default)]
    pub inclusion: Inclusion,
}

impl PredicateSpec {
    #[must_use]
    pub fn new(column: impl Into<String>, op: PredicateOp, operands: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            operands,
            inclusion: Inclusion::default(),
        }
    }

    #[must_use]
    pub fn with_inclusion(mut self, inclusion: Inclusion) -> Self {
        self.inclusion = inclusion;
        self
    }

    /// Whether the operand count matches the operator.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.op.arity() {
            Some(n) => self.operands.len() == n,
            None => !self.operands.is_empty(),
        }
    }

    /// Evaluate against a column value. UNKNOWN evaluates to `false`.
    #[must_use]
    pub fn test(&self, value: &Value) -> bool {
        let cmp_first = |expect: fn(Ordering) -> bool| {
            self.operands
                .first()
                .and_then(|operand| value.affinity_cmp(operand))
                .is_some_and(expect)
        };
        match self.op {
            PredicateOp::IsNull => value.is_null(),
            PredicateOp::IsNotNull => !value.is_null(),
            PredicateOp::Equal => cmp_first(Ordering::is_eq),
            PredicateOp::NotEqual => cmp_first(Ordering::is_ne),
            PredicateOp::LessThan => cmp_first(Ordering::is_lt),
            PredicateOp::LessOrEqual => cmp_first(Ordering::is_le),
            PredicateOp::GreaterThan => cmp_first(Ordering::is_gt),
            PredicateOp::GreaterOrEqual => cmp_first(Ordering::is_ge),
            PredicateOp::Between | PredicateOp::NotBetween => {
                let [start, end] = self.operands.as_slice() else {
                    return false;
                };
                match self.inclusion.contains(value, start, end) {
                    Some(inside) => inside == (self.op == PredicateOp::Between),
                    None => false,
                }
            }
            PredicateOp::In => self
                .operands
                .iter()
                .any(|operand| value.affinity_cmp(operand) == Some(Ordering::Equal)),
            PredicateOp::NotIn => {
                !value.is_null()
                    && self
                        .operands
                        .iter()
                        .all(|operand| value.affinity_cmp(operand).is_some_and(Ordering::is_ne))
            }
            PredicateOp::StartsWith | PredicateOp::EndsWith | PredicateOp::Contains => {
                let (Some(text), Some(needle)) = (
                    value.as_text(),
                    self.operands.first().and_then(Value::as_text),
                ) else {
                    return false;
                };
                match self.op {
                    PredicateOp::StartsWith => text.starts_with(needle),
                    PredicateOp::EndsWith => text.ends_with(needle),
                    _ => text.contains(needle),
                }
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Renderable sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    #[must_use]
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}
