//! Join stage compilation.
//!
//! Stage `i` is aliased by the `i`-th capital letter and contributes its
//! enabled columns to the select list at a fixed offset, so a joined row can
//! be split back into per-stage entities by position.

use std::fmt::Write as _;

use relstream_types::{ColumnRef, ConfigError, Result, TableId, Value};

use super::stage::{JoinCondition, JoinStage, JoinType};
use crate::dialect::Dialect;
use crate::executor::SqlQuery;
use crate::terminator::BaseQuery;

/// Number of distinct stage aliases.
pub const MAX_STAGES: usize = 26;

/// Alias of the stage at `index`: `A`, `B`, ... `Z`.
#[must_use]
pub fn alias(index: usize) -> Option<char> {
    u8::try_from(index)
        .ok()
        .filter(|i| usize::from(*i) < MAX_STAGES)
        .map(|i| char::from(b'A' + i))
}

/// A stage resolved against its position in the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStage {
    pub index: usize,
    pub alias: char,
    pub table: TableId,
    /// Select-list expressions, `alias.column`.
    pub columns: Vec<String>,
    /// Position of this stage's first column in a joined row.
    pub offset: usize,
    pub nullable: bool,
    /// Row position that is NULL exactly when a nullable stage has no match.
    pub null_probe: Option<usize>,
}

/// A compiled join statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledJoin {
    pub stages: Vec<SqlStage>,
    /// `SELECT <columns> FROM <tables and joins>`.
    pub select: String,
    /// WHERE conditions, one per stage predicate.
    pub conditions: Vec<String>,
    /// Values bound to `conditions`, in stage order.
    pub values: Vec<Value>,
}

impl CompiledJoin {
    /// Total column count of a joined row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.stages.iter().map(|s| s.columns.len()).sum()
    }

    /// The full statement without any pushed-down pagination.
    #[must_use]
    pub fn query(&self) -> SqlQuery {
        let mut sql = self.select.clone();
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        SqlQuery::new(sql, self.values.clone())
    }

    /// The statement as a stream source base, for pushdown rendering.
    #[must_use]
    pub fn base(&self) -> BaseQuery {
        BaseQuery {
            select: self.select.clone(),
            conditions: self.conditions.clone(),
            values: self.values.clone(),
            tiebreak: Vec::new(),
        }
    }
}

/// Compile `stages` into a single SELECT statement for `dialect`.
///
/// # Errors
///
/// Returns [`Error::Config`](relstream_types::Error::Config) when the stages
/// cannot form a valid join: none given, more than [`MAX_STAGES`], tables
/// from different databases, an ON condition that references a later or
/// unknown table, or a column the table does not select.
pub fn compile_join(stages: &[JoinStage], dialect: &dyn Dialect) -> Result<CompiledJoin> {
    let Some(driving) = stages.first() else {
        return Err(ConfigError::EmptyJoin.into());
    };
    if stages.len() > MAX_STAGES {
        return Err(ConfigError::TooManyStages {
            stages: stages.len(),
            max: MAX_STAGES,
        }
        .into());
    }
    check_single_database(stages)?;

    let mut resolved = Vec::with_capacity(stages.len());
    let mut from = String::new();
    let mut conditions = Vec::new();
    let mut values = Vec::new();
    let mut offset = 0;

    for (index, stage) in stages.iter().enumerate() {
        let alias = stage_alias(index)?;
        let table_ref = dialect.table_ref(&stage.table.id);

        match (index, stage.join_type) {
            (0, None) => {
                let _ = write!(from, "FROM {table_ref} AS {alias}");
            }
            (0, Some(_)) => return Err(invalid(0, "the driving stage cannot be joined")),
            (_, None) => return Err(invalid(index, "missing join type")),
            (_, Some(JoinType::Cross)) => {
                if stage.condition.is_some() {
                    return Err(invalid(index, "a cross join takes no condition"));
                }
                let _ = write!(from, ", {table_ref} AS {alias}");
            }
            (_, Some(join_type)) => {
                let condition = stage
                    .condition
                    .as_ref()
                    .ok_or_else(|| invalid(index, "missing join condition"))?;
                let on = render_on(stages, index, condition, dialect)?;
                let _ = write!(from, " {} {table_ref} AS {alias} ON ({on})", join_type.sql());
            }
        }

        for predicate in &stage.predicates {
            if !stage.table.columns.iter().any(|c| c.name == predicate.column) {
                return Err(unknown_column(&stage.table.id, &predicate.column));
            }
            let column = qualified(alias, &predicate.column, dialect);
            let fragment = dialect.render_predicate(&column, predicate)?;
            conditions.push(fragment.sql);
            values.extend(fragment.values);
        }

        let columns: Vec<String> = stage
            .table
            .enabled_columns()
            .map(|c| qualified(alias, &c.name, dialect))
            .collect();
        let null_probe = match (&stage.condition, stage.is_nullable()) {
            (Some(condition), true) => {
                let position = stage
                    .table
                    .column_index(&condition.local)
                    .ok_or_else(|| unknown_column(&stage.table.id, &condition.local))?;
                Some(offset + position)
            }
            _ => None,
        };
        let width = columns.len();
        resolved.push(SqlStage {
            index,
            alias,
            table: stage.table.id.clone(),
            columns,
            offset,
            nullable: stage.is_nullable(),
            null_probe,
        });
        offset += width;
    }

    let select_list: Vec<&str> = resolved
        .iter()
        .flat_map(|s| s.columns.iter().map(String::as_str))
        .collect();
    let select = format!("SELECT {} {from}", select_list.join(", "));

    tracing::debug!(
        dialect = dialect.name(),
        stages = resolved.len(),
        driving = %driving.table.id,
        sql = %select,
        "compiled join"
    );

    Ok(CompiledJoin {
        stages: resolved,
        select,
        conditions,
        values,
    })
}

fn check_single_database(stages: &[JoinStage]) -> Result<()> {
    let database = &stages[0].table.id.database;
    let offending: Vec<String> = stages
        .iter()
        .enumerate()
        .filter(|(_, stage)| &stage.table.id.database != database)
        .map(|(index, stage)| format!("stage {index}: {}", stage.table.id))
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    let mut listed = vec![format!("stage 0: {}", stages[0].table.id)];
    listed.extend(offending);
    Err(ConfigError::CrossDatabaseJoin { stages: listed }.into())
}

fn render_on(
    stages: &[JoinStage],
    index: usize,
    condition: &JoinCondition,
    dialect: &dyn Dialect,
) -> Result<String> {
    let stage = &stages[index];
    let arity = condition.operator.foreign_arity();
    if condition.foreign.len() != arity {
        return Err(invalid(
            index,
            format!(
                "{:?} relates to {arity} foreign column(s), got {}",
                condition.operator,
                condition.foreign.len()
            ),
        ));
    }
    if stage.table.column_index(&condition.local).is_none() {
        return Err(unknown_column(&stage.table.id, &condition.local));
    }
    let local = qualified(stage_alias(index)?, &condition.local, dialect);

    let mut foreign = Vec::with_capacity(arity);
    for column in &condition.foreign {
        foreign.push(resolve_foreign(stages, index, column, dialect)?);
    }

    if let Some(op) = condition.operator.comparison() {
        let sql_op = op
            .mirrored()
            .comparison_sql()
            .ok_or_else(|| invalid(index, "operator has no SQL comparison"))?;
        return Ok(format!("{} {sql_op} {local}", foreign[0]));
    }

    let range = format!(
        "{local} {} {} AND {local} {} {}",
        condition.inclusion.start_op(),
        foreign[0],
        condition.inclusion.end_op(),
        foreign[1]
    );
    if condition.operator == super::stage::JoinOperator::NotBetween {
        Ok(format!("NOT ({range})"))
    } else {
        Ok(range)
    }
}

/// Qualified column of the earliest stage before `index` whose table is
/// `column.table`.
fn resolve_foreign(
    stages: &[JoinStage],
    index: usize,
    column: &ColumnRef,
    dialect: &dyn Dialect,
) -> Result<String> {
    let Some(position) = stages[..index]
        .iter()
        .position(|s| s.table.id == column.table)
    else {
        return Err(ConfigError::UnknownStageTable {
            table: column.table.to_string(),
            available: stages[..index].iter().map(|s| s.table.id.to_string()).collect(),
        }
        .into());
    };
    let table = &stages[position].table;
    if table.column_index(&column.column).is_none() {
        return Err(unknown_column(&table.id, &column.column));
    }
    Ok(qualified(stage_alias(position)?, &column.column, dialect))
}

fn stage_alias(index: usize) -> Result<char> {
    alias(index).ok_or_else(|| {
        ConfigError::TooManyStages {
            stages: index + 1,
            max: MAX_STAGES,
        }
        .into()
    })
}

fn qualified(alias: char, column: &str, dialect: &dyn Dialect) -> String {
    format!("{alias}.{}", dialect.quote_identifier(column))
}

fn invalid(stage: usize, reason: impl Into<String>) -> relstream_types::Error {
    ConfigError::InvalidJoinPredicate {
        stage,
        reason: reason.into(),
    }
    .into()
}

fn unknown_column(table: &TableId, column: &str) -> relstream_types::Error {
    ConfigError::UnknownColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use relstream_types::{ColumnDef, Error, Inclusion, PredicateOp, PredicateSpec, TableDef};

    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::join::stage::JoinOperator;

    fn table(db: &str, name: &str, columns: &[&str]) -> TableDef {
        TableDef::new(
            TableId::new(db, name),
            columns.iter().map(|c| ColumnDef::new(*c)),
        )
    }

    fn film() -> TableDef {
        table("sakila", "Film", &["film_id", "title", "language_id", "rating"])
    }

    fn language() -> TableDef {
        table("sakila", "Language", &["language_id", "name"])
    }

    fn film_language(join_type: JoinType) -> Vec<JoinStage> {
        vec![
            JoinStage::from(film()).with_predicate(PredicateSpec::new(
                "rating",
                PredicateOp::In,
                vec![Value::from("G"), Value::from("PG")],
            )),
            JoinStage::join(
                language(),
                join_type,
                JoinOperator::Equal,
                "language_id",
                vec![ColumnRef::new(film().id, "language_id")],
            ),
        ]
    }

    fn config(err: Error) -> ConfigError {
        match err {
            Error::Config(config) => config,
            other => panic!("expected configuration error, got {other}"),
        }
    }

    #[test]
    fn aliases_are_letters_by_index() {
        assert_eq!(alias(0), Some('A'));
        assert_eq!(alias(25), Some('Z'));
        assert_eq!(alias(26), None);
    }

    #[test]
    fn film_language_inner_join() {
        let join = compile_join(&film_language(JoinType::Inner), &SqliteDialect).unwrap();
        let query = join.query();
        assert_eq!(
            query.sql,
            "SELECT A.film_id, A.title, A.language_id, A.rating, B.language_id, B.name \
             FROM Film AS A INNER JOIN Language AS B ON (A.language_id = B.language_id) \
             WHERE A.rating IN (?, ?)"
        );
        assert_eq!(query.values, vec![Value::from("G"), Value::from("PG")]);
        assert_eq!(join.width(), 6);
        assert_eq!(join.stages[1].offset, 4);
        assert_eq!(join.stages[1].null_probe, None);
    }

    #[test]
    fn left_join_probes_own_join_column() {
        let join = compile_join(&film_language(JoinType::LeftOuter), &SqliteDialect).unwrap();
        assert!(join.select.contains("LEFT JOIN Language AS B"));
        assert!(join.stages[1].nullable);
        assert_eq!(join.stages[1].null_probe, Some(4));
    }

    #[test]
    fn ordering_comparison_is_mirrored() {
        let stages = vec![
            JoinStage::from(table("db", "a", &["x"])),
            JoinStage::join(
                table("db", "b", &["y"]),
                JoinType::Inner,
                JoinOperator::LessThan,
                "y",
                vec![ColumnRef::new(TableId::new("db", "a"), "x")],
            ),
        ];
        let join = compile_join(&stages, &SqliteDialect).unwrap();
        assert!(join.select.ends_with("INNER JOIN b AS B ON (A.x > B.y)"));
    }

    #[test]
    fn between_and_not_between() {
        let range = table("db", "range", &["lo", "hi"]);
        let point = table("db", "point", &["v"]);
        let bounds = vec![
            ColumnRef::new(range.id.clone(), "lo"),
            ColumnRef::new(range.id.clone(), "hi"),
        ];
        let between = vec![
            JoinStage::from(range.clone()),
            JoinStage::join(point.clone(), JoinType::Inner, JoinOperator::Between, "v", bounds.clone())
                .with_inclusion(Inclusion::StartInclusiveEndInclusive),
        ];
        let sql = compile_join(&between, &SqliteDialect).unwrap().select;
        assert!(sql.ends_with("ON (B.v >= A.lo AND B.v <= A.hi)"), "{sql}");

        let not_between = vec![
            JoinStage::from(range),
            JoinStage::join(point, JoinType::Inner, JoinOperator::NotBetween, "v", bounds),
        ];
        let sql = compile_join(&not_between, &SqliteDialect).unwrap().select;
        assert!(sql.ends_with("ON (NOT (B.v >= A.lo AND B.v < A.hi))"), "{sql}");
    }

    #[test]
    fn cross_join_uses_comma() {
        let stages = vec![
            JoinStage::from(table("db", "a", &["x"])),
            JoinStage::cross(table("db", "b", &["y"])),
        ];
        let join = compile_join(&stages, &SqliteDialect).unwrap();
        assert_eq!(join.select, "SELECT A.x, B.y FROM a AS A, b AS B");
    }

    #[test]
    fn offsets_accumulate_enabled_columns() {
        let mut with_disabled = table("db", "b", &["y", "z"]);
        with_disabled.columns.insert(0, ColumnDef::disabled("secret"));
        let stages = vec![
            JoinStage::from(table("db", "a", &["x1", "x2", "x3"])),
            JoinStage::cross(with_disabled),
            JoinStage::cross(table("db", "c", &["w"])),
        ];
        let join = compile_join(&stages, &SqliteDialect).unwrap();
        let offsets: Vec<usize> = join.stages.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 3, 5]);
        assert!(!join.select.contains("secret"));
    }

    #[test]
    fn postgres_quotes_identifiers() {
        let join = compile_join(&film_language(JoinType::Inner), &PostgresDialect).unwrap();
        assert!(join.select.starts_with("SELECT A.film_id"));
        assert!(join.select.contains("FROM \"Film\" AS A"), "{}", join.select);
    }

    #[test]
    fn empty_join_is_rejected() {
        assert_eq!(config(compile_join(&[], &SqliteDialect).unwrap_err()), ConfigError::EmptyJoin);
    }

    #[test]
    fn too_many_stages() {
        let mut stages = vec![JoinStage::from(table("db", "t0", &["x"]))];
        for i in 1..=MAX_STAGES {
            stages.push(JoinStage::cross(table("db", &format!("t{i}"), &["x"])));
        }
        let err = config(compile_join(&stages, &SqliteDialect).unwrap_err());
        assert_eq!(err, ConfigError::TooManyStages { stages: 27, max: 26 });
    }

    #[test]
    fn cross_database_join_lists_stages() {
        let stages = vec![
            JoinStage::from(table("one", "a", &["x"])),
            JoinStage::cross(table("two", "b", &["x"])),
        ];
        let err = compile_join(&stages, &SqliteDialect).unwrap_err();
        assert_eq!(
            err.to_string(),
            "join spans multiple databases: stage 0: one.a, stage 1: two.b"
        );
    }

    #[test]
    fn foreign_table_must_precede_stage() {
        let stages = vec![
            JoinStage::from(table("db", "a", &["x"])),
            JoinStage::join(
                table("db", "b", &["x"]),
                JoinType::Inner,
                JoinOperator::Equal,
                "x",
                vec![ColumnRef::new(TableId::new("db", "c"), "x")],
            ),
            JoinStage::cross(table("db", "c", &["x"])),
        ];
        let err = compile_join(&stages, &SqliteDialect).unwrap_err();
        assert_eq!(err.to_string(), "no table for db.c, available: db.a");
    }

    #[test]
    fn between_requires_two_bounds() {
        let stages = vec![
            JoinStage::from(table("db", "a", &["x"])),
            JoinStage::join(
                table("db", "b", &["y"]),
                JoinType::Inner,
                JoinOperator::Between,
                "y",
                vec![ColumnRef::new(TableId::new("db", "a"), "x")],
            ),
        ];
        let err = config(compile_join(&stages, &SqliteDialect).unwrap_err());
        assert!(matches!(err, ConfigError::InvalidJoinPredicate { stage: 1, .. }));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let stages = vec![
            JoinStage::from(table("db", "a", &["x"])),
            JoinStage::join(
                table("db", "b", &["y"]),
                JoinType::Inner,
                JoinOperator::Equal,
                "missing",
                vec![ColumnRef::new(TableId::new("db", "a"), "x")],
            ),
        ];
        let err = config(compile_join(&stages, &SqliteDialect).unwrap_err());
        assert_eq!(
            err,
            ConfigError::UnknownColumn {
                table: "db.b".into(),
                column: "missing".into()
            }
        );
    }

    #[test]
    fn driving_stage_cannot_be_joined() {
        let stages = vec![JoinStage::cross(table("db", "a", &["x"]))];
        let err = config(compile_join(&stages, &SqliteDialect).unwrap_err());
        assert!(matches!(err, ConfigError::InvalidJoinPredicate { stage: 0, .. }));
    }

    #[test]
    fn values_follow_stage_order() {
        let mut stages = film_language(JoinType::Inner);
        stages[1].predicates.push(PredicateSpec::new(
            "name",
            PredicateOp::Equal,
            vec![Value::from("English")],
        ));
        let join = compile_join(&stages, &SqliteDialect).unwrap();
        assert_eq!(
            join.values,
            vec![Value::from("G"), Value::from("PG"), Value::from("English")]
        );
        assert_eq!(join.conditions[1], "B.name = ?");
    }
}
