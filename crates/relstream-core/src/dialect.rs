//! SQL dialects.
//!
//! A [`Dialect`] knows how to quote identifiers, render field predicates
//! and sort keys, and which pagination syntax (if any) the database
//! accepts. Every rendered value is bound as a `?` placeholder.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use relstream_types::{ConfigError, Direction, Inclusion, PredicateOp, PredicateSpec, Result, TableId, Value};
use serde::{Deserialize, Serialize};

static PLAIN_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "create", "default",
    "delete", "desc", "distinct", "drop", "else", "from", "group", "having", "in", "index",
    "insert", "into", "is", "join", "key", "like", "limit", "not", "null", "offset", "on", "or",
    "order", "primary", "references", "select", "set", "table", "then", "to", "union", "unique",
    "update", "values", "when", "where",
];

fn needs_quoting(ident: &str) -> bool {
    !PLAIN_IDENT_RE.is_match(ident) || RESERVED.contains(&ident.to_ascii_lowercase().as_str())
}

fn quote_with(ident: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{quote}{}{quote}", ident.replace(quote, &doubled))
}

/// A rendered SQL condition and the values bound to its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl SqlFragment {
    #[must_use]
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }
}

/// Pagination syntax supported by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT ? OFFSET ?`. `unbounded` is the LIMIT literal required when
    /// only an offset is present; `None` means `OFFSET` may stand alone.
    LimitOffset { unbounded: Option<&'static str> },
    /// SQL:2008 `OFFSET ? ROWS FETCH NEXT ? ROWS ONLY`.
    OffsetFetch,
    /// Skip and limit always run in memory.
    Unsupported,
}

/// Database-specific SQL rendering.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, ident: &str) -> String;

    /// Table reference as used in FROM and JOIN clauses.
    fn table_ref(&self, table: &TableId) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.table)
            ),
            None => self.quote_identifier(&table.table),
        }
    }

    /// Render `spec` against the already quoted (and possibly qualified)
    /// column expression `column`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedPredicate`] when the operands do not
    /// fit the operator.
    fn render_predicate(&self, column: &str, spec: &PredicateSpec) -> Result<SqlFragment> {
        standard_predicate(column, spec, " ESCAPE '\\'")
    }

    /// One ORDER BY key. NULL must sort first in ascending order.
    fn render_order(&self, column: &str, direction: Direction) -> String {
        format!("{column} {}", direction.sql())
    }

    fn pagination(&self) -> Pagination;

    fn supports_skip_limit(&self) -> bool {
        self.pagination() != Pagination::Unsupported
    }
}

fn malformed(spec: &PredicateSpec, reason: impl Into<String>) -> relstream_types::Error {
    ConfigError::MalformedPredicate {
        column: spec.column.clone(),
        reason: reason.into(),
    }
    .into()
}

fn check_well_formed(spec: &PredicateSpec) -> Result<()> {
    if spec.is_well_formed() {
        return Ok(());
    }
    let reason = match spec.op.arity() {
        Some(n) => format!("{:?} expects {n} operands, got {}", spec.op, spec.operands.len()),
        None => format!("{:?} expects at least one operand", spec.op),
    };
    Err(malformed(spec, reason))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn between_sql(column: &str, inclusion: Inclusion) -> String {
    format!(
        "({column} {} ? AND {column} {} ?)",
        inclusion.start_op(),
        inclusion.end_op()
    )
}

fn needle(spec: &PredicateSpec) -> Result<&str> {
    spec.operands
        .first()
        .and_then(Value::as_text)
        .ok_or_else(|| malformed(spec, "text operator expects a text operand"))
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// ANSI rendering shared by the built-in dialects. `like_escape` is the
/// clause appended to LIKE conditions.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedPredicate`] for operand/operator mismatches.
pub fn standard_predicate(column: &str, spec: &PredicateSpec, like_escape: &str) -> Result<SqlFragment> {
    check_well_formed(spec)?;
    let operands = spec.operands.clone();
    let compare = |op: &str| SqlFragment::new(format!("{column} {op} ?"), operands.clone());
    let fragment = match spec.op {
        PredicateOp::Equal => compare("="),
        PredicateOp::NotEqual => compare("<>"),
        PredicateOp::LessThan => compare("<"),
        PredicateOp::LessOrEqual => compare("<="),
        PredicateOp::GreaterThan => compare(">"),
        PredicateOp::GreaterOrEqual => compare(">="),
        PredicateOp::Between => SqlFragment::new(between_sql(column, spec.inclusion), operands),
        PredicateOp::NotBetween => {
            SqlFragment::new(format!("NOT {}", between_sql(column, spec.inclusion)), operands)
        }
        PredicateOp::In => SqlFragment::new(
            format!("{column} IN ({})", placeholders(operands.len())),
            operands,
        ),
        PredicateOp::NotIn => SqlFragment::new(
            format!("{column} NOT IN ({})", placeholders(operands.len())),
            operands,
        ),
        PredicateOp::IsNull => SqlFragment::new(format!("{column} IS NULL"), Vec::new()),
        PredicateOp::IsNotNull => SqlFragment::new(format!("{column} IS NOT NULL"), Vec::new()),
        PredicateOp::StartsWith | PredicateOp::EndsWith | PredicateOp::Contains => {
            let escaped = escape_like(needle(spec)?);
            let pattern = match spec.op {
                PredicateOp::StartsWith => format!("{escaped}%"),
                PredicateOp::EndsWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            SqlFragment::new(
                format!("{column} LIKE ?{like_escape}"),
                vec![Value::Text(pattern)],
            )
        }
    };
    Ok(fragment)
}

fn bound(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Append pagination for `skip`/`limit` to `sql`, binding both as values.
pub fn render_pagination(
    pagination: Pagination,
    sql: &mut String,
    values: &mut Vec<Value>,
    skip: u64,
    limit: Option<u64>,
) {
    match pagination {
        Pagination::LimitOffset { unbounded } => match (limit, skip) {
            (None, 0) => {}
            (Some(limit), 0) => {
                sql.push_str(" LIMIT ?");
                values.push(bound(limit));
            }
            (Some(limit), skip) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                values.push(bound(limit));
                values.push(bound(skip));
            }
            (None, skip) => {
                if let Some(all) = unbounded {
                    sql.push_str(" LIMIT ");
                    sql.push_str(all);
                }
                sql.push_str(" OFFSET ?");
                values.push(bound(skip));
            }
        },
        Pagination::OffsetFetch => {
            if skip == 0 && limit.is_none() {
                return;
            }
            sql.push_str(" OFFSET ? ROWS");
            values.push(bound(skip));
            if let Some(limit) = limit {
                sql.push_str(" FETCH NEXT ? ROWS ONLY");
                values.push(bound(limit));
            }
        }
        Pagination::Unsupported => {}
    }
}

// ---------------------------------------------------------------------------
// Built-in dialects
// ---------------------------------------------------------------------------

/// `SQLite`: identifiers quoted only when needed, `LIMIT -1 OFFSET ?` for
/// offset-only pagination, case-sensitive text operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        if needs_quoting(ident) {
            quote_with(ident, '"')
        } else {
            ident.to_string()
        }
    }

    // LIKE is case-insensitive in SQLite, so text operators use instr/substr.
    fn render_predicate(&self, column: &str, spec: &PredicateSpec) -> Result<SqlFragment> {
        match spec.op {
            PredicateOp::StartsWith | PredicateOp::EndsWith | PredicateOp::Contains => {
                check_well_formed(spec)?;
                let text = Value::from(needle(spec)?);
                Ok(match spec.op {
                    PredicateOp::StartsWith => {
                        SqlFragment::new(format!("instr({column}, ?) = 1"), vec![text])
                    }
                    PredicateOp::EndsWith => SqlFragment::new(
                        format!("substr({column}, length({column}) - length(?) + 1) = ?"),
                        vec![text.clone(), text],
                    ),
                    _ => SqlFragment::new(format!("instr({column}, ?) > 0"), vec![text]),
                })
            }
            _ => standard_predicate(column, spec, " ESCAPE '\\'"),
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::LimitOffset {
            unbounded: Some("-1"),
        }
    }
}

/// PostgreSQL: identifiers quoted with `pg_escape`, explicit NULL ordering.
///
/// Statements are rendered with `?` placeholders; executors translate them
/// with [`SqlQuery::numbered_placeholders`](crate::executor::SqlQuery::numbered_placeholders).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        pg_escape::quote_identifier(ident).to_string()
    }

    fn render_order(&self, column: &str, direction: Direction) -> String {
        match direction {
            Direction::Asc => format!("{column} ASC NULLS FIRST"),
            Direction::Desc => format!("{column} DESC NULLS LAST"),
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::LimitOffset { unbounded: None }
    }
}

/// MySQL: backtick quoting, database-qualified table references.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        if needs_quoting(ident) {
            quote_with(ident, '`')
        } else {
            ident.to_string()
        }
    }

    fn table_ref(&self, table: &TableId) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&table.database),
            self.quote_identifier(&table.table)
        )
    }

    // Backslash is already MySQL's LIKE escape and cannot appear bare in a
    // string literal.
    fn render_predicate(&self, column: &str, spec: &PredicateSpec) -> Result<SqlFragment> {
        standard_predicate(column, spec, "")
    }

    fn pagination(&self) -> Pagination {
        Pagination::LimitOffset {
            unbounded: Some("18446744073709551615"),
        }
    }
}

/// Generic SQL:2008 dialect using `OFFSET .. FETCH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sql2008Dialect;

impl Dialect for Sql2008Dialect {
    fn name(&self) -> &'static str {
        "sql2008"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        if needs_quoting(ident) {
            quote_with(ident, '"')
        } else {
            ident.to_string()
        }
    }

    fn render_order(&self, column: &str, direction: Direction) -> String {
        match direction {
            Direction::Asc => format!("{column} ASC NULLS FIRST"),
            Direction::Desc => format!("{column} DESC NULLS LAST"),
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::OffsetFetch
    }
}

/// Wraps a dialect and withholds pagination support, so skip and limit
/// always run in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPagination<D>(pub D);

impl<D: Dialect> Dialect for NoPagination<D> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.0.quote_identifier(ident)
    }

    fn table_ref(&self, table: &TableId) -> String {
        self.0.table_ref(table)
    }

    fn render_predicate(&self, column: &str, spec: &PredicateSpec) -> Result<SqlFragment> {
        self.0.render_predicate(column, spec)
    }

    fn render_order(&self, column: &str, direction: Direction) -> String {
        self.0.render_order(column, direction)
    }

    fn pagination(&self) -> Pagination {
        Pagination::Unsupported
    }
}

/// Dialect selector used by configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
    Sql2008,
}

impl DialectKind {
    /// Instantiate the dialect, optionally withholding pagination support.
    #[must_use]
    pub fn dialect(self, pagination: bool) -> Arc<dyn Dialect> {
        match (self, pagination) {
            (Self::Sqlite, true) => Arc::new(SqliteDialect),
            (Self::Sqlite, false) => Arc::new(NoPagination(SqliteDialect)),
            (Self::Postgres, true) => Arc::new(PostgresDialect),
            (Self::Postgres, false) => Arc::new(NoPagination(PostgresDialect)),
            (Self::Mysql, true) => Arc::new(MySqlDialect),
            (Self::Mysql, false) => Arc::new(NoPagination(MySqlDialect)),
            (Self::Sql2008, true) => Arc::new(Sql2008Dialect),
            (Self::Sql2008, false) => Arc::new(NoPagination(Sql2008Dialect)),
        }
    }
}
