//! SQL pushdown.
//!
//! The terminator walks a frozen pipeline from its first action and keeps
//! the longest prefix it can express in the source statement: field
//! filters become WHERE conditions, field sorts become ORDER BY keys and
//! skip/limit become dialect pagination. Everything from the first
//! action it cannot express onward runs in memory over the fetched rows.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use relstream_types::{Direction, OrderSpec, PredicateSpec, Result, Value};

use crate::dialect::{render_pagination, Dialect};
use crate::executor::{AsyncQueryResult, RowMapper, SqlExecutor, SqlQuery};
use crate::pipeline::{Action, Filter, Pipeline, Sort};
use crate::resource::Close;
use crate::stream::{ErrorLatch, Explain, Flow, Replay, Stream};

/// The rendered prefix of a pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pushdown {
    /// Number of leading actions covered by the statement.
    pub rendered: usize,
    pub predicates: Vec<PredicateSpec>,
    /// ORDER BY keys, most significant first.
    pub order: Vec<OrderSpec>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Whether the pipeline skips or limits anywhere, rendered or not.
    pub paged: bool,
}

/// Statement a source starts from, before any pipeline action is rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseQuery {
    /// `SELECT <columns> FROM <tables>`.
    pub select: String,
    /// Conditions that always apply, ANDed with rendered filters.
    pub conditions: Vec<String>,
    /// Values bound to placeholders in `conditions`, in order.
    pub values: Vec<Value>,
    /// Columns appended as ascending ORDER BY keys when a sorted pipeline
    /// is paged. Rows tied on the sort keys then page the same way whether
    /// skip and limit run in the statement or in memory.
    pub tiebreak: Vec<String>,
}

/// Decides and renders the pushdown prefix for one dialect.
pub struct StreamTerminator<'a> {
    dialect: &'a dyn Dialect,
    renders_fields: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Filters and sorts may still be rendered.
    Selecting,
    /// Pagination was rendered; only further skip/limit may follow.
    Paginated,
}

impl<'a> StreamTerminator<'a> {
    /// `renders_fields` is false for sources whose rows are not a single
    /// entity table, where field predicates and sorts cannot be expressed.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, renders_fields: bool) -> Self {
        Self {
            dialect,
            renders_fields,
        }
    }

    /// Longest renderable prefix of `pipeline`.
    #[must_use]
    pub fn plan(&self, pipeline: &Pipeline) -> Pushdown {
        let mut plan = Pushdown::default();
        let mut phase = Phase::Selecting;
        let paginates = self.dialect.supports_skip_limit();

        for action in pipeline.actions() {
            let rendered = match action {
                Action::Filter(Filter::Field(spec))
                    if self.renders_fields && phase == Phase::Selecting && spec.is_well_formed() =>
                {
                    plan.predicates.push(spec.clone());
                    true
                }
                Action::Sorted(Sort::Fields(keys)) if self.renders_fields && phase == Phase::Selecting => {
                    // A later sort is more significant; earlier keys break its ties.
                    let mut order = keys.clone();
                    for key in plan.order.drain(..) {
                        if !order.iter().any(|k| k.column == key.column) {
                            order.push(key);
                        }
                    }
                    plan.order = order;
                    true
                }
                Action::Skip(n) if paginates => {
                    plan.skip = plan.skip.saturating_add(*n);
                    plan.limit = plan.limit.map(|limit| limit.saturating_sub(*n));
                    phase = Phase::Paginated;
                    true
                }
                Action::Limit(n) if paginates => {
                    plan.limit = Some(plan.limit.map_or(*n, |limit| limit.min(*n)));
                    phase = Phase::Paginated;
                    true
                }
                _ => false,
            };
            if !rendered {
                break;
            }
            plan.rendered += 1;
        }
        plan.paged = pipeline
            .actions()
            .iter()
            .any(|action| matches!(action, Action::Skip(_) | Action::Limit(_)));
        plan
    }

    /// Render `base` with the conditions, ordering and pagination of `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedPredicate`](relstream_types::ConfigError::MalformedPredicate)
    /// when a predicate cannot be rendered.
    pub fn render(&self, base: &BaseQuery, plan: &Pushdown) -> Result<SqlQuery> {
        let mut sql = base.select.clone();
        let mut values = base.values.clone();
        let mut conditions = base.conditions.clone();

        for spec in &plan.predicates {
            let column = self.dialect.quote_identifier(&spec.column);
            let fragment = self.dialect.render_predicate(&column, spec)?;
            conditions.push(fragment.sql);
            values.extend(fragment.values);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !plan.order.is_empty() {
            let mut order = plan.order.clone();
            if plan.paged {
                for column in &base.tiebreak {
                    if !order.iter().any(|key| &key.column == column) {
                        order.push(OrderSpec::new(column.clone(), Direction::Asc));
                    }
                }
            }
            let keys: Vec<String> = order
                .iter()
                .map(|key| {
                    self.dialect
                        .render_order(&self.dialect.quote_identifier(&key.column), key.direction)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        render_pagination(
            self.dialect.pagination(),
            &mut sql,
            &mut values,
            plan.skip,
            plan.limit,
        );
        Ok(SqlQuery::new(sql, values))
    }
}

/// A stream source backed by a SQL statement.
pub(crate) struct SqlSource<T> {
    pub(crate) base: BaseQuery,
    pub(crate) renders_fields: bool,
    pub(crate) executor: Arc<dyn SqlExecutor>,
    pub(crate) dialect: Arc<dyn Dialect>,
    pub(crate) mapper: RowMapper<T>,
}

impl<T: 'static> SqlSource<T> {
    pub(crate) fn into_stream(self) -> Stream<T> {
        let explain: Explain = {
            let base = self.base.clone();
            let dialect = Arc::clone(&self.dialect);
            let renders_fields = self.renders_fields;
            Rc::new(move |pipeline: &Pipeline| {
                let terminator = StreamTerminator::new(dialect.as_ref(), renders_fields);
                terminator.render(&base, &terminator.plan(pipeline))
            })
        };

        let replay: Replay<T> = Box::new(move |pipeline, ctx| {
            let terminator = StreamTerminator::new(self.dialect.as_ref(), self.renders_fields);
            let plan = terminator.plan(pipeline);
            let query = terminator.render(&self.base, &plan)?;
            tracing::debug!(
                dialect = self.dialect.name(),
                actions = pipeline.len(),
                rendered = plan.rendered,
                sql = %query.sql,
                "rendered stream pipeline"
            );

            let result = Rc::new(RefCell::new(AsyncQueryResult::new(
                self.executor,
                query,
                pipeline.is_parallel(),
                self.mapper,
            )));
            let closer = Rc::clone(&result);
            ctx.on_close(Box::new(move || closer.borrow_mut().close()));

            let flow = ResultFlow {
                result,
                latch: ctx.latch().clone(),
                done: false,
            };
            Ok((Box::new(flow) as Flow<T>, plan.rendered))
        });

        Stream::from_source(Some(explain), replay)
    }
}

/// Pulls mapped rows from a query result, latching the first failure.
struct ResultFlow<T> {
    result: Rc<RefCell<AsyncQueryResult<T>>>,
    latch: ErrorLatch,
    done: bool,
}

impl<T> Iterator for ResultFlow<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        let fetched = self.result.borrow_mut().fetch();
        match fetched {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                self.latch.set(err);
                None
            }
        }
    }
}
