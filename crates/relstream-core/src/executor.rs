//! SQL execution provider interface.
//!
//! Stream and join sources never talk to a database directly. They hand a
//! rendered [`SqlQuery`] to a [`SqlExecutor`] and read rows back through a
//! [`RowCursor`]. [`AsyncQueryResult`] defers execution until the first
//! fetch and guarantees the cursor is closed exactly once.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use relstream_types::{Result, Row, Value};

use crate::resource::Close;

/// A statement with `?` placeholders and the values bound to them, in
/// placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl SqlQuery {
    #[must_use]
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// The statement with `?` placeholders rewritten as `$1, $2, ...`.
    /// Question marks inside quoted literals and identifiers are kept.
    #[must_use]
    pub fn numbered_placeholders(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 8);
        let mut quote: Option<char> = None;
        let mut n = 0;
        for ch in self.sql.chars() {
            match (quote, ch) {
                (None, '\'' | '"') => {
                    quote = Some(ch);
                    out.push(ch);
                }
                (Some(open), c) if c == open => {
                    quote = None;
                    out.push(ch);
                }
                (None, '?') => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(ch),
            }
        }
        out
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Forward-only cursor over fetched rows.
pub trait RowCursor {
    /// # Errors
    ///
    /// Returns [`Error::Execution`](relstream_types::Error::Execution) when
    /// the provider fails while fetching.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the cursor. Called at most once by [`AsyncQueryResult`].
    ///
    /// # Errors
    ///
    /// Returns the provider failure raised while releasing.
    fn close(&mut self) -> Result<()>;
}

/// Executes rendered statements.
pub trait SqlExecutor: Send + Sync {
    /// Run `query`. `parallel` is a hint the provider may ignore.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`](relstream_types::Error::Execution) when
    /// the statement cannot be prepared or run.
    fn execute(&self, query: &SqlQuery, parallel: bool) -> Result<Box<dyn RowCursor>>;
}

/// Cursor over rows already held in memory.
#[derive(Debug, Default)]
pub struct VecCursor {
    rows: std::vec::IntoIter<Row>,
}

impl VecCursor {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for VecCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> Result<()> {
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

/// Converts one fetched row into an element.
pub type RowMapper<T> = Rc<dyn Fn(&Row) -> Result<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    Pending,
    Open,
    Closed,
}

/// Lazily executed query whose rows are mapped into `T`.
///
/// The statement runs on the first [`fetch`](Self::fetch). The cursor is
/// closed when the rows run out or on [`close`](Close::close), whichever
/// comes first, and never twice.
pub struct AsyncQueryResult<T> {
    executor: Arc<dyn SqlExecutor>,
    query: SqlQuery,
    parallel: bool,
    mapper: RowMapper<T>,
    cursor: Option<Box<dyn RowCursor>>,
    state: QueryState,
}

impl<T> fmt::Debug for AsyncQueryResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueryResult")
            .field("query", &self.query)
            .field("parallel", &self.parallel)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T> AsyncQueryResult<T> {
    #[must_use]
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        query: SqlQuery,
        parallel: bool,
        mapper: RowMapper<T>,
    ) -> Self {
        Self {
            executor,
            query,
            parallel,
            mapper,
            cursor: None,
            state: QueryState::Pending,
        }
    }

    #[must_use]
    pub fn query(&self) -> &SqlQuery {
        &self.query
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == QueryState::Closed
    }

    /// Fetch and map the next row, executing the statement first if needed.
    /// Returns `Ok(None)` once the rows are exhausted or after close.
    ///
    /// # Errors
    ///
    /// Returns the provider failure from executing or fetching, or a
    /// mapping failure for the row.
    pub fn fetch(&mut self) -> Result<Option<T>> {
        if self.state == QueryState::Pending {
            tracing::debug!(sql = %self.query.sql, values = self.query.values.len(), "executing query");
            self.cursor = Some(self.executor.execute(&self.query, self.parallel)?);
            self.state = QueryState::Open;
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_row()? {
            Some(row) => (self.mapper)(&row).map(Some),
            None => {
                self.close()?;
                Ok(None)
            }
        }
    }
}

impl<T> Close for AsyncQueryResult<T> {
    fn close(&mut self) -> Result<()> {
        if self.state == QueryState::Closed {
            return Ok(());
        }
        self.state = QueryState::Closed;
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use relstream_types::Error;

    use super::*;

    #[derive(Default)]
    struct Recording {
        executed: Mutex<Vec<SqlQuery>>,
        closes: Arc<AtomicUsize>,
    }

    struct CountingCursor {
        inner: VecCursor,
        closes: Arc<AtomicUsize>,
    }

    impl RowCursor for CountingCursor {
        fn next_row(&mut self) -> Result<Option<Row>> {
            self.inner.next_row()
        }

        fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl SqlExecutor for Recording {
        fn execute(&self, query: &SqlQuery, _parallel: bool) -> Result<Box<dyn RowCursor>> {
            self.executed.lock().unwrap().push(query.clone());
            Ok(Box::new(CountingCursor {
                inner: VecCursor::new(vec![Row::new(vec![1.into()]), Row::new(vec![2.into()])]),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn first_column() -> RowMapper<i64> {
        Rc::new(|row: &Row| row.get_as::<i64>(0))
    }

    #[test]
    fn executes_lazily_on_first_fetch() {
        let executor = Arc::new(Recording::default());
        let mut result = AsyncQueryResult::new(
            executor.clone(),
            SqlQuery::new("SELECT id FROM t", vec![]),
            false,
            first_column(),
        );
        assert!(executor.executed.lock().unwrap().is_empty());
        assert_eq!(result.fetch().unwrap(), Some(1));
        assert_eq!(executor.executed.lock().unwrap().len(), 1);
    }

    #[test]
    fn closes_cursor_exactly_once() {
        let executor = Arc::new(Recording::default());
        let mut result =
            AsyncQueryResult::new(executor.clone(), SqlQuery::default(), false, first_column());
        assert_eq!(result.fetch().unwrap(), Some(1));
        assert_eq!(result.fetch().unwrap(), Some(2));
        assert_eq!(result.fetch().unwrap(), None);
        result.close().unwrap();
        result.close().unwrap();
        assert_eq!(executor.closes.load(Ordering::SeqCst), 1);
        assert!(result.is_closed());
        assert_eq!(result.fetch().unwrap(), None);
    }

    #[test]
    fn close_before_fetch_never_executes() {
        let executor = Arc::new(Recording::default());
        let mut result =
            AsyncQueryResult::new(executor.clone(), SqlQuery::default(), false, first_column());
        result.close().unwrap();
        assert_eq!(result.fetch().unwrap(), None);
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    struct Failing;

    impl SqlExecutor for Failing {
        fn execute(&self, _query: &SqlQuery, _parallel: bool) -> Result<Box<dyn RowCursor>> {
            Err(Error::execution("prepare", "no such table: film"))
        }
    }

    #[test]
    fn execution_failure_surfaces_on_fetch() {
        let mut result =
            AsyncQueryResult::new(Arc::new(Failing), SqlQuery::default(), false, first_column());
        let err = result.fetch().unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn numbered_placeholders_skip_literals() {
        let query = SqlQuery::new("SELECT '?' FROM t WHERE a = ? AND b IN (?, ?)", vec![]);
        assert_eq!(
            query.numbered_placeholders(),
            "SELECT '?' FROM t WHERE a = $1 AND b IN ($2, $3)"
        );
    }
}
