//! Per-entity table handles.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use relstream_types::{Entity, Row, TableDef};

use crate::dialect::Dialect;
use crate::executor::{RowMapper, SqlExecutor};
use crate::stream::Stream;
use crate::terminator::{BaseQuery, SqlSource};

/// Produces streams over every row of `E`'s table.
///
/// Field filters, field sorts, skip and limit at the head of the returned
/// stream's pipeline are rendered into the statement; the rest of the
/// pipeline runs in memory.
pub struct Manager<E> {
    executor: Arc<dyn SqlExecutor>,
    dialect: Arc<dyn Dialect>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> fmt::Debug for Manager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

impl<E> Clone for Manager<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            dialect: Arc::clone(&self.dialect),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Manager<E> {
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            executor,
            dialect,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn table(&self) -> &'static TableDef {
        E::table()
    }

    #[must_use]
    pub fn stream(&self) -> Stream<E> {
        let table = E::table();
        let columns: Vec<String> = table
            .enabled_columns()
            .map(|c| self.dialect.quote_identifier(&c.name))
            .collect();
        let base = BaseQuery {
            select: format!(
                "SELECT {} FROM {}",
                columns.join(", "),
                self.dialect.table_ref(&table.id)
            ),
            tiebreak: table.enabled_columns().map(|c| c.name.clone()).collect(),
            ..BaseQuery::default()
        };
        let mapper: RowMapper<E> = Rc::new(|row: &Row| E::from_row(row, 0));
        SqlSource {
            base,
            renders_fields: true,
            executor: Arc::clone(&self.executor),
            dialect: Arc::clone(&self.dialect),
            mapper,
        }
        .into_stream()
    }
}
