//! Typed join builder.
//!
//! ```ignore
//! let films = Join::new(executor, dialect)
//!     .from::<Film>()
//!     .where_(Film::RATING.in_(["G", "PG"]))
//!     .inner_join_on(Language::LANGUAGE_ID)
//!     .equal(Film::LANGUAGE_ID)
//!     .build(|film, language| (film, language))?;
//! ```
//!
//! Each builder records the stage value types it has joined so far; `build`
//! takes a constructor over exactly those values. Stages joined with
//! `left_join_on` are passed as `Option<E>`.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use relstream_types::{ColumnRef, Entity, Field, FieldPredicate, Inclusion, Result, Row, Value};

use super::compiler::{compile_join, CompiledJoin, SqlStage};
use super::stage::{JoinOperator, JoinStage, JoinType};
use crate::dialect::Dialect;
use crate::executor::{RowMapper, SqlExecutor};
use crate::stream::Stream;
use crate::terminator::SqlSource;

/// How one stage of a joined row is handed to the constructor.
pub trait StageValue: 'static {
    type Entity: Entity;
    type Output;

    /// # Errors
    ///
    /// Returns a mapping error when the stage's columns cannot be read.
    fn map(row: &Row, stage: &SqlStage) -> Result<Self::Output>;
}

/// A stage that is present in every joined row.
#[derive(Debug)]
pub struct Required<E>(PhantomData<E>);

/// A left-joined stage, absent when no row matched.
#[derive(Debug)]
pub struct Nullable<E>(PhantomData<E>);

impl<E: Entity> StageValue for Required<E> {
    type Entity = E;
    type Output = E;

    fn map(row: &Row, stage: &SqlStage) -> Result<E> {
        E::from_row(row, stage.offset)
    }
}

impl<E: Entity> StageValue for Nullable<E> {
    type Entity = E;
    type Output = Option<E>;

    fn map(row: &Row, stage: &SqlStage) -> Result<Option<E>> {
        let absent = stage
            .null_probe
            .is_some_and(|probe| matches!(row.get(probe), Some(Value::Null) | None));
        if absent {
            return Ok(None);
        }
        E::from_row(row, stage.offset).map(Some)
    }
}

/// Entry point of the typed join builder.
pub struct Join {
    executor: Arc<dyn SqlExecutor>,
    dialect: Arc<dyn Dialect>,
}

impl Join {
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Arc<dyn Dialect>) -> Self {
        Self { executor, dialect }
    }

    /// Start a join driven by `E`'s table.
    #[must_use]
    pub fn from<E: Entity>(&self) -> JoinBuilder1<Required<E>> {
        JoinBuilder1::from_parts(JoinParts {
            executor: Arc::clone(&self.executor),
            dialect: Arc::clone(&self.dialect),
            stages: vec![JoinStage::from(E::table().clone())],
        })
    }
}

#[doc(hidden)]
pub struct JoinParts {
    executor: Arc<dyn SqlExecutor>,
    dialect: Arc<dyn Dialect>,
    stages: Vec<JoinStage>,
}

#[doc(hidden)]
pub trait FromStages {
    fn from_parts(parts: JoinParts) -> Self;
}

/// A join stage waiting for its ON condition.
pub struct PendingJoin<B> {
    parts: JoinParts,
    join_type: JoinType,
    stage: JoinStage,
    local: &'static str,
    _next: PhantomData<fn() -> B>,
}

impl<B: FromStages> PendingJoin<B> {
    fn on(mut self, operator: JoinOperator, foreign: Vec<ColumnRef>, inclusion: Inclusion) -> B {
        let stage = JoinStage::join(self.stage.table, self.join_type, operator, self.local, foreign)
            .with_inclusion(inclusion);
        self.parts.stages.push(stage);
        B::from_parts(self.parts)
    }

    pub fn equal<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::Equal, vec![foreign.column_ref()], Inclusion::default())
    }

    pub fn not_equal<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::NotEqual, vec![foreign.column_ref()], Inclusion::default())
    }

    pub fn less_than<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::LessThan, vec![foreign.column_ref()], Inclusion::default())
    }

    pub fn less_or_equal<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::LessOrEqual, vec![foreign.column_ref()], Inclusion::default())
    }

    pub fn greater_than<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::GreaterThan, vec![foreign.column_ref()], Inclusion::default())
    }

    pub fn greater_or_equal<G: Entity>(self, foreign: Field<G>) -> B {
        self.on(JoinOperator::GreaterOrEqual, vec![foreign.column_ref()], Inclusion::default())
    }

    /// Local column within `[start, end)` of earlier stages.
    pub fn between<G: Entity, H: Entity>(self, start: Field<G>, end: Field<H>) -> B {
        self.between_with(start, end, Inclusion::default())
    }

    pub fn between_with<G: Entity, H: Entity>(
        self,
        start: Field<G>,
        end: Field<H>,
        inclusion: Inclusion,
    ) -> B {
        self.on(
            JoinOperator::Between,
            vec![start.column_ref(), end.column_ref()],
            inclusion,
        )
    }

    pub fn not_between<G: Entity, H: Entity>(
        self,
        start: Field<G>,
        end: Field<H>,
        inclusion: Inclusion,
    ) -> B {
        self.on(
            JoinOperator::NotBetween,
            vec![start.column_ref(), end.column_ref()],
            inclusion,
        )
    }
}

macro_rules! join_builder {
    ($(#[$doc:meta])* $name:ident<$($s:ident => $i:tt),+>, last = $last:ident) => {
        $(#[$doc])*
        pub struct $name<$($s),+> {
            parts: JoinParts,
            _stages: PhantomData<fn() -> ($($s,)+)>,
        }

        impl<$($s: StageValue),+> FromStages for $name<$($s),+> {
            fn from_parts(parts: JoinParts) -> Self {
                Self {
                    parts,
                    _stages: PhantomData,
                }
            }
        }

        impl<$($s: StageValue),+> $name<$($s),+> {
            /// Add a WHERE predicate on the most recently joined stage.
            #[must_use]
            pub fn where_(mut self, predicate: FieldPredicate<<$last as StageValue>::Entity>) -> Self {
                if let Some(stage) = self.parts.stages.last_mut() {
                    stage.predicates.push(predicate.spec().clone());
                }
                self
            }

            /// Compile the join and bind `constructor` to its rows.
            ///
            /// # Errors
            ///
            /// Returns a configuration error when the stages do not form a
            /// valid join.
            pub fn build<T, C>(self, constructor: C) -> Result<JoinQuery<T>>
            where
                T: 'static,
                C: Fn($(<$s as StageValue>::Output),+) -> T + 'static,
            {
                let compiled = compile_join(&self.parts.stages, self.parts.dialect.as_ref())?;
                let stages = compiled.stages.clone();
                let mapper: RowMapper<T> = Rc::new(move |row: &Row| {
                    Ok(constructor($(<$s as StageValue>::map(row, &stages[$i])?),+))
                });
                Ok(JoinQuery {
                    compiled,
                    executor: self.parts.executor,
                    dialect: self.parts.dialect,
                    mapper,
                })
            }
        }
    };
}

macro_rules! join_step {
    ($name:ident<$($s:ident),+> => $next:ident) => {
        impl<$($s: StageValue),+> $name<$($s),+> {
            /// Inner join `F`, matching on its `local` column.
            pub fn inner_join_on<F: Entity>(self, local: Field<F>) -> PendingJoin<$next<$($s,)+ Required<F>>> {
                self.pending(JoinType::Inner, local)
            }

            /// Left outer join `F`, matching on its `local` column.
            pub fn left_join_on<F: Entity>(self, local: Field<F>) -> PendingJoin<$next<$($s,)+ Nullable<F>>> {
                self.pending(JoinType::LeftOuter, local)
            }

            /// Cross join `F`.
            #[must_use]
            pub fn cross_join<F: Entity>(mut self) -> $next<$($s,)+ Required<F>> {
                self.parts.stages.push(JoinStage::cross(F::table().clone()));
                $next::from_parts(self.parts)
            }

            fn pending<F: Entity, B>(self, join_type: JoinType, local: Field<F>) -> PendingJoin<B> {
                PendingJoin {
                    parts: self.parts,
                    join_type,
                    stage: JoinStage::from(F::table().clone()),
                    local: local.column(),
                    _next: PhantomData,
                }
            }
        }
    };
}

join_builder!(
    /// Join over one stage.
    JoinBuilder1<S1 => 0>, last = S1
);
join_builder!(
    /// Join over two stages.
    JoinBuilder2<S1 => 0, S2 => 1>, last = S2
);
join_builder!(
    /// Join over three stages.
    JoinBuilder3<S1 => 0, S2 => 1, S3 => 2>, last = S3
);
join_builder!(
    /// Join over four stages.
    JoinBuilder4<S1 => 0, S2 => 1, S3 => 2, S4 => 3>, last = S4
);

join_step!(JoinBuilder1<S1> => JoinBuilder2);
join_step!(JoinBuilder2<S1, S2> => JoinBuilder3);
join_step!(JoinBuilder3<S1, S2, S3> => JoinBuilder4);

/// A compiled join bound to an executor and a row constructor.
pub struct JoinQuery<T> {
    compiled: CompiledJoin,
    executor: Arc<dyn SqlExecutor>,
    dialect: Arc<dyn Dialect>,
    mapper: RowMapper<T>,
}

impl<T> std::fmt::Debug for JoinQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinQuery")
            .field("sql", &self.compiled.select)
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> JoinQuery<T> {
    #[must_use]
    pub fn compiled(&self) -> &CompiledJoin {
        &self.compiled
    }

    /// A fresh stream over the joined rows. Skip and limit at the head of
    /// its pipeline are rendered when the dialect paginates; filters and
    /// sorts always run in memory.
    #[must_use]
    pub fn stream(&self) -> Stream<T> {
        SqlSource {
            base: self.compiled.base(),
            renders_fields: false,
            executor: Arc::clone(&self.executor),
            dialect: Arc::clone(&self.dialect),
            mapper: Rc::clone(&self.mapper),
        }
        .into_stream()
    }
}

impl JoinQuery<Row> {
    /// Raw joined rows of an already compiled join, one value per select
    /// list column.
    #[must_use]
    pub fn rows(
        compiled: CompiledJoin,
        executor: Arc<dyn SqlExecutor>,
        dialect: Arc<dyn Dialect>,
    ) -> Self {
        Self {
            compiled,
            executor,
            dialect,
            mapper: Rc::new(|row: &Row| Ok(row.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{LazyLock, Mutex};

    use relstream_types::{ColumnDef, TableDef, TableId};

    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::executor::{RowCursor, SqlQuery, VecCursor};

    #[derive(Debug, PartialEq)]
    struct Author {
        id: i64,
        name: String,
    }

    #[derive(Debug, PartialEq)]
    struct Book {
        id: i64,
        author_id: Option<i64>,
    }

    static AUTHOR: LazyLock<TableDef> = LazyLock::new(|| {
        TableDef::new(TableId::new("lib", "author"), [ColumnDef::new("id"), ColumnDef::new("name")])
    });
    static BOOK: LazyLock<TableDef> = LazyLock::new(|| {
        TableDef::new(TableId::new("lib", "book"), [ColumnDef::new("id"), ColumnDef::new("author_id")])
    });

    impl Author {
        const ID: Field<Author> = Field::new("id", |a| Value::from(a.id));
        const NAME: Field<Author> = Field::new("name", |a| Value::from(a.name.as_str()));
    }

    impl Book {
        const AUTHOR_ID: Field<Book> = Field::new("author_id", |b| Value::from(b.author_id));
    }

    impl Entity for Author {
        fn table() -> &'static TableDef {
            &AUTHOR
        }

        fn from_row(row: &Row, offset: usize) -> Result<Self> {
            let mut columns = row.columns_from(offset);
            Ok(Self {
                id: columns.read()?,
                name: columns.read()?,
            })
        }
    }

    impl Entity for Book {
        fn table() -> &'static TableDef {
            &BOOK
        }

        fn from_row(row: &Row, offset: usize) -> Result<Self> {
            let mut columns = row.columns_from(offset);
            Ok(Self {
                id: columns.read()?,
                author_id: columns.read()?,
            })
        }
    }

    #[derive(Default)]
    struct Canned {
        rows: Vec<Vec<Value>>,
        seen: Mutex<Vec<String>>,
    }

    impl SqlExecutor for Canned {
        fn execute(&self, query: &SqlQuery, _parallel: bool) -> Result<Box<dyn RowCursor>> {
            self.seen.lock().unwrap().push(query.sql.clone());
            let rows = self.rows.iter().cloned().map(Row::new).collect();
            Ok(Box::new(VecCursor::new(rows)))
        }
    }

    fn join(executor: Arc<Canned>) -> Join {
        Join::new(executor, Arc::new(SqliteDialect))
    }

    #[test]
    fn renders_typed_join() {
        let query = join(Arc::default())
            .from::<Author>()
            .where_(Author::NAME.starts_with("A"))
            .left_join_on(Book::AUTHOR_ID)
            .equal(Author::ID)
            .build(|author, book| (author, book))
            .unwrap();
        assert_eq!(
            query.compiled().select,
            "SELECT A.id, A.name, B.id, B.author_id FROM author AS A \
             LEFT JOIN book AS B ON (A.id = B.author_id)"
        );
        assert_eq!(query.compiled().conditions, vec!["instr(A.name, ?) = 1".to_string()]);
    }

    #[test]
    fn left_join_maps_missing_rows_to_none() {
        let executor = Arc::new(Canned {
            rows: vec![
                vec![Value::from(1), Value::from("Ann"), Value::from(10), Value::from(1)],
                vec![Value::from(2), Value::from("Bob"), Value::Null, Value::Null],
            ],
            ..Canned::default()
        });
        let query = join(Arc::clone(&executor))
            .from::<Author>()
            .left_join_on(Book::AUTHOR_ID)
            .equal(Author::ID)
            .build(|author: Author, book: Option<Book>| (author.name, book.map(|b| b.id)))
            .unwrap();
        let rows = query.stream().to_vec().unwrap();
        assert_eq!(
            rows,
            vec![("Ann".to_string(), Some(10)), ("Bob".to_string(), None)]
        );
    }

    #[test]
    fn each_stream_executes_once() {
        let executor = Arc::new(Canned::default());
        let query = join(Arc::clone(&executor))
            .from::<Author>()
            .cross_join::<Book>()
            .build(|a: Author, b: Book| (a.id, b.id))
            .unwrap();
        assert_eq!(query.stream().limit(3).count().unwrap(), 0);
        assert_eq!(query.stream().count().unwrap(), 0);
        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].ends_with("FROM author AS A, book AS B LIMIT ?"), "{}", seen[0]);
    }

    #[test]
    fn raw_rows_keep_every_column() {
        let executor = Arc::new(Canned {
            rows: vec![vec![Value::from(1), Value::from("Ann")]],
            ..Canned::default()
        });
        let stages = [JoinStage::from(AUTHOR.clone())];
        let compiled = compile_join(&stages, &SqliteDialect).unwrap();
        let rows = JoinQuery::rows(compiled, executor, Arc::new(SqliteDialect))
            .stream()
            .to_vec()
            .unwrap();
        assert_eq!(rows[0].values(), &[Value::from(1), Value::from("Ann")]);
    }

    #[test]
    fn foreign_field_from_later_stage_is_rejected() {
        let err = join(Arc::default())
            .from::<Author>()
            .inner_join_on(Author::ID)
            .equal(Book::AUTHOR_ID)
            .build(|a: Author, b: Author| (a, b))
            .unwrap_err();
        assert_eq!(err.to_string(), "no table for lib.book, available: lib.author");
    }
}
