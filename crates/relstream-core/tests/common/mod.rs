//! Shared fixtures: a small film catalogue in in-memory `SQLite` and an
//! executor wrapper that records statements and cursor closes.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use relstream_core::executor::{RowCursor, SqlExecutor, SqlQuery};
use relstream_sqlite::SqliteExecutor;
use relstream_types::{ColumnDef, Entity, Error, Field, Result, Row, TableDef, TableId, Value};

pub const FIXTURE: &str = r"
CREATE TABLE language (language_id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE film (
    film_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    language_id INTEGER NOT NULL,
    rating TEXT NOT NULL,
    length INTEGER NOT NULL
);
CREATE TABLE review (review_id INTEGER PRIMARY KEY, film_id INTEGER NOT NULL, stars INTEGER NOT NULL);
CREATE TABLE band (band_id INTEGER PRIMARY KEY, label TEXT NOT NULL, low INTEGER NOT NULL, high INTEGER NOT NULL);

INSERT INTO language VALUES (1, 'English'), (2, 'Italian'), (3, 'Japanese');
INSERT INTO film VALUES
    (1, 'ACADEMY DINOSAUR', 1, 'PG', 86),
    (2, 'ACE GOLDFINGER', 1, 'G', 48),
    (3, 'ADAPTATION HOLES', 2, 'NC-17', 50),
    (4, 'AFFAIR PREJUDICE', 1, 'G', 117),
    (5, 'AFRICAN EGG', 2, 'G', 130),
    (6, 'AGENT TRUMAN', 1, 'PG', 169);
INSERT INTO review VALUES (1, 1, 5), (2, 1, 3), (3, 4, 4);
INSERT INTO band VALUES (1, 'short', 0, 60), (2, 'medium', 60, 120), (3, 'long', 120, 200);
";

pub fn sakila() -> Arc<SqliteExecutor> {
    let executor = SqliteExecutor::in_memory().unwrap();
    executor.execute_batch(FIXTURE).unwrap();
    Arc::new(executor)
}

fn table(name: &str, columns: &[&str]) -> TableDef {
    TableDef::new(
        TableId::new("sakila", name),
        columns.iter().map(|c| ColumnDef::new(*c)),
    )
}

static FILM: LazyLock<TableDef> =
    LazyLock::new(|| table("film", &["film_id", "title", "language_id", "rating", "length"]));
static LANGUAGE: LazyLock<TableDef> = LazyLock::new(|| table("language", &["language_id", "name"]));
static REVIEW: LazyLock<TableDef> =
    LazyLock::new(|| table("review", &["review_id", "film_id", "stars"]));
static BAND: LazyLock<TableDef> = LazyLock::new(|| table("band", &["band_id", "label", "low", "high"]));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Film {
    pub film_id: i64,
    pub title: String,
    pub language_id: i64,
    pub rating: String,
    pub length: i64,
}

impl Film {
    pub const FILM_ID: Field<Film> = Field::new("film_id", |f| Value::from(f.film_id));
    pub const TITLE: Field<Film> = Field::new("title", |f| Value::from(f.title.as_str()));
    pub const LANGUAGE_ID: Field<Film> = Field::new("language_id", |f| Value::from(f.language_id));
    pub const RATING: Field<Film> = Field::new("rating", |f| Value::from(f.rating.as_str()));
    pub const LENGTH: Field<Film> = Field::new("length", |f| Value::from(f.length));
}

impl Entity for Film {
    fn table() -> &'static TableDef {
        &FILM
    }

    fn from_row(row: &Row, offset: usize) -> Result<Self> {
        let mut columns = row.columns_from(offset);
        Ok(Self {
            film_id: columns.read()?,
            title: columns.read()?,
            language_id: columns.read()?,
            rating: columns.read()?,
            length: columns.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub language_id: i64,
    pub name: String,
}

impl Language {
    pub const LANGUAGE_ID: Field<Language> =
        Field::new("language_id", |l| Value::from(l.language_id));
    pub const NAME: Field<Language> = Field::new("name", |l| Value::from(l.name.as_str()));
}

impl Entity for Language {
    fn table() -> &'static TableDef {
        &LANGUAGE
    }

    fn from_row(row: &Row, offset: usize) -> Result<Self> {
        let mut columns = row.columns_from(offset);
        Ok(Self {
            language_id: columns.read()?,
            name: columns.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub review_id: i64,
    pub film_id: i64,
    pub stars: i64,
}

impl Review {
    pub const FILM_ID: Field<Review> = Field::new("film_id", |r| Value::from(r.film_id));
    pub const STARS: Field<Review> = Field::new("stars", |r| Value::from(r.stars));
}

impl Entity for Review {
    fn table() -> &'static TableDef {
        &REVIEW
    }

    fn from_row(row: &Row, offset: usize) -> Result<Self> {
        let mut columns = row.columns_from(offset);
        Ok(Self {
            review_id: columns.read()?,
            film_id: columns.read()?,
            stars: columns.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    pub band_id: i64,
    pub label: String,
    pub low: i64,
    pub high: i64,
}

impl Band {
    pub const LOW: Field<Band> = Field::new("low", |b| Value::from(b.low));
    pub const HIGH: Field<Band> = Field::new("high", |b| Value::from(b.high));
}

impl Entity for Band {
    fn table() -> &'static TableDef {
        &BAND
    }

    fn from_row(row: &Row, offset: usize) -> Result<Self> {
        let mut columns = row.columns_from(offset);
        Ok(Self {
            band_id: columns.read()?,
            label: columns.read()?,
            low: columns.read()?,
            high: columns.read()?,
        })
    }
}

/// Forwards to an inner executor, recording every statement and counting
/// executions and cursor closes. Can be told to fail the next execution.
pub struct Tracking {
    inner: Arc<dyn SqlExecutor>,
    pub queries: Mutex<Vec<SqlQuery>>,
    pub closes: Arc<AtomicUsize>,
    fail_next: AtomicBool,
}

impl Tracking {
    pub fn new(inner: Arc<dyn SqlExecutor>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            queries: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_next: AtomicBool::new(false),
        })
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn executions(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_sql(&self) -> String {
        self.queries.lock().unwrap().last().map(|q| q.sql.clone()).unwrap_or_default()
    }
}

impl SqlExecutor for Tracking {
    fn execute(&self, query: &SqlQuery, parallel: bool) -> Result<Box<dyn RowCursor>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::execution("execute", "connection reset"));
        }
        let cursor = self.inner.execute(query, parallel)?;
        Ok(Box::new(TrackedCursor {
            inner: cursor,
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct TrackedCursor {
    inner: Box<dyn RowCursor>,
    closes: Arc<AtomicUsize>,
}

impl RowCursor for TrackedCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.inner.next_row()
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
