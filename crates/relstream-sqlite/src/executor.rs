//! `SQLite`-backed implementation of [`SqlExecutor`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Result sets are
//! read completely while the connection is locked and handed out as a
//! buffered cursor.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use relstream_core::executor::{RowCursor, SqlExecutor, SqlQuery, VecCursor};
use relstream_types::{Error, Result, Row};
use rusqlite::{params_from_iter, Connection};

use crate::convert::{from_sqlite, to_sqlite};

/// `SQLite` statement executor.
///
/// Create with [`SqliteExecutor::open`] for a database file or
/// [`SqliteExecutor::in_memory`] for tests.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor").finish_non_exhaustive()
    }
}

impl SqliteExecutor {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the directory can't be created or
    /// the database can't be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::execution(format!("create {}", parent.display()), e))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::execution(format!("open {}", path.display()), e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the database can't be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::execution("open in-memory", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run one or more statements without parameters, e.g. DDL and fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] wrapping the `SQLite` failure.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock_conn()?
            .execute_batch(sql)
            .map_err(|e| Error::execution("execute batch", e))
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::execution("lock connection", "sqlite connection lock poisoned"))
    }

    fn fetch_all(conn: &Connection, query: &SqlQuery) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = conn.prepare(&query.sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(query.values.iter().map(to_sqlite)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(from_sqlite(row.get_ref(index)?));
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&self, query: &SqlQuery, parallel: bool) -> Result<Box<dyn RowCursor>> {
        let conn = self.lock_conn()?;
        let rows = Self::fetch_all(&conn, query)
            .map_err(|e| Error::execution(format!("execute `{}`", query.sql), e))?;
        tracing::debug!(
            sql = %query.sql,
            params = query.values.len(),
            rows = rows.len(),
            parallel,
            "sqlite query executed"
        );
        Ok(Box::new(VecCursor::new(rows)))
    }
}
