use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use relstream_core::{Close, DialectKind, JoinQuery};
use relstream_sqlite::SqliteExecutor;
use serde_json::{Map, Value as JsonValue};

/// Execute the `run` command: run the query against its `SQLite` database
/// and write one JSON object per joined row.
pub fn execute(query_path: &Path, limit: Option<u64>, out: &mut impl Write) -> Result<()> {
    let loaded = super::load(query_path)?;
    if loaded.config.dialect != DialectKind::Sqlite {
        bail!(
            "Query dialect '{:?}' cannot run against a SQLite database",
            loaded.config.dialect
        );
    }
    let Some(database) = loaded.config.database.as_deref() else {
        bail!("Query file does not name a database to run against");
    };

    let executor = SqliteExecutor::open(database)
        .with_context(|| format!("Failed to open database: {}", database.display()))?;
    let columns: Vec<String> = loaded
        .compiled
        .stages
        .iter()
        .flat_map(|s| s.columns.iter().cloned())
        .collect();
    let query = JoinQuery::rows(loaded.compiled, Arc::new(executor), loaded.dialect);

    let mut stream = query.stream();
    if let Some(skip) = loaded.config.skip {
        stream = stream.skip(skip);
    }
    if let Some(limit) = limit.or(loaded.config.limit) {
        stream = stream.limit(limit);
    }
    tracing::debug!(query = ?stream.explain()?, "running query");

    let start = Instant::now();
    let mut rows = stream.iter()?;
    let mut count = 0_u64;
    for row in rows.by_ref() {
        let row = row?;
        let mut object = Map::with_capacity(columns.len());
        for (name, value) in columns.iter().zip(row.values()) {
            object.insert(name.clone(), serde_json::to_value(value)?);
        }
        serde_json::to_writer(&mut *out, &JsonValue::Object(object))?;
        writeln!(out)?;
        count += 1;
    }
    rows.close()?;

    tracing::info!(
        rows = count,
        duration_ms = start.elapsed().as_millis(),
        "query complete"
    );
    Ok(())
}
