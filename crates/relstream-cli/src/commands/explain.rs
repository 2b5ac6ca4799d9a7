use std::io::Write;
use std::path::Path;

use anyhow::Result;
use relstream_core::pipeline::{Action, Pipeline};
use relstream_core::StreamTerminator;

/// Execute the `explain` command: print the statement and its bound values
/// without touching the database.
pub fn execute(query_path: &Path, out: &mut impl Write) -> Result<()> {
    let loaded = super::load(query_path)?;

    let mut pipeline = Pipeline::new();
    if let Some(skip) = loaded.config.skip {
        pipeline.push(Action::Skip(skip))?;
    }
    if let Some(limit) = loaded.config.limit {
        pipeline.push(Action::Limit(limit))?;
    }

    let terminator = StreamTerminator::new(loaded.dialect.as_ref(), false);
    let plan = terminator.plan(&pipeline);
    let query = terminator.render(&loaded.compiled.base(), &plan)?;

    writeln!(out, "Dialect: {}", loaded.dialect.name())?;
    writeln!(out, "SQL:     {}", query.sql)?;
    writeln!(out, "Values:  {}", serde_json::to_string(&query.values)?)?;
    if plan.rendered < pipeline.len() {
        writeln!(out, "Applied in memory: skip/limit")?;
    }
    for stage in &loaded.compiled.stages {
        writeln!(
            out,
            "  {} = {} (columns {}..{}{})",
            stage.alias,
            stage.table,
            stage.offset,
            stage.offset + stage.columns.len(),
            if stage.nullable { ", nullable" } else { "" }
        )?;
    }
    Ok(())
}
