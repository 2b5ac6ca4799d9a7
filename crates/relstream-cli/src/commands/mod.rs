pub mod explain;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use relstream_core::join::compile_join;
use relstream_core::{CompiledJoin, Dialect};

use crate::config::parser;
use crate::config::types::QueryConfig;
use crate::config::validator;

/// A parsed, validated and compiled query file.
pub struct LoadedQuery {
    pub config: QueryConfig,
    pub dialect: Arc<dyn Dialect>,
    pub compiled: CompiledJoin,
}

/// Parse, validate and compile the query at `path`.
pub fn load(path: &Path) -> Result<LoadedQuery> {
    let config = parser::parse_query(path)
        .with_context(|| format!("Failed to parse query: {}", path.display()))?;
    validator::validate_query(&config)?;

    let dialect = config.dialect.dialect(config.pagination);
    let stages = config.join_stages()?;
    let compiled = compile_join(&stages, dialect.as_ref()).context("Failed to compile join")?;
    Ok(LoadedQuery {
        config,
        dialect,
        compiled,
    })
}
