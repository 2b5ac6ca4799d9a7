//! Semantic validation for parsed query configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};
use relstream_core::join::{JoinType, MAX_STAGES};

use crate::config::types::{QueryConfig, StageConfig};

fn validate_tables(config: &QueryConfig, errors: &mut Vec<String>) {
    if config.tables.is_empty() {
        errors.push("At least one table must be declared".to_string());
    }

    let mut seen = HashSet::new();
    for (i, table) in config.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            errors.push(format!("Table {i} has an empty name"));
            continue;
        }
        if !seen.insert(table.name.as_str()) {
            errors.push(format!("Table '{}' is declared more than once", table.name));
        }
        if table.columns.is_empty() {
            errors.push(format!("Table '{}' declares no columns", table.name));
        }
        if table.columns.iter().any(|c| c.name().trim().is_empty()) {
            errors.push(format!("Table '{}' has a column with an empty name", table.name));
        }
    }
}

/// Validate the shape of one stage. Whether referenced columns and tables
/// resolve against earlier stages is left to the join compiler.
fn validate_stage(config: &QueryConfig, index: usize, stage: &StageConfig, errors: &mut Vec<String>) {
    let context = format!("Join stage {index} ({})", stage.table);

    if config.table(&stage.table).is_none() {
        errors.push(format!("{context}: unknown table '{}'", stage.table));
    }
    for foreign in &stage.foreign {
        if config.table(&foreign.table).is_none() {
            errors.push(format!("{context}: unknown foreign table '{}'", foreign.table));
        }
    }

    match (index, stage.join_type) {
        (0, Some(_)) => errors.push(format!("{context}: the first stage must not have a join type")),
        (0, None) => {}
        (_, None) => errors.push(format!("{context}: missing join type")),
        (_, Some(JoinType::Cross)) => {
            if stage.operator.is_some() || stage.local.is_some() || !stage.foreign.is_empty() {
                errors.push(format!("{context}: a cross join takes no condition"));
            }
        }
        (_, Some(_)) => match stage.operator {
            None => errors.push(format!("{context}: missing join operator")),
            Some(operator) => {
                if stage.local.as_deref().map_or(true, |l| l.trim().is_empty()) {
                    errors.push(format!("{context}: missing local column"));
                }
                if stage.foreign.len() != operator.foreign_arity() {
                    errors.push(format!(
                        "{context}: operator {operator:?} expects {} foreign column(s), got {}",
                        operator.foreign_arity(),
                        stage.foreign.len()
                    ));
                }
            }
        },
    }

    for predicate in &stage.predicates {
        let arity_ok = match predicate.op.arity() {
            Some(n) => predicate.values.len() == n,
            None => !predicate.values.is_empty(),
        };
        if !arity_ok {
            errors.push(format!(
                "{context}: predicate {:?} on '{}' has {} value(s)",
                predicate.op,
                predicate.column,
                predicate.values.len()
            ));
        }
    }
}

/// Validate a parsed query configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the query config.
pub fn validate_query(config: &QueryConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported query version '{}', expected '1.0'",
            config.version
        ));
    }

    validate_tables(config, &mut errors);

    if config.join.is_empty() {
        errors.push("Join must have at least one stage".to_string());
    }
    if config.join.len() > MAX_STAGES {
        errors.push(format!(
            "Join has {} stages, at most {MAX_STAGES} are supported",
            config.join.len()
        ));
    }
    for (index, stage) in config.join.iter().enumerate() {
        validate_stage(config, index, stage, &mut errors);
    }

    if !errors.is_empty() {
        bail!("Query validation failed:\n  - {}", errors.join("\n  - "));
    }
    Ok(())
}
