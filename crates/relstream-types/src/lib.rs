//! Shared relstream model types.
//!
//! Values and rows exchanged with SQL executors, table metadata, typed
//! entity fields with their renderable predicates and comparators, and the
//! error taxonomy used by every other crate in the workspace.

#![warn(clippy::pedantic)]

pub mod entity;
pub mod error;
pub mod field;
pub mod predicate;
pub mod table;
pub mod value;

pub use entity::Entity;
pub use error::{ConfigError, Error, Result};
pub use field::{Field, FieldComparator, FieldPredicate};
pub use predicate::{Direction, Inclusion, OrderSpec, PredicateOp, PredicateSpec};
pub use table::{ColumnDef, ColumnRef, TableDef, TableId};
pub use value::{ColumnReader, FromValue, Row, Value};
