//! Multi-table joins.
//!
//! [`JoinStage`]s describe the tables and ON conditions, [`compile_join`]
//! turns them into one aliased SELECT, and the typed [`Join`] builder binds
//! the compiled statement to entity constructors and a stream source.

mod builder;
mod compiler;
mod stage;

pub use builder::{
    FromStages, Join, JoinBuilder1, JoinBuilder2, JoinBuilder3, JoinBuilder4, JoinParts, JoinQuery,
    Nullable, PendingJoin, Required, StageValue,
};
pub use compiler::{alias, compile_join, CompiledJoin, SqlStage, MAX_STAGES};
pub use stage::{JoinCondition, JoinOperator, JoinStage, JoinType};
