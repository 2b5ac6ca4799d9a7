//! Lazy stream pipelines over SQL tables and joins.
//!
//! A [`Stream`] records every intermediate operation as a pipeline
//! [`Action`](pipeline::Action). When a terminal operation runs, the
//! [`StreamTerminator`] renders the longest prefix it can express as SQL and
//! the rest of the pipeline is replayed in memory over the fetched rows.

#![warn(clippy::pedantic)]

pub mod dialect;
pub mod executor;
pub mod join;
pub mod manager;
pub mod pipeline;
pub mod resource;
pub mod stream;
pub mod terminator;

// Re-export public API for convenience
pub use dialect::{Dialect, DialectKind};
pub use executor::{RowCursor, SqlExecutor, SqlQuery};
pub use join::{compile_join, CompiledJoin, Join, JoinQuery, JoinStage};
pub use manager::Manager;
pub use resource::{close_all, compose, Close};
pub use stream::{concat_and_auto_close, DoubleStream, IntStream, LongStream, Stream, StreamIter};
pub use terminator::StreamTerminator;
