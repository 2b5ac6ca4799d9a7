//! `SQLite` execution provider for relstream.
//!
//! [`SqliteExecutor`] runs rendered statements on a single
//! `Mutex<Connection>` and returns their rows through the
//! [`SqlExecutor`](relstream_core::SqlExecutor) interface.

#![warn(clippy::pedantic)]

pub mod convert;
pub mod executor;

pub use executor::SqliteExecutor;
