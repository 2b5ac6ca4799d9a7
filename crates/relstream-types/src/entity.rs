//! Entity contract implemented by generated (or hand-written) row types.

use crate::error::Result;
use crate::table::TableDef;
use crate::value::Row;

/// A row type bound to one table.
///
/// `from_row` reads the table's enabled columns, in [`TableDef`] order,
/// starting at `offset` of a possibly wider joined row.
pub trait Entity: Sized + 'static {
    fn table() -> &'static TableDef;

    /// # Errors
    ///
    /// Returns [`Error::Mapping`](crate::Error::Mapping) when a column is
    /// missing or has an incompatible type.
    fn from_row(row: &Row, offset: usize) -> Result<Self>;
}
