//! The trait every mapped type implements.

use std::any::Any;

use crate::hooks::ModelHooks;
use crate::table::Table;

/// A struct mapped to a table.
///
/// Usually derived with `#[derive(Entity)]`. A manual implementation builds its
/// `Table` once and caches it in a `static OnceLock<Table>`.
pub trait Entity: ModelHooks + Default + Any + Send {
    /// Static table metadata for this type.
    fn table() -> &'static Table;

    /// SQL table name.
    fn table_name() -> &'static str {
        Self::table().name()
    }
}
