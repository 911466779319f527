//! Struct-to-table mapping and relation-aware result scanning.
//!
//! `tablemap` is the user-facing facade. It re-exports the metadata layer
//! (`tablemap-core`), the formatter and query hooks (`tablemap-query`), the
//! mapping engine (`tablemap-model`) and `#[derive(Entity)]`.
//!
//! ```ignore
//! use tablemap::prelude::*;
//!
//! #[derive(Debug, Default, Entity)]
//! #[tablemap(table = "users")]
//! struct User {
//!     #[tablemap(pk)]
//!     id: i64,
//!     name: String,
//!     #[tablemap(rel = "has-one", join = "id=user_id")]
//!     profile: Option<Box<Profile>>,
//! }
//!
//! let db = Db::new();
//! let mut user = User::default();
//! let mut model = db.model(&mut user);
//! model.join("profile", None);
//! db.scan_rows(&cx, &mut model, &mut rows, "SELECT ...")?;
//! ```

pub use tablemap_core::{
    ColumnSink, ConversionError, Cx, Entity, Error, FromValue, Hook, HookSet, IntoValue,
    ModelHooks, Relation, RelationKind, Result, RowSet, Rows, Table, Value, registry,
};
pub use tablemap_macros::Entity;
pub use tablemap_model::{
    Db, DbConfig, Join, JoinId, JoinTree, SliceModel, StructModel, TableModel,
};
pub use tablemap_query::{
    Formatter, NopFormatter, QueryEvent, QueryFn, QueryHook, SelectQuery, TracingQueryHook,
    query_fn,
};

/// Lower-level crates, for drivers and hand-built metadata.
pub use tablemap_core as core_types;
pub use tablemap_model as engine;
pub use tablemap_query as query;

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        Cx, Db, DbConfig, Entity, Error, ModelHooks, QueryHook, Result, RowSet, Rows,
        SelectQuery, SliceModel, StructModel, TableModel, TracingQueryHook, Value, query_fn,
    };
}
