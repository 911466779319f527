//! The mapping engine: binds entity storage to result sets.
//!
//! `tablemap-model` turns the static metadata of `tablemap-core` into models
//! that rows are scanned into.
//!
//! - [`StructModel`] binds one entity and scans exactly one row.
//! - [`SliceModel`] binds a `Vec<E>` and scans one element per row.
//! - [`JoinTree`] resolves dotted relation paths once per model and routes
//!   `alias__column` result columns to the joined model that owns them.
//! - [`Db`] carries the configuration, the formatter and the query hooks.
//!
//! Inline relations (has-one, belongs-to) are populated from the owner's own
//! row; their storage is allocated only when a non-NULL value arrives for it.
//! Accumulated relations (has-many, many-to-many) are loaded from a second result
//! set through [`TableModel::relation_query`] and [`TableModel::scan_relation`].

pub mod db;
pub mod join;
pub mod model;
pub mod scan;
pub mod slice_model;
pub mod struct_model;

#[cfg(test)]
mod fixtures;

pub use db::{Db, DbConfig};
pub use join::{Join, JoinId, JoinTree, ModelNode, NodeId};
pub use model::TableModel;
pub use scan::{Dest, ScanPlan};
pub use slice_model::SliceModel;
pub use struct_model::StructModel;
