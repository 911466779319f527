//! Core types and traits for tablemap.
//!
//! `tablemap-core` is the **foundation layer** of the workspace. It defines the
//! metadata and data types the mapping engine in `tablemap-model` consumes.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Entity` and `ModelHooks` are implemented by user types
//!   (usually through `#[derive(Entity)]`); `Rows` and `ColumnSink` are the seam to
//!   the database driver.
//! - **Metadata**: `Table`, `Column`, and `Relation` describe one type each and are
//!   built once, then shared read-only through the `Registry`.
//! - **Data model**: `Value` is what drivers hand over and what accessors accept.
//! - **Structured concurrency**: re-exports `Cx` from asupersync; every hook receives
//!   it as the ambient cancellation context.
//!
//! Most applications should use the `tablemap` facade; reach for `tablemap-core`
//! directly when writing drivers or hand-built metadata.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::Cx;

pub mod entity;
pub mod error;
pub mod field;
pub mod hooks;
pub mod relationship;
pub mod row;
pub mod table;
pub mod value;

pub use entity::Entity;
pub use error::{ConversionError, Error, Result};
pub use field::{Column, FieldAccessor, FromValue, IntoValue};
pub use hooks::{Hook, HookSet, ModelHooks};
pub use relationship::{LinkTable, Relation, RelationKind, RelationSlot};
pub use row::{ColumnSink, RowSet, Rows};
pub use table::{Registry, Table, TableBuilder, registry};
pub use value::Value;
