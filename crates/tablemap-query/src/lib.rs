//! Query-side collaborators for tablemap.
//!
//! `tablemap-query` holds the interfaces the mapping engine consumes but does
//! not own:
//!
//! - [`Formatter`]: the dialect's append contract, used to render values for
//!   diagnostics. [`NopFormatter`] renders portable literals.
//! - [`SelectQuery`]: a clause collector that relation query modifiers
//!   ([`QueryFn`]) operate on.
//! - [`QueryHook`]: before/after callbacks around each executed query, and
//!   [`TracingQueryHook`], which reports them through `tracing`.

pub mod formatter;
pub mod hook;
pub mod select;

pub use formatter::{Formatter, NopFormatter, append_literal};
pub use hook::{QueryError, QueryEvent, QueryHook, TracingQueryHook, query_operation};
pub use select::{OrderBy, QueryFn, SelectQuery, Where, query_fn};
