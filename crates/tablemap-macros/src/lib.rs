//! Procedural macros for tablemap.
//!
//! `#[derive(Entity)]` builds a type's `Table` metadata from `#[tablemap(...)]`
//! attributes:
//!
//! ```ignore
//! #[derive(Debug, Default, Entity)]
//! #[tablemap(table = "users", hooks(after_scan))]
//! struct User {
//!     #[tablemap(pk, autoincrement)]
//!     id: i64,
//!     name: String,
//!     #[tablemap(rel = "has-one", join = "id=user_id")]
//!     profile: Option<Box<Profile>>,
//!     #[tablemap(rel = "has-many", join = "id=user_id")]
//!     posts: Vec<Post>,
//! }
//! ```
//!
//! Struct attributes: `table`, `alias`, `hooks(...)`. When `hooks` is given the
//! type implements `ModelHooks` itself; otherwise an empty implementation is
//! generated.
//!
//! Field attributes: `pk`, `autoincrement`, `nullable`, `column = "..."`,
//! `skip`, `scan_with = "path"`, `append_with = "path"`, and for relations
//! `rel = "has-one" | "belongs-to" | "has-many" | "many-to-many"`,
//! `join = "base=join[,base=join]"`, `alias = "..."`, `link = "..."`,
//! `link_remote = "..."`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod entity_derive;

/// Derive `tablemap_core::Entity` (and table metadata) for a struct.
#[proc_macro_derive(Entity, attributes(tablemap))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match entity_derive::parse_entity(&input) {
        Ok(def) => entity_derive::generate_entity_impl(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
