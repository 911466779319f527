//! Per-type table metadata and the process-wide registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use asupersync::Cx;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::field::Column;
use crate::hooks::{self, Hook, HookFn, HookSet};
use crate::relationship::Relation;

/// Static description of one mapped type.
///
/// Built once (usually by `#[derive(Entity)]`), then shared read-only.
pub struct Table {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
    alias: &'static str,
    columns: Vec<Column>,
    field_map: HashMap<&'static str, usize>,
    primary_keys: Vec<usize>,
    relations: Vec<Relation>,
    hooks: HookSet,
    dispatch: HookFn,
    new_instance: fn() -> Box<dyn Any>,
}

impl Table {
    /// Start building the table for `E`.
    pub fn builder<E: Entity>(name: &'static str, alias: &'static str) -> TableBuilder {
        TableBuilder {
            type_id: TypeId::of::<E>(),
            type_name: short_type_name(std::any::type_name::<E>()),
            name,
            alias,
            columns: Vec::new(),
            relations: Vec::new(),
            hooks: HookSet::empty(),
            dispatch: hooks::dispatch::<E>,
            new_instance: || Box::new(E::default()),
        }
    }

    /// `TypeId` of the mapped type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Short Rust type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// SQL table name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Model alias; also accepted as a column prefix for the table's own columns.
    pub fn alias(&self) -> &'static str {
        self.alias
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look a column up by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.field_map.get(name).copied()
    }

    /// Primary key columns.
    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.primary_keys.iter().map(|i| &self.columns[*i])
    }

    /// Relations in declaration order.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Look a relation up by field name, then by alias.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .or_else(|| self.relations.iter().find(|r| r.alias == name))
    }

    /// Declared hooks.
    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    /// Whether the type declares `hook`.
    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hooks.has(hook)
    }

    /// Run `hook` on `instance` if the type declares it.
    ///
    /// Failures are wrapped in `Error::Hook` naming the hook and the type.
    pub fn call_hook(&self, hook: Hook, instance: &mut dyn Any, cx: &Cx) -> Result<()> {
        if !self.hooks.has(hook) {
            return Ok(());
        }
        (self.dispatch)(hook, instance, cx).map_err(|source| Error::Hook {
            hook,
            model: self.type_name,
            source: Box::new(source),
        })
    }

    /// A fresh `Default` instance of the mapped type.
    pub fn new_instance(&self) -> Box<dyn Any> {
        (self.new_instance)()
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field(
                "columns",
                &self.columns.iter().map(|c| c.name).collect::<Vec<_>>(),
            )
            .field(
                "relations",
                &self.relations.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Builder returned by [`Table::builder`].
pub struct TableBuilder {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
    alias: &'static str,
    columns: Vec<Column>,
    relations: Vec<Relation>,
    hooks: HookSet,
    dispatch: HookFn,
    new_instance: fn() -> Box<dyn Any>,
}

impl TableBuilder {
    /// Append a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Append a relation.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        let index = self.relations.len();
        self.relations.push(relation.with_index(index));
        self
    }

    /// Declare the hooks the type implements.
    #[must_use]
    pub fn hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    /// Finish the table.
    pub fn build(self) -> Table {
        let field_map = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name, i))
            .collect();
        let primary_keys = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();
        Table {
            type_id: self.type_id,
            type_name: self.type_name,
            name: self.name,
            alias: self.alias,
            columns: self.columns,
            field_map,
            primary_keys,
            relations: self.relations,
            hooks: self.hooks,
            dispatch: self.dispatch,
            new_instance: self.new_instance,
        }
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// Thread-safe map from `TypeId` to table metadata.
///
/// Tables are registered lazily the first time a type is looked up through
/// [`Registry::table`] and stay valid for the lifetime of the program.
pub struct Registry {
    tables: RwLock<HashMap<TypeId, &'static Table>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Table for `E`, registering it on first use.
    pub fn table<E: Entity>(&self) -> &'static Table {
        let type_id = TypeId::of::<E>();
        // Fast path: check if already registered
        if let Some(table) = self.lookup(type_id) {
            return table;
        }

        // Slow path: build and register
        let table = E::table();
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(type_id).or_insert(table);
        }
        tracing::debug!(
            model = table.type_name(),
            table = table.name(),
            columns = table.columns().len(),
            relations = table.relations().len(),
            "Registered table"
        );
        table
    }

    /// Table for a type that was registered before.
    pub fn lookup(&self, type_id: TypeId) -> Option<&'static Table> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(&type_id).copied())
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or(0)
    }

    /// True when nothing was registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Global registry singleton.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldAccessor, get_field, set_field};
    use crate::hooks::ModelHooks;

    #[derive(Default)]
    struct Tag {
        id: i64,
        label: String,
    }

    impl ModelHooks for Tag {
        fn after_select(&mut self, _cx: &Cx) -> Result<()> {
            Err(Error::custom("refused"))
        }
    }

    impl Entity for Tag {
        fn table() -> &'static Table {
            static TABLE: OnceLock<Table> = OnceLock::new();
            TABLE.get_or_init(|| {
                Table::builder::<Tag>("tags", "tag")
                    .column(
                        Column::new(
                            "id",
                            "id",
                            FieldAccessor::new(
                                |inst| get_field::<Tag, i64>(inst, |e| &e.id),
                                |inst, v| set_field::<Tag, i64>(inst, v, "id", |e| &mut e.id),
                            ),
                        )
                        .primary_key(true),
                    )
                    .column(Column::new(
                        "label",
                        "label",
                        FieldAccessor::new(
                            |inst| get_field::<Tag, String>(inst, |e| &e.label),
                            |inst, v| set_field::<Tag, String>(inst, v, "label", |e| &mut e.label),
                        ),
                    ))
                    .hooks(HookSet::from_hooks(&[Hook::AfterSelect]))
                    .build()
            })
        }
    }

    #[test]
    fn test_table_lookups() {
        let table = Tag::table();
        assert_eq!(table.type_name(), "Tag");
        assert_eq!(table.name(), "tags");
        assert_eq!(table.column_index("label"), Some(1));
        assert!(table.column("missing").is_none());
        assert_eq!(
            table.primary_keys().map(|c| c.name).collect::<Vec<_>>(),
            vec!["id"]
        );
    }

    #[test]
    fn test_registry_memoizes() {
        let first = registry().table::<Tag>();
        let second = registry().table::<Tag>();
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(
            registry().lookup(TypeId::of::<Tag>()).unwrap(),
            first
        ));
    }

    #[test]
    fn test_call_hook_respects_declared_set() {
        let cx = Cx::for_testing();
        let table = Tag::table();
        let mut tag = Tag::default();
        // Declared and failing: wrapped with hook + model.
        let err = table.call_hook(Hook::AfterSelect, &mut tag, &cx).unwrap_err();
        assert_eq!(err.hook(), Some((Hook::AfterSelect, "Tag")));
        // Not declared: never dispatched.
        table.call_hook(Hook::AfterScan, &mut tag, &cx).unwrap();
    }

    #[test]
    fn test_new_instance_is_default() {
        let instance = Tag::table().new_instance();
        let tag = instance.downcast_ref::<Tag>().unwrap();
        assert_eq!(tag.id, 0);
        assert!(tag.label.is_empty());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("app::models::User"), "User");
        assert_eq!(short_type_name("Wrapper<app::X>"), "Wrapper");
    }
}
