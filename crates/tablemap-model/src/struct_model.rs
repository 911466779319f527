//! Model bound to a single entity instance.

use std::any::Any;
use std::fmt;

use tablemap_core::{Cx, Entity, Error, Hook, Result, Rows, Table, Value, registry};
use tablemap_query::QueryFn;

use crate::db::Db;
use crate::join::{JoinId, JoinTree};
use crate::model::TableModel;
use crate::scan::{self, ScanPlan};

/// Scans one result row into one entity, including its inline relations.
pub struct StructModel<'v> {
    db: Db,
    tree: JoinTree,
    instance: Option<&'v mut dyn Any>,
    columns: Vec<String>,
}

impl<'v> StructModel<'v> {
    /// Bind `value`.
    pub fn new<E: Entity>(db: &Db, value: &'v mut E) -> Self {
        Self {
            db: db.clone(),
            tree: JoinTree::new(registry().table::<E>()),
            instance: Some(value as &mut dyn Any),
            columns: Vec::new(),
        }
    }

    /// A model for `table` that is not bound to any instance.
    ///
    /// NULL columns are accepted and ignored; any other value fails with
    /// `Error::ModelNil`.
    pub fn nil(db: &Db, table: &'static Table) -> Self {
        Self {
            db: db.clone(),
            tree: JoinTree::new(table),
            instance: None,
            columns: Vec::new(),
        }
    }

    /// The owning context.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The bound instance.
    pub fn instance(&self) -> Option<&dyn Any> {
        self.instance.as_deref()
    }

    /// Scan the cursor's current row (the caller has already advanced it).
    pub fn scan_row(&mut self, cx: &Cx, rows: &mut dyn Rows) -> Result<()> {
        self.columns = rows.columns()?;
        let plan = ScanPlan::new(
            &self.tree,
            JoinTree::ROOT,
            &self.columns,
            self.db.config().discard_unknown_columns,
        );
        scan::scan_row(cx, &self.tree, &plan, self.instance.as_deref_mut(), rows)?;
        Ok(())
    }

    /// Every column of the root instance with its current value.
    pub fn values(&self) -> Result<Vec<(&'static str, Value)>> {
        let instance = self.instance.as_deref().ok_or(Error::ModelNil)?;
        self.table()
            .columns()
            .iter()
            .map(|c| Ok((c.name, c.read(instance)?)))
            .collect()
    }

    /// Render one column's current value through the context's formatter.
    pub fn append_column(&self, column: &str, buf: &mut String) -> Result<()> {
        let table = self.table();
        let instance = self.instance.as_deref().ok_or(Error::ModelNil)?;
        let col = table.column(column).ok_or_else(|| Error::SchemaMismatch {
            table: table.type_name(),
            column: column.to_string(),
        })?;
        self.db.formatter().append_value(buf, &col.read(instance)?);
        Ok(())
    }
}

impl TableModel for StructModel<'_> {
    fn table(&self) -> &'static Table {
        self.tree.root_table()
    }

    fn is_nil(&self) -> bool {
        self.instance.is_none()
    }

    fn tree(&self) -> &JoinTree {
        &self.tree
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn join(&mut self, path: &str, apply: Option<QueryFn>) -> Option<JoinId> {
        self.tree.resolve(path, apply)
    }

    /// Scan exactly one row; an empty cursor is `Error::NoRows`.
    fn scan_rows(&mut self, cx: &Cx, rows: &mut dyn Rows) -> Result<usize> {
        if !rows.next()? {
            return Err(Error::NoRows);
        }
        self.scan_row(cx, rows)?;
        Ok(1)
    }

    fn scan_relation(&mut self, cx: &Cx, join: JoinId, rows: &mut dyn Rows) -> Result<usize> {
        let base = self.tree.join(join).base_node();
        let instance = self.instance.as_deref_mut().ok_or(Error::ModelNil)?;
        let mut owners = scan::locate_all(&self.tree, JoinTree::ROOT, instance, base);
        scan::attach_rows(
            cx,
            &self.tree,
            join,
            &mut owners,
            rows,
            self.db.config().discard_unknown_columns,
        )
    }

    fn relation_keys(&mut self, join: JoinId) -> Result<Vec<Vec<Value>>> {
        let base = self.tree.join(join).base_node();
        let owners: Vec<&mut dyn Any> = match self.instance.as_deref_mut() {
            Some(instance) => scan::locate_all(&self.tree, JoinTree::ROOT, instance, base),
            None => Vec::new(),
        };
        scan::relation_keys(&self.tree, join, &owners)
    }

    fn run_hook(&mut self, cx: &Cx, hook: Hook) -> Result<()> {
        let table = self.tree.root_table();
        if !table.has_hook(hook) {
            return Ok(());
        }
        match self.instance.as_deref_mut() {
            Some(instance) => table.call_hook(hook, instance, cx),
            None if matches!(
                hook,
                Hook::BeforeUpdate | Hook::AfterUpdate | Hook::BeforeDelete | Hook::AfterDelete
            ) =>
            {
                Ok(())
            }
            None => Err(Error::ModelNil),
        }
    }
}

impl fmt::Debug for StructModel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructModel")
            .field("table", &self.tree.root_table().name())
            .field("nil", &self.instance.is_none())
            .field("joins", &self.tree.joins().count())
            .field("columns", &self.columns)
            .finish()
    }
}
