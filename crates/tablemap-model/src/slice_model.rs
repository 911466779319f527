//! Model bound to a growable sequence of entities: one element per row.

use std::any::Any;
use std::fmt;

use tablemap_core::{Cx, Entity, Error, Hook, Result, Rows, Table, Value, registry};
use tablemap_query::QueryFn;

use crate::db::Db;
use crate::join::{JoinId, JoinTree};
use crate::model::TableModel;
use crate::scan::{self, ScanPlan};

/// Scans every row of a result set into a new element of a `Vec<E>`.
pub struct SliceModel<'v, E: Entity> {
    db: Db,
    tree: JoinTree,
    slice: &'v mut Vec<E>,
    columns: Vec<String>,
}

impl<'v, E: Entity> SliceModel<'v, E> {
    /// Bind `slice`.
    pub fn new(db: &Db, slice: &'v mut Vec<E>) -> Self {
        Self {
            db: db.clone(),
            tree: JoinTree::new(registry().table::<E>()),
            slice,
            columns: Vec::new(),
        }
    }

    /// The owning context.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The bound elements.
    pub fn elements(&self) -> &[E] {
        self.slice
    }
}

/// Storage of the join's base model in every element that has it.
fn owners<'a, E: Entity>(tree: &JoinTree, slice: &'a mut [E], join: JoinId) -> Vec<&'a mut dyn Any> {
    let base = tree.join(join).base_node();
    slice
        .iter_mut()
        .flat_map(|element| scan::locate_all(tree, JoinTree::ROOT, element, base))
        .collect()
}

impl<E: Entity> TableModel for SliceModel<'_, E> {
    fn table(&self) -> &'static Table {
        self.tree.root_table()
    }

    fn is_nil(&self) -> bool {
        false
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

    /// Replace the slice contents with one element per row. Zero rows is not
    /// an error.
    fn scan_rows(&mut self, cx: &Cx, rows: &mut dyn Rows) -> Result<usize> {
        self.columns = rows.columns()?;
        let plan = ScanPlan::new(
            &self.tree,
            JoinTree::ROOT,
            &self.columns,
            self.db.config().discard_unknown_columns,
        );

        self.slice.clear();
        while rows.next()? {
            self.slice.push(E::default());
            let Some(element) = self.slice.last_mut() else {
                break;
            };
            scan::scan_row(cx, &self.tree, &plan, Some(element as &mut dyn Any), rows)?;
        }
        Ok(self.slice.len())
    }

    fn scan_relation(&mut self, cx: &Cx, join: JoinId, rows: &mut dyn Rows) -> Result<usize> {
        let discard = self.db.config().discard_unknown_columns;
        let mut owners = owners(&self.tree, self.slice, join);
        scan::attach_rows(cx, &self.tree, join, &mut owners, rows, discard)
    }

    fn relation_keys(&mut self, join: JoinId) -> Result<Vec<Vec<Value>>> {
        let owners = owners(&self.tree, self.slice, join);
        scan::relation_keys(&self.tree, join, &owners)
    }

    /// Run `hook` on every element; all run, the first error is returned.
    fn run_hook(&mut self, cx: &Cx, hook: Hook) -> Result<()> {
        let table = self.tree.root_table();
        if !table.has_hook(hook) {
            return Ok(());
        }
        let mut first: Option<Error> = None;
        for element in self.slice.iter_mut() {
            if let Err(err) = table.call_hook(hook, element, cx) {
                if first.is_none() {
                    first = Some(err);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<E: Entity> fmt::Debug for SliceModel<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceModel")
            .field("table", &self.tree.root_table().name())
            .field("len", &self.slice.len())
            .field("joins", &self.tree.joins().count())
            .field("columns", &self.columns)
            .finish()
    }
}
