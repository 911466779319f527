//! The contract shared by struct and slice models.

use tablemap_core::{Cx, Error, Hook, Result, Rows, Table, Value};
use tablemap_query::{QueryFn, SelectQuery};

use crate::join::{Join, JoinId, JoinTree};

/// A model bound to entity storage that result sets can be scanned into.
pub trait TableModel {
    /// Table of the root type.
    fn table(&self) -> &'static Table;

    /// True when the model is not bound to an instance.
    fn is_nil(&self) -> bool;

    /// The model's join tree.
    fn tree(&self) -> &JoinTree;

    /// Column names of the last scanned result set.
    fn columns(&self) -> &[String];

    /// Resolve a dotted relation path; `None` when any segment is unknown.
    fn join(&mut self, path: &str, apply: Option<QueryFn>) -> Option<JoinId>;

    /// Scan a result set; returns the number of rows consumed.
    fn scan_rows(&mut self, cx: &Cx, rows: &mut dyn Rows) -> Result<usize>;

    /// Attach the rows of an accumulated relation to their owners.
    fn scan_relation(&mut self, cx: &Cx, join: JoinId, rows: &mut dyn Rows) -> Result<usize>;

    /// Distinct owner key tuples for an accumulated relation.
    fn relation_keys(&mut self, join: JoinId) -> Result<Vec<Vec<Value>>>;

    /// Run a single-shot hook (AfterSelect and the insert/update/delete
    /// hooks) on the bound storage.
    fn run_hook(&mut self, cx: &Cx, hook: Hook) -> Result<()>;

    /// Like [`TableModel::join`], but an unknown path is an error.
    fn relation(&mut self, path: &str, apply: Option<QueryFn>) -> Result<JoinId> {
        self.join(path, apply)
            .ok_or_else(|| Error::RelationNotFound {
                table: self.table().type_name(),
                path: path.to_string(),
            })
    }

    /// A join of the root model by relation name or alias.
    fn get_join(&self, name: &str) -> Option<&Join> {
        let tree = self.tree();
        tree.get_join(JoinTree::ROOT, name).map(|id| tree.join(id))
    }

    /// The query selecting an accumulated relation's rows for the bound owners.
    fn relation_query(&mut self, join: JoinId) -> Result<SelectQuery> {
        let keys = self.relation_keys(join)?;
        crate::scan::relation_query(self.tree(), join, keys)
    }

    fn after_select(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::AfterSelect)
    }

    fn before_insert(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::BeforeInsert)
    }

    fn after_insert(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::AfterInsert)
    }

    fn before_update(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::BeforeUpdate)
    }

    fn after_update(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::AfterUpdate)
    }

    fn before_delete(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::BeforeDelete)
    }

    fn after_delete(&mut self, cx: &Cx) -> Result<()> {
        self.run_hook(cx, Hook::AfterDelete)
    }
}
