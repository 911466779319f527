//! Row scanning: column routing, lazy mounting and scan hooks.
//!
//! A [`ScanPlan`] maps every result column to a destination once per result
//! set. [`scan_row`] then drives the cursor for one row with a stack-local
//! [`RowScanner`], which writes each value through the owning column's accessor
//! and remembers which models received a non-null value.

use std::any::Any;

use tablemap_core::{
    ColumnSink, Cx, Error, Hook, Relation, RelationKind, RelationSlot, Result, Rows, Table, Value,
};
use tablemap_query::SelectQuery;

use crate::join::{JoinId, JoinTree, NodeId};

/// Strip one layer of matching quotes some drivers leave on column names.
pub fn unquote(column: &str) -> &str {
    for quote in ['"', '`'] {
        if let Some(inner) = column
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    column
}

/// Split `alias__rest` on the first `__`.
pub fn split_column(column: &str) -> Option<(&str, &str)> {
    column.split_once("__")
}

/// Where one result column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dest {
    /// A column of the model at `node`.
    Field {
        /// Owning model.
        node: NodeId,
        /// Position in the model table's columns.
        column: usize,
    },
    /// Ignored.
    Discard,
    /// No field or join matches; scanning fails when the column is reached.
    Unknown {
        /// Type name of the model that rejected the column.
        table: &'static str,
        /// Column name as seen by that model.
        column: String,
    },
}

/// Destinations for every column of one result set.
#[derive(Debug)]
pub struct ScanPlan {
    base: NodeId,
    dests: Vec<Dest>,
    keys: Vec<Option<usize>>,
    key_count: usize,
}

impl ScanPlan {
    /// Route `columns` starting at the model `base`.
    pub fn new(tree: &JoinTree, base: NodeId, columns: &[String], discard_unknown: bool) -> Self {
        let dests = columns
            .iter()
            .map(|c| destination(tree, base, unquote(c), discard_unknown))
            .collect();
        Self {
            base,
            keys: vec![None; columns.len()],
            dests,
            key_count: 0,
        }
    }

    /// Route `columns` and also capture the values of `key_columns`.
    ///
    /// Key columns that are not fields are captured only. Fails when a key
    /// column is missing from the result set.
    pub fn with_keys(
        tree: &JoinTree,
        base: NodeId,
        columns: &[String],
        discard_unknown: bool,
        key_columns: &[String],
    ) -> Result<Self> {
        let mut plan = Self::new(tree, base, columns, discard_unknown);
        for (k, key) in key_columns.iter().enumerate() {
            let Some(pos) = columns.iter().position(|c| unquote(c) == key) else {
                return Err(Error::custom(format!(
                    "result set has no join key column {key:?}"
                )));
            };
            plan.keys[pos] = Some(k);
            if matches!(plan.dests[pos], Dest::Unknown { .. }) {
                plan.dests[pos] = Dest::Discard;
            }
        }
        plan.key_count = key_columns.len();
        Ok(plan)
    }

    /// The model rows are scanned into.
    pub fn base(&self) -> NodeId {
        self.base
    }

    /// One destination per column.
    pub fn dests(&self) -> &[Dest] {
        &self.dests
    }
}

fn destination(tree: &JoinTree, node: NodeId, column: &str, discard_unknown: bool) -> Dest {
    if let Some(dest) = lookup(tree, node, column, discard_unknown) {
        return dest;
    }
    let table = tree.node(node).table();
    if discard_unknown {
        tracing::trace!(model = table.type_name(), column, "Discarding unknown column");
        return Dest::Discard;
    }
    Dest::Unknown {
        table: table.type_name(),
        column: column.to_string(),
    }
}

fn lookup(tree: &JoinTree, node: NodeId, column: &str, discard_unknown: bool) -> Option<Dest> {
    let table = tree.node(node).table();
    if let Some(index) = table.column_index(column) {
        return Some(Dest::Field {
            node,
            column: index,
        });
    }

    let (prefix, rest) = split_column(column)?;
    if prefix.is_empty() {
        return None;
    }
    if let Some(id) = tree.get_join(node, prefix) {
        let join = tree.join(id);
        // Accumulated relations come from their own result sets.
        if join.relation().is_inline() {
            return Some(destination(tree, join.join_node(), rest, discard_unknown));
        }
    }
    if table.alias() == prefix {
        return Some(destination(tree, node, rest, discard_unknown));
    }
    None
}

/// Walk from the instance at `base` down to the storage of `node`.
///
/// With `alloc`, absent optional storage along the way is allocated; without
/// it, `None` is returned as soon as a level is absent.
pub fn locate<'r>(
    tree: &JoinTree,
    base: NodeId,
    instance: &'r mut dyn Any,
    node: NodeId,
    alloc: bool,
) -> Option<&'r mut dyn Any> {
    let skip = tree.node(base).depth();
    let mut current = instance;
    for relation in tree.node(node).chain().get(skip..)? {
        current = relation.mount(current, alloc)?;
    }
    Some(current)
}

/// Every stored instance of `node` below the instance at `base`.
///
/// Unlike [`locate`], the walk fans out through sequence relations, so the
/// owners of a join nested under a has-many are the elements of each
/// sequence. Absent inline storage contributes nothing; nothing is allocated.
pub fn locate_all<'r>(
    tree: &JoinTree,
    base: NodeId,
    instance: &'r mut dyn Any,
    node: NodeId,
) -> Vec<&'r mut dyn Any> {
    let skip = tree.node(base).depth();
    let Some(chain) = tree.node(node).chain().get(skip..) else {
        return Vec::new();
    };
    let mut current = vec![instance];
    for relation in chain {
        current = current
            .into_iter()
            .flat_map(|owner| relation.items(owner))
            .collect();
    }
    current
}

/// Receives one row from the cursor.
struct RowScanner<'p, 'i> {
    tree: &'p JoinTree,
    plan: &'p ScanPlan,
    instance: Option<&'i mut dyn Any>,
    inited: Vec<bool>,
    keys: Vec<Value>,
    cursor: usize,
}

impl<'p, 'i> RowScanner<'p, 'i> {
    fn new(tree: &'p JoinTree, plan: &'p ScanPlan, instance: Option<&'i mut dyn Any>) -> Self {
        Self {
            tree,
            plan,
            instance,
            inited: vec![false; tree.node_count()],
            keys: vec![Value::Null; plan.key_count],
            cursor: 0,
        }
    }

    fn mark_inited(&mut self, node: NodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.inited[id.index()] {
                break;
            }
            self.inited[id.index()] = true;
            if id == self.plan.base {
                break;
            }
            current = self.tree.node(id).base();
        }
    }

    fn write(&mut self, node: NodeId, column: usize, value: Value) -> Result<()> {
        let tree = self.tree;
        let base = self.plan.base;
        let alloc = !value.is_null();

        let Some(instance) = self.instance.as_deref_mut() else {
            return if alloc { Err(Error::ModelNil) } else { Ok(()) };
        };
        let Some(target) = locate(tree, base, instance, node, alloc) else {
            if alloc {
                return Err(Error::custom(format!(
                    "cannot mount {} inside {}",
                    tree.node(node).table().type_name(),
                    tree.node(base).table().type_name()
                )));
            }
            // NULL into storage that was never allocated.
            return Ok(());
        };
        tree.node(node).table().columns()[column].write(target, value)?;

        if alloc {
            self.mark_inited(node);
        }
        Ok(())
    }

    fn after_scan(&mut self, cx: &Cx) -> Result<()> {
        let tree = self.tree;
        let base = self.plan.base;
        let Some(instance) = self.instance.as_deref_mut() else {
            return Ok(());
        };
        let mut first = None;
        visit_after_scan(tree, base, base, instance, &self.inited, cx, &mut first);
        first.map_or(Ok(()), Err)
    }
}

impl ColumnSink for RowScanner<'_, '_> {
    fn scan_value(&mut self, value: Value) -> Result<()> {
        let plan = self.plan;
        let index = self.cursor;
        self.cursor += 1;

        let Some(dest) = plan.dests.get(index) else {
            return Err(Error::driver(format!(
                "row has more values than its {} columns",
                plan.dests.len()
            )));
        };
        if let Some(k) = plan.keys[index] {
            self.keys[k] = value.clone();
        }

        match dest {
            Dest::Field { node, column } => self.write(*node, *column, value),
            Dest::Discard => Ok(()),
            Dest::Unknown { table, column } => Err(Error::SchemaMismatch {
                table: *table,
                column: column.clone(),
            }),
        }
    }
}

/// AfterScan on `node`, then on every inline join below it; all run, the first
/// error is kept.
fn visit_after_scan(
    tree: &JoinTree,
    base: NodeId,
    node: NodeId,
    instance: &mut dyn Any,
    inited: &[bool],
    cx: &Cx,
    first: &mut Option<Error>,
) {
    if !inited[node.index()] {
        return;
    }
    let table = tree.node(node).table();
    if table.has_hook(Hook::AfterScan) {
        if let Some(target) = locate(tree, base, &mut *instance, node, false) {
            if let Err(err) = table.call_hook(Hook::AfterScan, target, cx) {
                tracing::debug!(model = table.type_name(), error = %err, "AfterScan hook failed");
                if first.is_none() {
                    *first = Some(err);
                }
            }
        }
    }
    for id in tree.node(node).joins() {
        let join = tree.join(*id);
        if join.relation().is_inline() {
            visit_after_scan(tree, base, join.join_node(), &mut *instance, inited, cx, first);
        }
    }
}

/// Scan the cursor's current row into `instance` (the model at `plan.base()`).
///
/// Runs BeforeScan first and AfterScan last. Returns the captured key values.
pub fn scan_row(
    cx: &Cx,
    tree: &JoinTree,
    plan: &ScanPlan,
    mut instance: Option<&mut dyn Any>,
    rows: &mut dyn Rows,
) -> Result<Vec<Value>> {
    let table = tree.node(plan.base).table();
    if let Some(target) = instance.as_deref_mut() {
        table.call_hook(Hook::BeforeScan, target, cx)?;
    }

    let mut scanner = RowScanner::new(tree, plan, instance);
    rows.scan(&mut scanner)?;
    if scanner.cursor < plan.dests.len() {
        return Err(Error::driver(format!(
            "row has {} values but the result set has {} columns",
            scanner.cursor,
            plan.dests.len()
        )));
    }
    scanner.after_scan(cx)?;
    Ok(scanner.keys)
}

/// Values of the relation's base columns in `owner`; `None` when any is NULL.
pub fn owner_key(
    table: &'static Table,
    relation: &Relation,
    owner: &dyn Any,
) -> Result<Option<Vec<Value>>> {
    let mut key = Vec::with_capacity(relation.join_keys.len());
    for name in relation.base_columns() {
        let column = table.column(name).ok_or_else(|| Error::SchemaMismatch {
            table: table.type_name(),
            column: name.to_string(),
        })?;
        let value = column.read(owner)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value);
    }
    Ok(Some(key))
}

fn key_matches(owner: &[Value], row: &[Value]) -> bool {
    owner.len() == row.len() && owner.iter().zip(row).all(|(a, b)| a.key_eq(b))
}

fn accumulated(tree: &JoinTree, join: JoinId) -> Result<(&'static Relation, &'static Table)> {
    let join = tree.join(join);
    let relation = join.relation();
    if relation.is_inline() {
        return Err(Error::custom(format!(
            "{} is a {} relation; its columns are scanned with the owner",
            join.path(),
            relation.kind
        )));
    }
    Ok((relation, tree.node(join.base_node()).table()))
}

/// Distinct non-NULL key tuples of `owners` for an accumulated relation.
pub fn relation_keys(tree: &JoinTree, join: JoinId, owners: &[&mut dyn Any]) -> Result<Vec<Vec<Value>>> {
    let (relation, base_table) = accumulated(tree, join)?;
    let mut keys: Vec<Vec<Value>> = Vec::new();
    for owner in owners {
        if let Some(key) = owner_key(base_table, relation, &**owner)? {
            if !keys.iter().any(|k| key_matches(k, &key)) {
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

/// The query selecting an accumulated relation's rows for `keys`.
pub fn relation_query(tree: &JoinTree, join: JoinId, keys: Vec<Vec<Value>>) -> Result<SelectQuery> {
    let (relation, _) = accumulated(tree, join)?;
    let target = relation.target();
    let columns = match (relation.kind, relation.link_table) {
        (RelationKind::ManyToMany, Some(link)) => {
            vec![format!("{}.{}", link.table_name, link.local_column)]
        }
        _ => relation
            .join_keys
            .iter()
            .map(|(_, column)| format!("{}.{}", target.name(), column))
            .collect(),
    };
    Ok(tree
        .join(join)
        .apply_query(SelectQuery::new(target.name()).where_in(columns, keys)))
}

/// Scan every row of `rows` into a fresh related instance and push it into the
/// first owner whose key matches. Returns the number of attached rows.
pub fn attach_rows(
    cx: &Cx,
    tree: &JoinTree,
    join: JoinId,
    owners: &mut [&mut dyn Any],
    rows: &mut dyn Rows,
    discard_unknown: bool,
) -> Result<usize> {
    let (relation, base_table) = accumulated(tree, join)?;
    let RelationSlot::Many(push, _) = relation.slot() else {
        return Err(Error::custom(format!(
            "{} relation {} is not declared as a sequence",
            relation.kind, relation.name
        )));
    };

    let owner_keys = owners
        .iter()
        .map(|owner| owner_key(base_table, relation, &**owner))
        .collect::<Result<Vec<_>>>()?;

    let columns = rows.columns()?;
    let node = tree.join(join).join_node();
    let plan = ScanPlan::with_keys(
        tree,
        node,
        &columns,
        discard_unknown,
        &relation.key_columns(),
    )?;
    let target = tree.node(node).table();

    let mut attached = 0;
    while rows.next()? {
        let mut instance = target.new_instance();
        let keys = scan_row(cx, tree, &plan, Some(instance.as_mut()), rows)?;

        let owner = owner_keys
            .iter()
            .position(|k| k.as_deref().is_some_and(|k| key_matches(k, &keys)));
        let Some(owner) = owner else {
            tracing::trace!(
                relation = relation.name,
                keys = ?keys,
                "Dropping related row without a matching owner"
            );
            continue;
        };
        push(&mut *owners[owner], instance).map_err(|_| {
            Error::custom(format!(
                "{} rows cannot be stored in {}.{}",
                target.type_name(),
                base_table.type_name(),
                relation.name
            ))
        })?;
        attached += 1;
    }
    Ok(attached)
}
