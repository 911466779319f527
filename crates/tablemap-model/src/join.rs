//! Relation join resolution.
//!
//! A [`JoinTree`] is owned by the root model. It stores one [`ModelNode`] per
//! bound model (the root plus one per resolved relation) and one [`Join`] per
//! edge. Nodes and joins are addressed by index handles, so the tree is never
//! cyclic and resolving the same path twice yields the same [`JoinId`].

use std::fmt;

use tablemap_core::{Relation, Table};
use tablemap_query::{QueryFn, SelectQuery};

/// Handle to a model node inside a [`JoinTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the tree's node arena.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Handle to a join inside a [`JoinTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinId(usize);

impl JoinId {
    /// Position in the tree's join arena.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A model bound to one storage location below the root instance.
#[derive(Debug)]
pub struct ModelNode {
    table: &'static Table,
    base: Option<NodeId>,
    joins: Vec<JoinId>,
    chain: Vec<&'static Relation>,
}

impl ModelNode {
    /// Table of the bound type.
    pub fn table(&self) -> &'static Table {
        self.table
    }

    /// Relation this node was reached through; `None` for the root.
    pub fn relation(&self) -> Option<&'static Relation> {
        self.chain.last().copied()
    }

    /// Parent node; `None` for the root.
    pub fn base(&self) -> Option<NodeId> {
        self.base
    }

    /// Joins resolved from this node, in resolution order.
    pub fn joins(&self) -> &[JoinId] {
        &self.joins
    }

    /// Relation-index chain from the root table to this node's storage.
    pub fn index(&self) -> Vec<usize> {
        self.chain.iter().map(|r| r.index).collect()
    }

    /// Number of relations between the root and this node.
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Relations from the root down to this node.
    pub fn chain(&self) -> &[&'static Relation] {
        &self.chain
    }
}

/// One resolved relation edge.
pub struct Join {
    relation: &'static Relation,
    path: String,
    base: NodeId,
    node: NodeId,
    parent: Option<JoinId>,
    apply: Option<QueryFn>,
}

impl Join {
    /// The relation this join follows.
    pub fn relation(&self) -> &'static Relation {
        self.relation
    }

    /// Dotted path from the root, using relation field names.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The model that owns the relation.
    pub fn base_node(&self) -> NodeId {
        self.base
    }

    /// The model the relation points to.
    pub fn join_node(&self) -> NodeId {
        self.node
    }

    /// The join one level up, for multi-segment paths.
    pub fn parent(&self) -> Option<JoinId> {
        self.parent
    }

    /// Whether a query modifier is attached.
    pub fn has_modifier(&self) -> bool {
        self.apply.is_some()
    }

    /// Run the attached query modifier, if any.
    pub fn apply_query(&self, query: SelectQuery) -> SelectQuery {
        match &self.apply {
            Some(apply) => apply(query),
            None => query,
        }
    }
}

impl fmt::Debug for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join")
            .field("path", &self.path)
            .field("kind", &self.relation.kind)
            .field("base", &self.base)
            .field("node", &self.node)
            .field("parent", &self.parent)
            .field("has_modifier", &self.apply.is_some())
            .finish()
    }
}

/// Arena of model nodes and joins rooted at one table.
#[derive(Debug)]
pub struct JoinTree {
    nodes: Vec<ModelNode>,
    joins: Vec<Join>,
}

impl JoinTree {
    /// The root node.
    pub const ROOT: NodeId = NodeId(0);

    /// A tree holding only the root model.
    pub fn new(root: &'static Table) -> Self {
        Self {
            nodes: vec![ModelNode {
                table: root,
                base: None,
                joins: Vec::new(),
                chain: Vec::new(),
            }],
            joins: Vec::new(),
        }
    }

    /// Table of the root model.
    pub fn root_table(&self) -> &'static Table {
        self.nodes[0].table
    }

    /// Look a node up.
    pub fn node(&self, id: NodeId) -> &ModelNode {
        &self.nodes[id.0]
    }

    /// Look a join up.
    pub fn join(&self, id: JoinId) -> &Join {
        &self.joins[id.0]
    }

    /// Number of model nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All joins in resolution order.
    pub fn joins(&self) -> impl Iterator<Item = (JoinId, &Join)> {
        self.joins.iter().enumerate().map(|(i, j)| (JoinId(i), j))
    }

    /// Join of `node` whose relation is called `name` (field name or alias).
    pub fn get_join(&self, node: NodeId, name: &str) -> Option<JoinId> {
        self.node(node)
            .joins
            .iter()
            .copied()
            .find(|id| self.join(*id).relation.matches(name))
    }

    /// Find an already-resolved path without creating anything.
    pub fn find(&self, path: &str) -> Option<JoinId> {
        if path.is_empty() {
            return None;
        }
        let mut node = Self::ROOT;
        let mut last = None;
        for segment in path.split('.') {
            let id = self.get_join(node, segment)?;
            node = self.join(id).node;
            last = Some(id);
        }
        last
    }

    /// Resolve a dotted relation path, creating the missing nodes.
    ///
    /// Segments are matched against relation field names, then aliases. An
    /// empty path or an unknown segment returns `None` and leaves the tree
    /// untouched. `apply` replaces any modifier already attached to the final
    /// join.
    pub fn resolve(&mut self, path: &str, apply: Option<QueryFn>) -> Option<JoinId> {
        if path.is_empty() {
            return None;
        }

        let mut table = self.root_table();
        let mut relations = Vec::new();
        for segment in path.split('.') {
            let relation = table.relation(segment)?;
            table = relation.target();
            relations.push(relation);
        }

        let mut current = Self::ROOT;
        let mut last: Option<JoinId> = None;
        let mut walked = String::new();
        for relation in relations {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(relation.name);

            let existing = self.nodes[current.0]
                .joins
                .iter()
                .copied()
                .find(|id| std::ptr::eq(self.joins[id.0].relation, relation));
            if let Some(id) = existing {
                current = self.joins[id.0].node;
                last = Some(id);
                continue;
            }

            let node = NodeId(self.nodes.len());
            let id = JoinId(self.joins.len());
            let mut chain = self.nodes[current.0].chain.clone();
            chain.push(relation);
            self.nodes.push(ModelNode {
                table: relation.target(),
                base: Some(current),
                joins: Vec::new(),
                chain,
            });
            self.joins.push(Join {
                relation,
                path: walked.clone(),
                base: current,
                node,
                parent: last,
                apply: None,
            });
            self.nodes[current.0].joins.push(id);

            tracing::debug!(
                path = %walked,
                kind = %relation.kind,
                target = relation.target().name(),
                "Resolved join"
            );

            current = node;
            last = Some(id);
        }

        if let (Some(id), Some(apply)) = (last, apply) {
            self.joins[id.0].apply = Some(apply);
        }
        last
    }
}
