//! A minimal SELECT clause collector.
//!
//! Relation query modifiers receive a [`SelectQuery`] for the related table and
//! return it with extra clauses attached. Rendering it into SQL text is the
//! dialect's business.

use std::fmt;
use std::sync::Arc;

use tablemap_core::Value;

/// Modifier applied to a relation's query when it is built.
pub type QueryFn = Arc<dyn Fn(SelectQuery) -> SelectQuery + Send + Sync>;

/// Wrap a closure as a [`QueryFn`].
pub fn query_fn<F>(f: F) -> QueryFn
where
    F: Fn(SelectQuery) -> SelectQuery + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// Raw expression with `?` placeholders.
    Expr {
        /// Expression text.
        expr: String,
        /// Placeholder arguments.
        args: Vec<Value>,
    },
    /// `(columns) IN (tuples)`.
    In {
        /// Column tuple.
        columns: Vec<String>,
        /// Value tuples, each as long as `columns`.
        tuples: Vec<Vec<Value>>,
    },
}

/// ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column or expression.
    pub expr: String,
    /// Descending order.
    pub desc: bool,
}

/// Collected clauses of a SELECT against one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Vec<String>,
    wheres: Vec<Where>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectQuery {
    /// Start a query against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Restrict the selected columns.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a raw WHERE expression.
    pub fn where_expr(mut self, expr: impl Into<String>, args: Vec<Value>) -> Self {
        self.wheres.push(Where::Expr {
            expr: expr.into(),
            args,
        });
        self
    }

    /// Add a `(columns) IN (tuples)` condition.
    pub fn where_in(mut self, columns: Vec<String>, tuples: Vec<Vec<Value>>) -> Self {
        self.wheres.push(Where::In { columns, tuples });
        self
    }

    /// Append an ascending ORDER BY entry.
    pub fn order(mut self, expr: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            expr: expr.into(),
            desc: false,
        });
        self
    }

    /// Append a descending ORDER BY entry.
    pub fn order_desc(mut self, expr: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            expr: expr.into(),
            desc: true,
        });
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Selected columns; empty means all.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// WHERE conditions, joined with AND.
    pub fn wheres(&self) -> &[Where] {
        &self.wheres
    }

    /// ORDER BY entries.
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order
    }

    /// LIMIT, if set.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// OFFSET, if set.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }
}

impl fmt::Display for SelectQuery {
    // Short summary for logs, not SQL.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select from {}", self.table)?;
        if !self.wheres.is_empty() {
            write!(f, " ({} conditions)", self.wheres.len())?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        Ok(())
    }
}
