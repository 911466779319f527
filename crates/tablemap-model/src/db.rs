//! The context models are created from.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tablemap_core::{Cx, Entity, Result, Rows, Table, registry};
use tablemap_query::{Formatter, NopFormatter, QueryEvent, QueryHook};

use crate::join::JoinId;
use crate::model::TableModel;
use crate::slice_model::SliceModel;
use crate::struct_model::StructModel;

// ============================================================================
// Configuration
// ============================================================================

/// Behaviour switches for scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Ignore result columns that match no field or join instead of failing.
    pub discard_unknown_columns: bool,
}

impl DbConfig {
    /// Default configuration: unknown columns are errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether unknown columns are ignored.
    pub fn discard_unknown_columns(mut self, discard: bool) -> Self {
        self.discard_unknown_columns = discard;
        self
    }
}

// ============================================================================
// Db
// ============================================================================

#[derive(Clone)]
struct DbInner {
    config: DbConfig,
    formatter: Arc<dyn Formatter>,
    query_hooks: Vec<Arc<dyn QueryHook>>,
}

/// Shared, cheaply clonable mapping context.
///
/// Holds the configuration, the dialect formatter and the registered query
/// hooks. Every model keeps a clone.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DbConfig::default())
    }

    /// Context with `config`.
    pub fn with_config(config: DbConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                config,
                formatter: Arc::new(NopFormatter),
                query_hooks: Vec::new(),
            }),
        }
    }

    /// Replace the formatter.
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        Arc::make_mut(&mut self.inner).formatter = Arc::new(formatter);
        self
    }

    /// Register a query hook. Hooks observe queries in registration order.
    pub fn with_query_hook(mut self, hook: impl QueryHook + 'static) -> Self {
        Arc::make_mut(&mut self.inner).query_hooks.push(Arc::new(hook));
        self
    }

    /// The configuration.
    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// The formatter.
    pub fn formatter(&self) -> &dyn Formatter {
        self.inner.formatter.as_ref()
    }

    /// Table metadata for `E`.
    pub fn table<E: Entity>(&self) -> &'static Table {
        registry().table::<E>()
    }

    /// Bind one entity.
    pub fn model<'v, E: Entity>(&self, value: &'v mut E) -> StructModel<'v> {
        StructModel::new(self, value)
    }

    /// A model for `E` bound to no instance.
    pub fn nil_model<E: Entity>(&self) -> StructModel<'static> {
        StructModel::nil(self, self.table::<E>())
    }

    /// Bind a sequence of entities.
    pub fn slice_model<'v, E: Entity>(&self, slice: &'v mut Vec<E>) -> SliceModel<'v, E> {
        SliceModel::new(self, slice)
    }

    /// Scan `rows` into `model`, run AfterSelect, and report the query to the
    /// registered hooks.
    #[tracing::instrument(level = "debug", skip(self, cx, model, rows), fields(table = model.table().name()))]
    pub fn scan_rows(
        &self,
        cx: &Cx,
        model: &mut dyn TableModel,
        rows: &mut dyn Rows,
        query: &str,
    ) -> Result<usize> {
        let mut event = self.start_event(cx, model.table(), query);
        let result = model.scan_rows(cx, rows).and_then(|n| {
            model.after_select(cx)?;
            Ok(n)
        });
        self.finish_event(cx, &mut event, result.as_ref().map(|n| *n));
        result
    }

    /// Attach the rows of an accumulated relation, reporting the query.
    #[tracing::instrument(level = "debug", skip(self, cx, model, rows), fields(table = model.table().name()))]
    pub fn scan_relation(
        &self,
        cx: &Cx,
        model: &mut dyn TableModel,
        join: JoinId,
        rows: &mut dyn Rows,
        query: &str,
    ) -> Result<usize> {
        let target = model.tree().join(join).relation().target();
        let mut event = self.start_event(cx, target, query);
        let result = model.scan_relation(cx, join, rows);
        self.finish_event(cx, &mut event, result.as_ref().map(|n| *n));
        result
    }

    fn start_event(&self, cx: &Cx, table: &'static Table, query: &str) -> QueryEvent {
        let mut event = QueryEvent::new(query)
            .table(table.name())
            .model(table.type_name());
        for hook in &self.inner.query_hooks {
            hook.before_query(cx, &mut event);
        }
        event
    }

    fn finish_event(&self, cx: &Cx, event: &mut QueryEvent, result: Result<usize, &tablemap_core::Error>) {
        event.finish(result);
        match result {
            Ok(rows) => tracing::debug!(operation = %event.operation, rows, "Scanned rows"),
            Err(err) => tracing::debug!(operation = %event.operation, error = %err, "Scan failed"),
        }
        for hook in self.inner.query_hooks.iter().rev() {
            hook.after_query(cx, event);
        }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.inner.config)
            .field("query_hooks", &self.inner.query_hooks.len())
            .finish()
    }
}
