//! Query events and the hooks that observe them.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tablemap_core::{Cx, Error};

/// The logged text is the formatted query only up to this many bytes.
const SOFT_QUERY_LIMIT: usize = 8000;
/// Logged query text is cut here.
const HARD_QUERY_LIMIT: usize = 16000;

/// First keyword of `query`, upper-cased (`"SELECT"`, `"INSERT"`, ...).
pub fn query_operation(query: &str) -> String {
    query
        .split_whitespace()
        .next()
        .map(|word| {
            word.trim_start_matches('(')
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .unwrap_or_default()
}

/// Failure recorded on a finished event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Rendered error.
    pub message: String,
    /// The query found no rows where one was required.
    pub no_rows: bool,
}

impl From<&Error> for QueryError {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            no_rows: err.is_no_rows(),
        }
    }
}

/// One executed query, as seen by [`QueryHook`]s.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Upper-cased first keyword of the query.
    pub operation: String,
    /// Query text with arguments formatted in.
    pub query: String,
    /// Query text with placeholders, when the caller has it.
    pub unformatted: Option<String>,
    /// Primary table the query targets.
    pub table: Option<&'static str>,
    /// Type name of the model the rows are scanned into.
    pub model: Option<&'static str>,
    /// When the query started.
    pub start: Instant,
    /// Rows scanned, once finished.
    pub rows: Option<usize>,
    /// Failure, once finished.
    pub error: Option<QueryError>,
}

impl QueryEvent {
    /// Start an event for `query`.
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            operation: query_operation(&query),
            query,
            unformatted: None,
            table: None,
            model: None,
            start: Instant::now(),
            rows: None,
            error: None,
        }
    }

    /// Attach the placeholder form of the query.
    #[must_use]
    pub fn unformatted(mut self, query: impl Into<String>) -> Self {
        self.unformatted = Some(query.into());
        self
    }

    /// Attach the target table.
    #[must_use]
    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    /// Attach the model type name.
    #[must_use]
    pub fn model(mut self, model: &'static str) -> Self {
        self.model = Some(model);
        self
    }

    /// Time since the query started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the outcome of the query.
    pub fn finish(&mut self, result: Result<usize, &Error>) {
        match result {
            Ok(rows) => self.rows = Some(rows),
            Err(err) => self.error = Some(QueryError::from(err)),
        }
    }

    /// True when the query failed with something other than "no rows".
    pub fn failed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.no_rows)
    }
}

/// Observer of executed queries.
///
/// `before_query` runs in registration order, `after_query` in reverse.
#[allow(unused_variables)]
pub trait QueryHook: Send + Sync {
    /// Called before the query runs.
    fn before_query(&self, cx: &Cx, event: &mut QueryEvent) {}

    /// Called after the query ran and its rows were scanned.
    fn after_query(&self, cx: &Cx, event: &QueryEvent) {}
}

/// Reports every finished query through `tracing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingQueryHook {
    /// Log the query with its arguments formatted in.
    pub format_queries: bool,
}

impl TracingQueryHook {
    /// Create a hook logging unformatted queries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log queries with arguments formatted in.
    pub fn format_queries(mut self, on: bool) -> Self {
        self.format_queries = on;
        self
    }

    /// The query text that gets logged for `event`.
    pub fn event_query<'e>(&self, event: &'e QueryEvent) -> &'e str {
        let query = if self.format_queries && event.query.len() <= SOFT_QUERY_LIMIT {
            event.query.as_str()
        } else {
            event.unformatted.as_deref().unwrap_or(&event.query)
        };
        truncate(query, HARD_QUERY_LIMIT)
    }
}

impl QueryHook for TracingQueryHook {
    fn after_query(&self, _cx: &Cx, event: &QueryEvent) {
        let elapsed_us = u64::try_from(event.elapsed().as_micros()).unwrap_or(u64::MAX);
        let query = self.event_query(event);
        match &event.error {
            Some(err) if !err.no_rows => tracing::warn!(
                operation = %event.operation,
                table = event.table.unwrap_or(""),
                elapsed_us,
                error = %err.message,
                query,
                "Query failed"
            ),
            _ => tracing::debug!(
                operation = %event.operation,
                table = event.table.unwrap_or(""),
                rows = event.rows.unwrap_or(0),
                elapsed_us,
                query,
                "Query finished"
            ),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
