//! The row cursor contract the mapping layer scans from.
//!
//! A driver implements [`Rows`]. For every row the caller hands it a
//! [`ColumnSink`] and the cursor pushes the row's values into the sink one by
//! one, in column order.

use crate::error::{Error, Result};
use crate::value::Value;

/// Receives a row's values, one call per column, in column order.
pub trait ColumnSink {
    /// Accept the value of the next column.
    fn scan_value(&mut self, value: Value) -> Result<()>;
}

/// A driver result cursor.
pub trait Rows {
    /// Column names of the result set, in order.
    fn columns(&self) -> Result<Vec<String>>;

    /// Advance to the next row. Returns `false` once the cursor is exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Push the current row's values into `dest`.
    fn scan(&mut self, dest: &mut dyn ColumnSink) -> Result<()>;
}

/// An in-memory result set.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl RowSet {
    /// Create an empty result set with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            position: None,
        }
    }

    /// Append a row.
    #[must_use]
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rewind the cursor to before the first row.
    pub fn rewind(&mut self) {
        self.position = None;
    }
}

impl Rows for RowSet {
    fn columns(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn scan(&mut self, dest: &mut dyn ColumnSink) -> Result<()> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| Error::driver("scan called without a current row"))?;
        if row.len() != self.columns.len() {
            return Err(Error::driver(format!(
                "row has {} values but the result set has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for value in row {
            dest.scan_value(value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<Value>);

    impl ColumnSink for Collect {
        fn scan_value(&mut self, value: Value) -> Result<()> {
            self.0.push(value);
            Ok(())
        }
    }

    #[test]
    fn test_row_set_iterates_in_order() {
        let mut rows = RowSet::new(["id", "name"])
            .row([Value::BigInt(1), Value::from("a")])
            .row([Value::BigInt(2), Value::Null]);
        assert_eq!(rows.columns().unwrap(), vec!["id", "name"]);

        let mut sink = Collect::default();
        assert!(rows.next().unwrap());
        rows.scan(&mut sink).unwrap();
        assert!(rows.next().unwrap());
        rows.scan(&mut sink).unwrap();
        assert!(!rows.next().unwrap());
        assert!(!rows.next().unwrap());
        assert_eq!(sink.0.len(), 4);
        assert_eq!(sink.0[2], Value::BigInt(2));
        assert!(sink.0[3].is_null());
    }

    #[test]
    fn test_scan_without_row_fails() {
        let mut rows = RowSet::new(["id"]);
        let mut sink = Collect::default();
        assert!(rows.scan(&mut sink).is_err());
        assert!(!rows.next().unwrap());
        assert!(rows.scan(&mut sink).is_err());
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let mut rows = RowSet::new(["id", "name"]).row([Value::BigInt(1)]);
        assert!(rows.next().unwrap());
        let mut sink = Collect::default();
        assert!(matches!(rows.scan(&mut sink), Err(Error::Driver(_))));
    }
}
