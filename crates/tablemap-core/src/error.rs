//! Error types shared by every tablemap crate.

use crate::hooks::Hook;

/// Result alias used throughout tablemap.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All failures the mapping layer can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Exactly one row was required but the cursor was empty.
    #[error("tablemap: no rows in result set")]
    NoRows,

    /// A column value could not be coerced into its field.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A result column matched neither a field nor a join.
    #[error("tablemap: {table} does not have column {column:?}")]
    SchemaMismatch {
        /// Type name of the model that rejected the column.
        table: &'static str,
        /// The unquoted column name.
        column: String,
    },

    /// A lifecycle hook returned an error.
    #[error("tablemap: {hook} hook on {model} failed: {source}")]
    Hook {
        /// Which hook failed.
        hook: Hook,
        /// Type name of the entity whose hook failed.
        model: &'static str,
        /// The error returned by the hook.
        #[source]
        source: Box<Error>,
    },

    /// A dotted relation path names a relation the type does not declare.
    #[error("tablemap: {table} does not have relation {path:?}")]
    RelationNotFound {
        /// Type name of the root model.
        table: &'static str,
        /// The path as given by the caller.
        path: String,
    },

    /// The model is not bound to an instance.
    #[error("tablemap: Model(nil)")]
    ModelNil,

    /// Failure reported by the row cursor.
    #[error("tablemap: driver: {0}")]
    Driver(String),

    /// Any other failure.
    #[error("tablemap: {0}")]
    Custom(String),
}

impl Error {
    /// Build an `Error::Custom` from anything printable.
    pub fn custom(msg: impl Into<String>) -> Self {
        Error::Custom(msg.into())
    }

    /// Build an `Error::Driver` from anything printable.
    pub fn driver(msg: impl Into<String>) -> Self {
        Error::Driver(msg.into())
    }

    /// True when this is `Error::NoRows`.
    #[must_use]
    pub const fn is_no_rows(&self) -> bool {
        matches!(self, Error::NoRows)
    }

    /// The hook that failed, when this is a hook error.
    #[must_use]
    pub fn hook(&self) -> Option<(Hook, &'static str)> {
        match self {
            Error::Hook { hook, model, .. } => Some((*hook, *model)),
            _ => None,
        }
    }
}

/// A raw value could not be coerced into a field's type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tablemap: can't scan {found} into column {column:?} ({expected}): {detail}")]
pub struct ConversionError {
    /// Column being written, filled in by the accessor.
    pub column: &'static str,
    /// Rust type the field expects.
    pub expected: &'static str,
    /// SQL type name of the offending value.
    pub found: &'static str,
    /// Free-form reason.
    pub detail: String,
}

impl ConversionError {
    /// Create a conversion error for an unnamed column.
    pub fn new(expected: &'static str, found: &'static str, detail: impl Into<String>) -> Self {
        Self {
            column: "",
            expected,
            found,
            detail: detail.into(),
        }
    }

    /// Attach the column name.
    #[must_use]
    pub fn with_column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }
}
