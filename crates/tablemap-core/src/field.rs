//! Column definitions and the accessors that read and write one field.
//!
//! An accessor is a pair of plain function pointers computed once per type. It
//! takes a type-erased instance (`&dyn Any`), downcasts it to the owning entity
//! and touches exactly one field, so scanning never re-derives a field path per
//! row.

use std::any::Any;

use crate::error::{ConversionError, Error, Result};
use crate::value::Value;

/// Reads a field out of a type-erased instance.
pub type GetFn = fn(&dyn Any) -> Result<Value>;

/// Writes a raw value into a field of a type-erased instance.
pub type SetFn = fn(&mut dyn Any, Value) -> Result<()>;

/// The read/write pair for one field.
#[derive(Clone, Copy)]
pub struct FieldAccessor {
    get: GetFn,
    set: SetFn,
}

impl FieldAccessor {
    /// Wrap a getter and a setter.
    pub const fn new(get: GetFn, set: SetFn) -> Self {
        Self { get, set }
    }
}

impl std::fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldAccessor")
    }
}

/// Metadata about one mapped column plus its accessor.
#[derive(Debug, Clone)]
pub struct Column {
    /// Database column name.
    pub name: &'static str,
    /// Rust field name.
    pub field_name: &'static str,
    /// Whether this is a primary key column.
    pub primary_key: bool,
    /// Whether the database assigns the value.
    pub auto_increment: bool,
    /// Whether NULL is a legal value.
    pub nullable: bool,
    accessor: FieldAccessor,
}

impl Column {
    /// Create a column; flags default to false.
    pub const fn new(name: &'static str, field_name: &'static str, accessor: FieldAccessor) -> Self {
        Self {
            name,
            field_name,
            primary_key: false,
            auto_increment: false,
            nullable: false,
            accessor,
        }
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Read the field from `instance`, applying any append conversion.
    pub fn read(&self, instance: &dyn Any) -> Result<Value> {
        (self.accessor.get)(instance)
    }

    /// Write `raw` into the field of `instance`, applying any scan conversion.
    pub fn write(&self, instance: &mut dyn Any, raw: Value) -> Result<()> {
        (self.accessor.set)(instance, raw)
    }
}

fn wrong_instance<E>() -> Error {
    Error::custom(format!(
        "accessor called with an instance that is not {}",
        std::any::type_name::<E>()
    ))
}

/// Getter body for a field using its `IntoValue` impl.
pub fn get_field<E: Any, T: IntoValue>(instance: &dyn Any, project: fn(&E) -> &T) -> Result<Value> {
    let entity = instance.downcast_ref::<E>().ok_or_else(wrong_instance::<E>)?;
    Ok(project(entity).to_value())
}

/// Getter body for a field with a custom append conversion.
pub fn get_field_with<E: Any, T>(
    instance: &dyn Any,
    project: fn(&E) -> &T,
    append: fn(&T) -> Value,
) -> Result<Value> {
    let entity = instance.downcast_ref::<E>().ok_or_else(wrong_instance::<E>)?;
    Ok(append(project(entity)))
}

/// Setter body for a field using its `FromValue` impl.
pub fn set_field<E: Any, T: FromValue>(
    instance: &mut dyn Any,
    raw: Value,
    column: &'static str,
    project: fn(&mut E) -> &mut T,
) -> Result<()> {
    let entity = instance.downcast_mut::<E>().ok_or_else(wrong_instance::<E>)?;
    *project(entity) = T::from_value(raw).map_err(|e| e.with_column(column))?;
    Ok(())
}

/// Setter body for a field with a custom scan conversion.
pub fn set_field_with<E: Any, T>(
    instance: &mut dyn Any,
    raw: Value,
    column: &'static str,
    project: fn(&mut E) -> &mut T,
    scan: fn(Value) -> Result<T, ConversionError>,
) -> Result<()> {
    let entity = instance.downcast_mut::<E>().ok_or_else(wrong_instance::<E>)?;
    *project(entity) = scan(raw).map_err(|e| e.with_column(column))?;
    Ok(())
}

/// Conversion from a driver value into a field type.
pub trait FromValue: Sized {
    /// Convert, or explain why not.
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

/// Conversion from a field into a value.
pub trait IntoValue {
    /// Produce the value the field currently holds.
    fn to_value(&self) -> Value;
}

fn mismatch<T>(value: &Value) -> ConversionError {
    ConversionError::new(
        std::any::type_name::<T>(),
        value.type_name(),
        "unsupported conversion",
    )
}

macro_rules! impl_int {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    if let Some(wide) = value.as_i64() {
                        return <$ty>::try_from(wide).map_err(|e| {
                            ConversionError::new(stringify!($ty), value.type_name(), e.to_string())
                        });
                    }
                    match &value {
                        Value::Bool(b) => Ok(<$ty>::from(*b)),
                        Value::Text(s) | Value::Decimal(s) => s.trim().parse::<$ty>().map_err(|e| {
                            ConversionError::new(stringify!($ty), value.type_name(), e.to_string())
                        }),
                        _ => Err(mismatch::<$ty>(&value)),
                    }
                }
            }

            impl IntoValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant((*self).into())
                }
            }
        )*
    };
}

impl_int! {
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => SmallInt,
    u16 => Int,
    u32 => BigInt,
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(0);
        }
        match &value {
            Value::Text(s) | Value::Decimal(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| ConversionError::new("u64", value.type_name(), e.to_string())),
            other => other
                .as_i64()
                .ok_or_else(|| mismatch::<u64>(other))
                .and_then(|v| {
                    u64::try_from(v)
                        .map_err(|e| ConversionError::new("u64", other.type_name(), e.to_string()))
                }),
        }
    }
}

impl IntoValue for u64 {
    fn to_value(&self) -> Value {
        match i64::try_from(*self) {
            Ok(v) => Value::BigInt(v),
            Err(_) => Value::Decimal(self.to_string()),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(0.0);
        }
        if let Some(v) = value.as_f64() {
            return Ok(v);
        }
        match &value {
            Value::Text(s) | Value::Decimal(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| ConversionError::new("f64", value.type_name(), e.to_string())),
            _ => Err(mismatch::<f64>(&value)),
        }
    }
}

impl IntoValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl IntoValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            other => match other.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                Some(n) => Err(ConversionError::new(
                    "bool",
                    other.type_name(),
                    format!("{n} is not 0 or 1"),
                )),
                None => Err(mismatch::<bool>(other)),
            },
        }
    }
}

impl IntoValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(s) | Value::Decimal(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|e| ConversionError::new("String", "BYTES", e.to_string())),
            other => Err(mismatch::<String>(&other)),
        }
    }
}

impl IntoValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch::<Vec<u8>>(&other)),
        }
    }
}

impl IntoValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Json(j) => Ok(j),
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| ConversionError::new("serde_json::Value", "TEXT", e.to_string())),
            Value::Bytes(b) => serde_json::from_slice(&b)
                .map_err(|e| ConversionError::new("serde_json::Value", "BYTES", e.to_string())),
            other => Err(mismatch::<serde_json::Value>(&other)),
        }
    }
}

impl IntoValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, IntoValue::to_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Account {
        id: i64,
        email: Option<String>,
        flags: u8,
    }

    fn id_column() -> Column {
        Column::new(
            "id",
            "id",
            FieldAccessor::new(
                |inst| get_field::<Account, i64>(inst, |e| &e.id),
                |inst, v| set_field::<Account, i64>(inst, v, "id", |e| &mut e.id),
            ),
        )
        .primary_key(true)
    }

    fn upper(value: Value) -> Result<Option<String>, ConversionError> {
        Option::<String>::from_value(value).map(|s| s.map(|s| s.to_uppercase()))
    }

    fn email_column() -> Column {
        Column::new(
            "email",
            "email",
            FieldAccessor::new(
                |inst| get_field::<Account, Option<String>>(inst, |e| &e.email),
                |inst, v| {
                    set_field_with::<Account, Option<String>>(inst, v, "email", |e| &mut e.email, upper)
                },
            ),
        )
        .nullable(true)
    }

    #[test]
    fn test_column_write_and_read() {
        let mut account = Account::default();
        let col = id_column();
        col.write(&mut account, Value::Int(42)).unwrap();
        assert_eq!(account.id, 42);
        assert_eq!(col.read(&account).unwrap(), Value::BigInt(42));
        assert!(col.primary_key);
    }

    #[test]
    fn test_column_write_custom_conversion() {
        let mut account = Account::default();
        email_column()
            .write(&mut account, Value::Text("a@b.c".into()))
            .unwrap();
        assert_eq!(account.email.as_deref(), Some("A@B.C"));
        email_column().write(&mut account, Value::Null).unwrap();
        assert_eq!(account.email, None);
    }

    #[test]
    fn test_column_write_conversion_error_names_column() {
        let mut account = Account::default();
        let err = id_column()
            .write(&mut account, Value::Text("abc".into()))
            .unwrap_err();
        match err {
            Error::Conversion(e) => {
                assert_eq!(e.column, "id");
                assert_eq!(e.found, "TEXT");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_column_rejects_foreign_instance() {
        let mut other = String::new();
        assert!(id_column().write(&mut other, Value::BigInt(1)).is_err());
    }

    #[test]
    fn test_integer_range_checked() {
        assert!(u8::from_value(Value::BigInt(300)).is_err());
        assert_eq!(u8::from_value(Value::BigInt(200)).unwrap(), 200);
        assert!(i32::from_value(Value::Double(1.0)).is_err());
        let mut account = Account::default();
        account.flags = u8::from_value(Value::Text(" 7 ".into())).unwrap();
        assert_eq!(account.flags, 7);
    }

    #[test]
    fn test_null_into_scalar_is_default() {
        assert_eq!(i64::from_value(Value::Null).unwrap(), 0);
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert!(!bool::from_value(Value::Null).unwrap());
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_bool_from_integers() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::TinyInt(0)).unwrap());
        assert!(bool::from_value(Value::Int(2)).is_err());
    }

    #[test]
    fn test_json_from_text() {
        let v = serde_json::Value::from_value(Value::Text("{\"a\":1}".into())).unwrap();
        assert_eq!(v["a"], 1);
    }
}
