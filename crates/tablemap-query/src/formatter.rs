//! The append contract a SQL dialect provides.

use std::fmt::Write;

use tablemap_core::Value;

/// Renders identifiers and values into a query buffer.
///
/// Only used for diagnostics and query text; scanning never formats.
pub trait Formatter: Send + Sync {
    /// Append an identifier (table or column name).
    fn append_ident(&self, buf: &mut String, ident: &str);

    /// Append a value as a literal.
    fn append_value(&self, buf: &mut String, value: &Value);
}

/// Formatter with no dialect: identifiers verbatim, portable literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopFormatter;

impl Formatter for NopFormatter {
    fn append_ident(&self, buf: &mut String, ident: &str) {
        buf.push_str(ident);
    }

    fn append_value(&self, buf: &mut String, value: &Value) {
        append_literal(buf, value);
    }
}

/// Append `value` as an ANSI-style SQL literal.
pub fn append_literal(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push_str("NULL"),
        Value::Bool(true) => buf.push_str("TRUE"),
        Value::Bool(false) => buf.push_str("FALSE"),
        Value::TinyInt(v) => push_display(buf, v),
        Value::SmallInt(v) => push_display(buf, v),
        Value::Int(v) | Value::Date(v) => push_display(buf, v),
        Value::BigInt(v) | Value::Time(v) | Value::Timestamp(v) | Value::TimestampTz(v) => {
            push_display(buf, v);
        }
        Value::Float(v) => push_display(buf, v),
        Value::Double(v) => push_display(buf, v),
        Value::Decimal(s) => buf.push_str(s),
        Value::Text(s) => push_quoted(buf, s),
        Value::Bytes(b) => push_hex(buf, b),
        Value::Uuid(b) => push_hex(buf, b),
        Value::Json(j) => push_quoted(buf, &j.to_string()),
        Value::Array(items) => {
            buf.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                append_literal(buf, item);
            }
            buf.push(')');
        }
    }
}

fn push_display(buf: &mut String, v: &impl std::fmt::Display) {
    let _ = write!(buf, "{v}");
}

fn push_quoted(buf: &mut String, s: &str) {
    buf.push('\'');
    for c in s.chars() {
        if c == '\'' {
            buf.push('\'');
        }
        buf.push(c);
    }
    buf.push('\'');
}

fn push_hex(buf: &mut String, bytes: &[u8]) {
    buf.push_str("X'");
    for b in bytes {
        let _ = write!(buf, "{b:02x}");
    }
    buf.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: &Value) -> String {
        let mut buf = String::new();
        NopFormatter.append_value(&mut buf, value);
        buf
    }

    #[test]
    fn test_literals() {
        assert_eq!(render(&Value::Null), "NULL");
        assert_eq!(render(&Value::Bool(true)), "TRUE");
        assert_eq!(render(&Value::BigInt(-7)), "-7");
        assert_eq!(render(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(render(&Value::Bytes(vec![0xde, 0xad])), "X'dead'");
        assert_eq!(
            render(&Value::Array(vec![Value::Int(1), Value::Int(2)])),
            "(1, 2)"
        );
    }

    #[test]
    fn test_json_is_quoted_text() {
        let json = Value::Json(serde_json::json!({"k": "v"}));
        assert_eq!(render(&json), r#"'{"k":"v"}'"#);
    }

    #[test]
    fn test_ident_is_verbatim() {
        let mut buf = String::new();
        NopFormatter.append_ident(&mut buf, "users");
        assert_eq!(buf, "users");
    }
}
