//! Identifier quoting and field-path resolution.
//!
//! Every table, column, and alias is double-quoted with embedded quotes
//! doubled. Dotted paths resolve through `json_extract` on the root
//! column, which must be declared with a structured type.

use serde_json::Value;

use crate::error::EngineError;
use crate::schema::Schema;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a scalar JSON value as an inline SQL literal. Used only where
/// placeholders are unavailable (DDL); statement values always bind.
pub fn scalar_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

/// Resolve a field path against the schema to a SQL expression.
///
/// Top-level names map to their quoted column. Dotted paths emit
/// `json_extract("root", '$.rest')` and require the root to be an
/// object, record, or union field.
///
/// # Errors
/// `FIELD_NOT_IN_SCHEMA` for an unknown root field,
/// `NESTED_ACCESS_ON_SCALAR` for a dotted path into a non-structured
/// field.
pub fn field_accessor(schema: &Schema, path: &str) -> Result<String, EngineError> {
    let (root, rest) = match path.split_once('.') {
        None => (path, None),
        Some((root, rest)) => (root, Some(rest)),
    };

    let Some(field) = schema.field(root) else {
        return Err(EngineError::FieldNotInSchema {
            field: root.to_string(),
            schema: schema.name.clone(),
        });
    };

    match rest {
        None => Ok(quote_ident(root)),
        Some(rest) => {
            if !field.field_type.is_structured() {
                return Err(EngineError::NestedAccessOnScalar {
                    path: path.to_string(),
                    field: root.to_string(),
                });
            }
            Ok(json_accessor(root, rest))
        }
    }
}

/// Path resolution without schema checks, for index DDL where only the
/// collection name is known.
pub fn field_accessor_lenient(path: &str) -> String {
    match path.split_once('.') {
        None => quote_ident(path),
        Some((root, rest)) => json_accessor(root, rest),
    }
}

fn json_accessor(root: &str, rest: &str) -> String {
    format!(
        "json_extract({}, {})",
        quote_ident(root),
        quote_literal(&format!("$.{}", rest))
    )
}
