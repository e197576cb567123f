//! Shared value vocabulary for documents, filters, and schemas.
//!
//! Documents are JSON object trees. Both the validator and the in-memory
//! processor resolve dotted field paths and coerce numerics through the
//! helpers here, so the two passes agree on the semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record in a collection: field name to value.
pub type Document = serde_json::Map<String, Value>;

/// Logical combinator for filter groups and constraint groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
    Nor,
    Xor,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
            LogicalOperator::Not => "not",
            LogicalOperator::Nor => "nor",
            LogicalOperator::Xor => "xor",
        }
    }

    /// Combine already-evaluated child results.
    ///
    /// `and` requires all true, `or` any true, `not` a single false child,
    /// `nor` none true, `xor` exactly one true.
    pub fn combine(&self, results: &[bool]) -> bool {
        match self {
            LogicalOperator::And => results.iter().all(|r| *r),
            LogicalOperator::Or => results.iter().any(|r| *r),
            LogicalOperator::Not => results.len() == 1 && !results[0],
            LogicalOperator::Nor => !results.iter().any(|r| *r),
            LogicalOperator::Xor => results.iter().filter(|r| **r).count() == 1,
        }
    }
}

/// Sort direction for query sorts and index ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Human-readable name of a JSON value's runtime type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Unified numeric view used by ordering comparisons.
///
/// Integers, floats, and numeric strings all convert; everything else is
/// not comparable.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Resolve a dotted path (`a.b.c`) inside a document.
///
/// Returns `None` when any segment is absent or a non-object is reached
/// before the final segment.
pub fn resolve_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
