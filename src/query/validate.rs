//! Structural validation of built queries.
//!
//! Checks a `Query` before planning and reports every problem at once,
//! rather than failing on the first.

use serde::{Deserialize, Serialize};

use crate::query::{AggregateFunction, Pagination, Query};

/// One structural problem in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DslError {
    /// Dotted location of the offending part, e.g. `pagination.limit`.
    pub field: String,
    pub message: String,
}

impl DslError {
    fn new(field: &str, message: &str) -> Self {
        DslError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Render a list of errors as a single semicolon-joined line.
    pub fn join(errors: &[DslError]) -> String {
        errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate a query's structure. Empty result means the query is usable.
pub fn validate(query: &Query) -> Vec<DslError> {
    let mut errors = Vec::new();

    match &query.pagination {
        Some(Pagination::Offset { limit, offset }) => {
            if *limit <= 0 {
                errors.push(DslError::new("pagination.limit", "limit must be positive"));
            }
            if *offset < 0 {
                errors.push(DslError::new(
                    "pagination.offset",
                    "offset must not be negative",
                ));
            }
        }
        Some(Pagination::Cursor { limit, cursor }) => {
            if *limit <= 0 {
                errors.push(DslError::new("pagination.limit", "limit must be positive"));
            }
            if cursor.is_empty() {
                errors.push(DslError::new("pagination.cursor", "cursor must not be empty"));
            }
        }
        None => {}
    }

    if let Some(projection) = &query.projection {
        if !projection.include.is_empty() && !projection.exclude.is_empty() {
            errors.push(DslError::new(
                "projection",
                "include and exclude cannot both be set",
            ));
        }
    }

    for (i, join) in query.joins.iter().enumerate() {
        if join.target.is_empty() {
            errors.push(DslError::new(
                &format!("joins[{}].target", i),
                "join target table must not be empty",
            ));
        }
    }

    for (i, agg) in query.aggregations.iter().enumerate() {
        if agg.alias.is_empty() {
            errors.push(DslError::new(
                &format!("aggregations[{}].alias", i),
                "aggregation requires an alias",
            ));
        }
        if agg.function != AggregateFunction::Count && agg.field.is_none() {
            errors.push(DslError::new(
                &format!("aggregations[{}].field", i),
                "aggregation requires a field",
            ));
        }
    }

    errors
}
