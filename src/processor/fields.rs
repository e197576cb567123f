//! Field-dependency analysis for query planning.
//!
//! Before SQL generation the executor asks which fields the in-memory
//! pass will need, so the pushed-down projection always covers them.

use serde_json::Value;

use crate::query::{ComputedField, Query};

/// Fields the in-memory pass depends on: the projection's include list,
/// string arguments of computed expressions (treated as field references),
/// and every field of a custom-operator condition in the filter tree.
/// Standard-operator conditions contribute nothing since SQL enforces
/// them.
pub fn fields_to_select(query: &Query) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();

    if let Some(projection) = &query.projection {
        for name in &projection.include {
            push_unique(&mut fields, name);
        }
        for item in &projection.computed {
            match item {
                ComputedField::Expression { arguments, .. } => {
                    for arg in arguments {
                        if let Value::String(name) = arg {
                            push_unique(&mut fields, name);
                        }
                    }
                }
                ComputedField::Case { branches, .. } => {
                    for branch in branches {
                        branch.when.referenced_fields(&mut fields);
                    }
                }
            }
        }
    }

    if let Some(filter) = &query.filter {
        filter.custom_fields(&mut fields);
    }

    fields
}

fn push_unique(fields: &mut Vec<String>, name: &str) {
    if !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}
