//! WHERE-clause generation from filter trees.
//!
//! Standard operators map onto SQL comparisons; empty `in` collapses to
//! always-false and empty `nin` to always-true. Custom operators are
//! rejected here: the executor must strip them before handing the filter
//! to the generator.

use serde_json::Value;

use crate::error::EngineError;
use crate::query::{Condition, Operator, QueryFilter};
use crate::schema::Schema;
use crate::sql::expr::{field_accessor, field_accessor_lenient, scalar_literal};
use crate::sql::write::prepare_value;
use crate::sql::SqlValue;
use crate::types::LogicalOperator;

/// Build a WHERE clause, appending bound parameters to `params`.
pub(crate) fn filter_clause(
    schema: &Schema,
    filter: &QueryFilter,
    params: &mut Vec<SqlValue>,
) -> Result<String, EngineError> {
    match filter {
        QueryFilter::Condition(condition) => condition_clause(schema, condition, params),
        QueryFilter::Group {
            operator,
            conditions,
        } => {
            if conditions.is_empty() {
                return Ok("1=1".to_string());
            }
            let mut parts = Vec::with_capacity(conditions.len());
            for child in conditions {
                parts.push(filter_clause(schema, child, params)?);
            }
            Ok(combine_clauses(*operator, &parts))
        }
    }
}

fn combine_clauses(operator: LogicalOperator, parts: &[String]) -> String {
    match operator {
        LogicalOperator::And => format!("({})", parts.join(" AND ")),
        LogicalOperator::Or => format!("({})", parts.join(" OR ")),
        LogicalOperator::Not => {
            if parts.len() == 1 {
                format!("NOT ({})", parts[0])
            } else {
                "1=0".to_string()
            }
        }
        LogicalOperator::Nor => format!("NOT ({})", parts.join(" OR ")),
        LogicalOperator::Xor => {
            let sum = parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(" + ");
            format!("({} = 1)", sum)
        }
    }
}

fn condition_clause(
    schema: &Schema,
    condition: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, EngineError> {
    let accessor = field_accessor(schema, &condition.field)?;
    let field = top_level_field(schema, &condition.field);

    match &condition.operator {
        Operator::Eq => binary(accessor, "=", field, condition, params),
        Operator::Neq => binary(accessor, "!=", field, condition, params),
        Operator::Lt => binary(accessor, "<", field, condition, params),
        Operator::Lte => binary(accessor, "<=", field, condition, params),
        Operator::Gt => binary(accessor, ">", field, condition, params),
        Operator::Gte => binary(accessor, ">=", field, condition, params),
        Operator::In | Operator::Nin => {
            let members = list_members(&condition.value);
            let negated = condition.operator == Operator::Nin;
            if members.is_empty() {
                return Ok(if negated { "1=1" } else { "1=0" }.to_string());
            }
            for member in &members {
                params.push(prepare_value(field, member)?);
            }
            let placeholders = vec!["?"; members.len()].join(", ");
            let keyword = if negated { "NOT IN" } else { "IN" };
            Ok(format!("{} {} ({})", accessor, keyword, placeholders))
        }
        Operator::Contains => like(accessor, "LIKE", condition, |t| format!("%{}%", t), params),
        Operator::Ncontains => {
            like(accessor, "NOT LIKE", condition, |t| format!("%{}%", t), params)
        }
        Operator::Startswith => like(accessor, "LIKE", condition, |t| format!("{}%", t), params),
        Operator::Endswith => like(accessor, "LIKE", condition, |t| format!("%{}", t), params),
        Operator::Exists => Ok(format!("{} IS NOT NULL", accessor)),
        Operator::Nexists => Ok(format!("{} IS NULL", accessor)),
        Operator::Custom(name) => Err(EngineError::UnsupportedOperator {
            operator: name.clone(),
        }),
    }
}

fn binary(
    accessor: String,
    op: &str,
    field: Option<&crate::schema::Field>,
    condition: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, EngineError> {
    params.push(prepare_value(field, &condition.value)?);
    Ok(format!("{} {} ?", accessor, op))
}

fn like(
    accessor: String,
    keyword: &str,
    condition: &Condition,
    shape: impl Fn(&str) -> String,
    params: &mut Vec<SqlValue>,
) -> Result<String, EngineError> {
    let text = match &condition.value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(EngineError::CoercionFailed {
                field: condition.field.clone(),
                value: other.to_string(),
            });
        }
    };
    params.push(SqlValue::Text(shape(&text)));
    Ok(format!("{} {} ?", accessor, keyword))
}

fn list_members(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// The declared field for a top-level path; dotted paths prepare by the
/// runtime value instead.
fn top_level_field<'a>(schema: &'a Schema, path: &str) -> Option<&'a crate::schema::Field> {
    if path.contains('.') {
        None
    } else {
        schema.field(path)
    }
}

/// WHERE clause with inline literals, for contexts where placeholders are
/// unavailable (partial index DDL). Paths resolve leniently.
pub(crate) fn filter_clause_literal(filter: &QueryFilter) -> String {
    match filter {
        QueryFilter::Condition(condition) => {
            let accessor = field_accessor_lenient(&condition.field);
            let value = &condition.value;
            match &condition.operator {
                Operator::Eq => format!("{} = {}", accessor, scalar_literal(value)),
                Operator::Neq => format!("{} != {}", accessor, scalar_literal(value)),
                Operator::Lt => format!("{} < {}", accessor, scalar_literal(value)),
                Operator::Lte => format!("{} <= {}", accessor, scalar_literal(value)),
                Operator::Gt => format!("{} > {}", accessor, scalar_literal(value)),
                Operator::Gte => format!("{} >= {}", accessor, scalar_literal(value)),
                Operator::In | Operator::Nin => {
                    let members = list_members(value);
                    let negated = condition.operator == Operator::Nin;
                    if members.is_empty() {
                        return if negated { "1=1" } else { "1=0" }.to_string();
                    }
                    let rendered = members
                        .iter()
                        .map(scalar_literal)
                        .collect::<Vec<_>>()
                        .join(", ");
                    let keyword = if negated { "NOT IN" } else { "IN" };
                    format!("{} {} ({})", accessor, keyword, rendered)
                }
                Operator::Exists => format!("{} IS NOT NULL", accessor),
                Operator::Nexists => format!("{} IS NULL", accessor),
                // Substring and custom operators have no literal form here.
                _ => "1=1".to_string(),
            }
        }
        QueryFilter::Group {
            operator,
            conditions,
        } => {
            if conditions.is_empty() {
                return "1=1".to_string();
            }
            let parts: Vec<String> = conditions.iter().map(filter_clause_literal).collect();
            combine_clauses(*operator, &parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::where_field;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(
            &json!({
                "name": "items",
                "version": "1",
                "fields": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"},
                    "active": {"type": "boolean"},
                    "meta": {"type": "object", "schema": "m"}
                },
                "nestedSchemas": {"m": {"fields": {"weight_kg": {"type": "number"}}}}
            })
            .to_string(),
        )
        .unwrap()
    }

    fn clause(filter: &QueryFilter) -> (String, Vec<SqlValue>) {
        let schema = schema();
        let mut params = Vec::new();
        let sql = filter_clause(&schema, filter, &mut params).unwrap();
        (sql, params)
    }

    #[test]
    fn test_binary_operators() {
        let (sql, params) = clause(&where_field("id").gte(5));
        assert_eq!(sql, "\"id\" >= ?");
        assert_eq!(params, vec![SqlValue::Integer(5)]);
    }

    #[test]
    fn test_dotted_path_condition() {
        let (sql, params) = clause(&where_field("meta.weight_kg").gt(1.5));
        assert_eq!(sql, "json_extract(\"meta\", '$.weight_kg') > ?");
        assert_eq!(params, vec![SqlValue::Real(1.5)]);
    }

    #[test]
    fn test_boolean_param_prepared_as_integer() {
        let (sql, params) = clause(&where_field("active").eq(true));
        assert_eq!(sql, "\"active\" = ?");
        assert_eq!(params, vec![SqlValue::Integer(1)]);
    }

    #[test]
    fn test_in_with_members() {
        let (sql, params) =
            clause(&where_field("id").in_list(vec![json!(1), json!(2), json!(3)]));
        assert_eq!(sql, "\"id\" IN (?, ?, ?)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_in_collapses_to_false() {
        let (sql, params) = clause(&where_field("id").in_list(vec![]));
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_nin_collapses_to_true() {
        let (sql, params) = clause(&where_field("id").not_in(vec![]));
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn test_contains_shapes_like_pattern() {
        let (sql, params) = clause(&where_field("name").contains("wid"));
        assert_eq!(sql, "\"name\" LIKE ?");
        assert_eq!(params, vec![SqlValue::Text("%wid%".to_string())]);
    }

    #[test]
    fn test_anchored_like_patterns() {
        let (_, params) = clause(&where_field("name").starts_with("wid"));
        assert_eq!(params, vec![SqlValue::Text("wid%".to_string())]);
        let (_, params) = clause(&where_field("name").ends_with("get"));
        assert_eq!(params, vec![SqlValue::Text("%get".to_string())]);
    }

    #[test]
    fn test_exists_operators() {
        let (sql, params) = clause(&where_field("name").exists());
        assert_eq!(sql, "\"name\" IS NOT NULL");
        assert!(params.is_empty());
        let (sql, _) = clause(&where_field("name").not_exists());
        assert_eq!(sql, "\"name\" IS NULL");
    }

    #[test]
    fn test_group_combinators() {
        let (sql, _) = clause(&QueryFilter::and(vec![
            where_field("id").gt(1),
            where_field("name").eq("a"),
        ]));
        assert_eq!(sql, "(\"id\" > ? AND \"name\" = ?)");

        let (sql, _) = clause(&QueryFilter::not(where_field("id").eq(1)));
        assert_eq!(sql, "NOT (\"id\" = ?)");

        let (sql, _) = clause(&QueryFilter::Group {
            operator: LogicalOperator::Nor,
            conditions: vec![where_field("id").eq(1), where_field("id").eq(2)],
        });
        assert_eq!(sql, "NOT (\"id\" = ? OR \"id\" = ?)");

        let (sql, _) = clause(&QueryFilter::Group {
            operator: LogicalOperator::Xor,
            conditions: vec![where_field("id").eq(1), where_field("id").eq(2)],
        });
        assert_eq!(sql, "((\"id\" = ?) + (\"id\" = ?) = 1)");
    }

    #[test]
    fn test_custom_operator_rejected() {
        let schema = schema();
        let mut params = Vec::new();
        let err = filter_clause(
            &schema,
            &where_field("id").custom("is_heavy", true),
            &mut params,
        )
        .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = schema();
        let mut params = Vec::new();
        let err =
            filter_clause(&schema, &where_field("ghost").eq(1), &mut params).unwrap_err();
        assert_eq!(err.code(), "FIELD_NOT_IN_SCHEMA");
    }

    #[test]
    fn test_literal_clause_for_partial_indexes() {
        let sql = filter_clause_literal(&where_field("active").eq(true));
        assert_eq!(sql, "\"active\" = 1");
        let sql = filter_clause_literal(&QueryFilter::and(vec![
            where_field("active").eq(true),
            where_field("state").neq("gone"),
        ]));
        assert_eq!(sql, "(\"active\" = 1 AND \"state\" != 'gone')");
    }
}
