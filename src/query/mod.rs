//! Backend-agnostic query DSL.
//!
//! A `Query` is a pure data tree: filter conditions, sort, pagination,
//! projection with computed fields, joins, aggregations, and hints. The
//! SQL generator translates the subset it can push down; everything else
//! is evaluated by the in-memory processor.

pub mod builder;
pub mod validate;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{LogicalOperator, SortOrder};

/// Comparison operator of a filter condition.
///
/// The fixed variants are standard operators the SQL generator can emit.
/// Any other operator name parses to `Custom` and resolves against the
/// predicate registry at query time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Contains,
    Ncontains,
    Startswith,
    Endswith,
    Exists,
    Nexists,
    Custom(String),
}

impl Operator {
    pub fn parse(name: &str) -> Operator {
        match name {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "in" => Operator::In,
            "nin" => Operator::Nin,
            "contains" => Operator::Contains,
            "ncontains" => Operator::Ncontains,
            "startswith" => Operator::Startswith,
            "endswith" => Operator::Endswith,
            "exists" => Operator::Exists,
            "nexists" => Operator::Nexists,
            other => Operator::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Contains => "contains",
            Operator::Ncontains => "ncontains",
            Operator::Startswith => "startswith",
            Operator::Endswith => "endswith",
            Operator::Exists => "exists",
            Operator::Nexists => "nexists",
            Operator::Custom(name) => name,
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Operator::Custom(_))
    }

    /// True for operators whose right-hand side is irrelevant.
    pub fn is_presence(&self) -> bool {
        matches!(self, Operator::Exists | Operator::Nexists)
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Operator::parse(&name))
    }
}

/// A leaf filter: one field compared against one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: Value) -> Self {
        Condition {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// Filter tree: a condition leaf or a logical group of subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryFilter {
    Condition(Condition),
    Group {
        operator: LogicalOperator,
        conditions: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    pub fn and(conditions: Vec<QueryFilter>) -> QueryFilter {
        QueryFilter::Group {
            operator: LogicalOperator::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<QueryFilter>) -> QueryFilter {
        QueryFilter::Group {
            operator: LogicalOperator::Or,
            conditions,
        }
    }

    pub fn not(condition: QueryFilter) -> QueryFilter {
        QueryFilter::Group {
            operator: LogicalOperator::Not,
            conditions: vec![condition],
        }
    }

    /// Flatten groups that are semantic identities.
    ///
    /// Groups with no children vanish; `and`/`or`/`xor` groups with a
    /// single child collapse to that child. `not` and `nor` groups keep
    /// their single child since they negate it.
    pub fn normalize(&self) -> Option<QueryFilter> {
        match self {
            QueryFilter::Condition(_) => Some(self.clone()),
            QueryFilter::Group {
                operator,
                conditions,
            } => {
                let children: Vec<QueryFilter> =
                    conditions.iter().filter_map(|c| c.normalize()).collect();
                match (children.len(), operator) {
                    (0, _) => None,
                    (
                        1,
                        LogicalOperator::And | LogicalOperator::Or | LogicalOperator::Xor,
                    ) => children.into_iter().next(),
                    _ => Some(QueryFilter::Group {
                        operator: *operator,
                        conditions: children,
                    }),
                }
            }
        }
    }

    /// True when any condition in the tree uses a custom operator.
    pub fn has_custom(&self) -> bool {
        match self {
            QueryFilter::Condition(c) => !c.operator.is_standard(),
            QueryFilter::Group { conditions, .. } => conditions.iter().any(|c| c.has_custom()),
        }
    }

    /// Fields referenced by custom-operator conditions anywhere in the tree.
    pub fn custom_fields(&self, out: &mut Vec<String>) {
        match self {
            QueryFilter::Condition(c) => {
                if !c.operator.is_standard() && !out.contains(&c.field) {
                    out.push(c.field.clone());
                }
            }
            QueryFilter::Group { conditions, .. } => {
                for child in conditions {
                    child.custom_fields(out);
                }
            }
        }
    }

    /// Every field referenced anywhere in the tree.
    pub fn referenced_fields(&self, out: &mut Vec<String>) {
        match self {
            QueryFilter::Condition(c) => {
                if !out.contains(&c.field) {
                    out.push(c.field.clone());
                }
            }
            QueryFilter::Group { conditions, .. } => {
                for child in conditions {
                    child.referenced_fields(out);
                }
            }
        }
    }

    /// Drop custom-operator conditions, pruning groups left empty.
    ///
    /// This is what the executor hands to the SQL generator: the pushdown
    /// subtree containing only standard operators.
    pub fn strip_custom(&self) -> Option<QueryFilter> {
        match self {
            QueryFilter::Condition(c) => {
                if c.operator.is_standard() {
                    Some(self.clone())
                } else {
                    None
                }
            }
            QueryFilter::Group {
                operator,
                conditions,
            } => {
                let kept: Vec<QueryFilter> =
                    conditions.iter().filter_map(|c| c.strip_custom()).collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(QueryFilter::Group {
                        operator: *operator,
                        conditions: kept,
                    })
                }
            }
        }
    }

    /// Distinct standard operators present in the tree.
    pub fn standard_operators(&self) -> Vec<Operator> {
        let mut out = Vec::new();
        self.collect_standard(&mut out);
        out
    }

    fn collect_standard(&self, out: &mut Vec<Operator>) {
        match self {
            QueryFilter::Condition(c) => {
                if c.operator.is_standard() && !out.contains(&c.operator) {
                    out.push(c.operator.clone());
                }
            }
            QueryFilter::Group { conditions, .. } => {
                for child in conditions {
                    child.collect_standard(out);
                }
            }
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortOrder,
}

/// Pagination request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Pagination {
    Offset {
        limit: i64,
        #[serde(default)]
        offset: i64,
    },
    Cursor {
        limit: i64,
        cursor: String,
    },
}

/// One branch of a case expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: QueryFilter,
    pub then: Value,
}

/// A projection item computed in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComputedField {
    /// Invoke a registered compute function. String arguments are treated
    /// as field references by the dependency analysis.
    Expression {
        function: String,
        #[serde(default)]
        arguments: Vec<Value>,
        #[serde(default)]
        alias: String,
    },
    /// Evaluate branches in order; the first matching `when` wins.
    Case {
        #[serde(rename = "when")]
        branches: Vec<CaseBranch>,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Value>,
        #[serde(default)]
        alias: String,
    },
}

impl ComputedField {
    /// Name the computed value is stored under: the alias, falling back
    /// to the function name for expressions.
    pub fn output_name(&self) -> &str {
        match self {
            ComputedField::Expression { function, alias, .. } => {
                if alias.is_empty() { function } else { alias }
            }
            ComputedField::Case { alias, .. } => {
                if alias.is_empty() { "case" } else { alias }
            }
        }
    }
}

/// Output shape: include list, exclude list, computed items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed: Vec<ComputedField>,
}

impl Projection {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.computed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

/// Join request. Declared by the DSL; the reference SQL generator does
/// not emit joins and rejects queries that carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub join_type: JoinType,
    pub local_field: String,
    pub foreign_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Aggregation request; declared but not emitted by the reference
/// generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub alias: String,
}

/// Free-form planner hint, passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHint {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// A complete query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<QueryFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<QueryHint>,
}

impl Query {
    pub fn builder() -> builder::QueryBuilder {
        builder::QueryBuilder::new()
    }

    /// Computed items of the projection, empty when no projection is set.
    pub fn computed(&self) -> &[ComputedField] {
        self.projection
            .as_ref()
            .map(|p| p.computed.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, op: &str, value: Value) -> QueryFilter {
        QueryFilter::Condition(Condition::new(field, Operator::parse(op), value))
    }

    #[test]
    fn test_operator_parse_standard() {
        assert_eq!(Operator::parse("eq"), Operator::Eq);
        assert_eq!(Operator::parse("nexists"), Operator::Nexists);
        assert!(Operator::parse("gt").is_standard());
    }

    #[test]
    fn test_operator_parse_custom() {
        let op = Operator::parse("is_heavy");
        assert_eq!(op, Operator::Custom("is_heavy".to_string()));
        assert!(!op.is_standard());
        assert_eq!(op.name(), "is_heavy");
    }

    #[test]
    fn test_operator_serde_roundtrip() {
        let op: Operator = serde_json::from_value(json!("contains")).unwrap();
        assert_eq!(op, Operator::Contains);
        assert_eq!(serde_json::to_value(&op).unwrap(), json!("contains"));
    }

    #[test]
    fn test_filter_deserialize_condition_vs_group() {
        let filter: QueryFilter = serde_json::from_value(json!({
            "field": "age", "operator": "gte", "value": 21
        }))
        .unwrap();
        assert!(matches!(filter, QueryFilter::Condition(_)));

        let filter: QueryFilter = serde_json::from_value(json!({
            "operator": "and",
            "conditions": [
                {"field": "age", "operator": "gte", "value": 21},
                {"field": "name", "operator": "exists"}
            ]
        }))
        .unwrap();
        match filter {
            QueryFilter::Group {
                operator,
                conditions,
            } => {
                assert_eq!(operator, LogicalOperator::And);
                assert_eq!(conditions.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_flattens_single_child_and() {
        let filter = QueryFilter::and(vec![cond("a", "eq", json!(1))]);
        let normalized = filter.normalize().unwrap();
        assert_eq!(normalized, cond("a", "eq", json!(1)));
    }

    #[test]
    fn test_normalize_keeps_single_child_not() {
        let filter = QueryFilter::not(cond("a", "eq", json!(1)));
        let normalized = filter.normalize().unwrap();
        assert!(matches!(
            normalized,
            QueryFilter::Group {
                operator: LogicalOperator::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_normalize_drops_empty_groups() {
        let filter = QueryFilter::and(vec![
            QueryFilter::or(vec![]),
            cond("a", "eq", json!(1)),
        ]);
        let normalized = filter.normalize().unwrap();
        assert_eq!(normalized, cond("a", "eq", json!(1)));
        assert_eq!(QueryFilter::and(vec![]).normalize(), None);
    }

    #[test]
    fn test_normalize_recurses() {
        let filter = QueryFilter::or(vec![QueryFilter::and(vec![QueryFilter::or(vec![cond(
            "a",
            "eq",
            json!(1),
        )])])]);
        assert_eq!(filter.normalize().unwrap(), cond("a", "eq", json!(1)));
    }

    #[test]
    fn test_strip_custom_removes_leaves() {
        let filter = QueryFilter::and(vec![
            cond("a", "eq", json!(1)),
            cond("b", "is_heavy", json!(true)),
        ]);
        let stripped = filter.strip_custom().unwrap();
        match stripped {
            QueryFilter::Group { conditions, .. } => {
                assert_eq!(conditions.len(), 1);
                assert_eq!(conditions[0], cond("a", "eq", json!(1)));
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_custom_prunes_empty_groups() {
        let filter = QueryFilter::and(vec![cond("b", "is_heavy", json!(true))]);
        assert_eq!(filter.strip_custom(), None);
    }

    #[test]
    fn test_custom_fields_deduplicated() {
        let filter = QueryFilter::or(vec![
            cond("id", "is_heavy", json!(true)),
            cond("id", "is_light", json!(false)),
            cond("age", "gte", json!(21)),
        ]);
        let mut fields = Vec::new();
        filter.custom_fields(&mut fields);
        assert_eq!(fields, vec!["id"]);
    }

    #[test]
    fn test_standard_operators_deduplicated() {
        let filter = QueryFilter::and(vec![
            cond("a", "eq", json!(1)),
            cond("b", "eq", json!(2)),
            cond("c", "gt", json!(3)),
            cond("d", "is_heavy", json!(true)),
        ]);
        let ops = filter.standard_operators();
        assert_eq!(ops, vec![Operator::Eq, Operator::Gt]);
    }

    #[test]
    fn test_computed_output_name() {
        let expr = ComputedField::Expression {
            function: "concat".to_string(),
            arguments: vec![],
            alias: "fullName".to_string(),
        };
        assert_eq!(expr.output_name(), "fullName");

        let unaliased = ComputedField::Expression {
            function: "concat".to_string(),
            arguments: vec![],
            alias: String::new(),
        };
        assert_eq!(unaliased.output_name(), "concat");
    }

    #[test]
    fn test_query_serde_roundtrip() {
        let query = Query {
            filter: Some(cond("state", "eq", json!("active"))),
            sort: vec![Sort {
                field: "name".to_string(),
                direction: SortOrder::Asc,
            }],
            pagination: Some(Pagination::Offset {
                limit: 10,
                offset: 20,
            }),
            projection: Some(Projection {
                include: vec!["name".to_string()],
                ..Projection::default()
            }),
            ..Query::default()
        };
        let value = serde_json::to_value(&query).unwrap();
        let back: Query = serde_json::from_value(value).unwrap();
        assert_eq!(back, query);
    }
}
