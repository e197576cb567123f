//! Fluent construction of query trees.
//!
//! `where_field("meta.weight_kg").gt(1.5)` builds a single condition;
//! `Query::builder()` assembles conditions, sorts, pagination, and
//! projection into a full `Query`.

use serde_json::Value;

use crate::query::{
    AggregateFunction, Aggregation, CaseBranch, ComputedField, Condition, Join, JoinType,
    Operator, Pagination, Projection, Query, QueryFilter, QueryHint, Sort,
};
use crate::types::SortOrder;

/// Start a condition on a field. Dotted paths descend into object fields.
pub fn where_field(field: &str) -> ConditionBuilder {
    ConditionBuilder {
        field: field.to_string(),
    }
}

/// Builds a single filter condition for one field.
pub struct ConditionBuilder {
    field: String,
}

impl ConditionBuilder {
    fn finish(self, operator: Operator, value: Value) -> QueryFilter {
        QueryFilter::Condition(Condition {
            field: self.field,
            operator,
            value,
        })
    }

    pub fn eq(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Eq, value.into())
    }

    pub fn neq(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Neq, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Lt, value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Lte, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Gt, value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Gte, value.into())
    }

    pub fn in_list(self, values: Vec<Value>) -> QueryFilter {
        self.finish(Operator::In, Value::Array(values))
    }

    pub fn not_in(self, values: Vec<Value>) -> QueryFilter {
        self.finish(Operator::Nin, Value::Array(values))
    }

    pub fn contains(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Contains, value.into())
    }

    pub fn not_contains(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Ncontains, value.into())
    }

    pub fn starts_with(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Startswith, value.into())
    }

    pub fn ends_with(self, value: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Endswith, value.into())
    }

    pub fn exists(self) -> QueryFilter {
        self.finish(Operator::Exists, Value::Null)
    }

    pub fn not_exists(self) -> QueryFilter {
        self.finish(Operator::Nexists, Value::Null)
    }

    /// Condition on a registered custom predicate.
    pub fn custom(self, operator: &str, args: impl Into<Value>) -> QueryFilter {
        self.finish(Operator::Custom(operator.to_string()), args.into())
    }
}

/// Assembles a complete `Query`.
#[derive(Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    /// Set the filter tree. Successive calls combine with `and`.
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            None => filter,
            Some(existing) => QueryFilter::and(vec![existing, filter]),
        });
        self
    }

    pub fn sort(mut self, field: &str, direction: SortOrder) -> Self {
        self.query.sort.push(Sort {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.query.pagination = Some(match self.query.pagination.take() {
            Some(Pagination::Offset { offset, .. }) => Pagination::Offset { limit, offset },
            _ => Pagination::Offset { limit, offset: 0 },
        });
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.query.pagination = Some(match self.query.pagination.take() {
            Some(Pagination::Offset { limit, .. }) => Pagination::Offset { limit, offset },
            _ => Pagination::Offset { limit: 0, offset },
        });
        self
    }

    pub fn cursor(mut self, limit: i64, cursor: &str) -> Self {
        self.query.pagination = Some(Pagination::Cursor {
            limit,
            cursor: cursor.to_string(),
        });
        self
    }

    pub fn include(mut self, fields: &[&str]) -> Self {
        let projection = self.query.projection.get_or_insert_with(Projection::default);
        projection
            .include
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn exclude(mut self, fields: &[&str]) -> Self {
        let projection = self.query.projection.get_or_insert_with(Projection::default);
        projection
            .exclude
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Add a computed expression field.
    pub fn compute(mut self, function: &str, arguments: Vec<Value>, alias: &str) -> Self {
        let projection = self.query.projection.get_or_insert_with(Projection::default);
        projection.computed.push(ComputedField::Expression {
            function: function.to_string(),
            arguments,
            alias: alias.to_string(),
        });
        self
    }

    /// Add a computed case field.
    pub fn compute_case(
        mut self,
        branches: Vec<(QueryFilter, Value)>,
        otherwise: Option<Value>,
        alias: &str,
    ) -> Self {
        let projection = self.query.projection.get_or_insert_with(Projection::default);
        projection.computed.push(ComputedField::Case {
            branches: branches
                .into_iter()
                .map(|(when, then)| CaseBranch { when, then })
                .collect(),
            otherwise,
            alias: alias.to_string(),
        });
        self
    }

    pub fn join(mut self, target: &str, local_field: &str, foreign_field: &str) -> Self {
        self.query.joins.push(Join {
            target: target.to_string(),
            alias: None,
            join_type: JoinType::Inner,
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
        });
        self
    }

    pub fn aggregate(
        mut self,
        function: AggregateFunction,
        field: Option<&str>,
        alias: &str,
    ) -> Self {
        self.query.aggregations.push(Aggregation {
            function,
            field: field.map(|f| f.to_string()),
            alias: alias.to_string(),
        });
        self
    }

    pub fn hint(mut self, name: &str, value: Value) -> Self {
        self.query.hints.push(QueryHint {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_builder_operators() {
        let filter = where_field("meta.weight_kg").gt(1.5);
        match filter {
            QueryFilter::Condition(c) => {
                assert_eq!(c.field, "meta.weight_kg");
                assert_eq!(c.operator, Operator::Gt);
                assert_eq!(c.value, json!(1.5));
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn test_condition_builder_presence() {
        assert_eq!(
            where_field("name").exists(),
            QueryFilter::Condition(Condition::new("name", Operator::Exists, Value::Null))
        );
    }

    #[test]
    fn test_condition_builder_custom() {
        let filter = where_field("id").custom("is_heavy", true);
        match filter {
            QueryFilter::Condition(c) => {
                assert_eq!(c.operator, Operator::Custom("is_heavy".to_string()));
                assert_eq!(c.value, json!(true));
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_combines_filters_with_and() {
        let query = Query::builder()
            .filter(where_field("a").eq(1))
            .filter(where_field("b").eq(2))
            .build();
        match query.filter.unwrap() {
            QueryFilter::Group {
                operator,
                conditions,
            } => {
                assert_eq!(operator, crate::types::LogicalOperator::And);
                assert_eq!(conditions.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_limit_offset_merge() {
        let query = Query::builder().limit(10).offset(20).build();
        assert_eq!(
            query.pagination,
            Some(Pagination::Offset {
                limit: 10,
                offset: 20
            })
        );
    }

    #[test]
    fn test_builder_cursor_pagination() {
        let query = Query::builder().cursor(5, "abc").build();
        assert_eq!(
            query.pagination,
            Some(Pagination::Cursor {
                limit: 5,
                cursor: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_builder_projection_and_compute() {
        let query = Query::builder()
            .include(&["first", "last"])
            .compute("concat", vec![json!("first"), json!(" "), json!("last")], "fullName")
            .build();
        let projection = query.projection.unwrap();
        assert_eq!(projection.include, vec!["first", "last"]);
        assert_eq!(projection.computed.len(), 1);
        assert_eq!(projection.computed[0].output_name(), "fullName");
    }

    #[test]
    fn test_builder_sort() {
        let query = Query::builder().sort("name", SortOrder::Desc).build();
        assert_eq!(query.sort.len(), 1);
        assert_eq!(query.sort[0].direction, SortOrder::Desc);
    }
}
