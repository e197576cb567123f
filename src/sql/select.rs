//! SELECT generation.
//!
//! Emits projection, WHERE, ORDER BY, and offset pagination. Joins and
//! aggregations are declared in the DSL but not emitted by this dialect;
//! queries carrying them are rejected. Cursor pagination is accepted and
//! ignored here.

use crate::error::EngineError;
use crate::query::{Pagination, Query};
use crate::sql::expr::{field_accessor, quote_ident};
use crate::sql::filter::filter_clause;
use crate::sql::{SqlGenerator, Statement};

impl SqlGenerator<'_> {
    /// Translate a query into a SELECT statement.
    ///
    /// # Errors
    /// `UNSUPPORTED_OPERATOR` for custom operators still present in the
    /// filter, and for joins or aggregations; path errors from the field
    /// accessor pass through.
    pub fn select(&self, query: &Query) -> Result<Statement, EngineError> {
        if let Some(join) = query.joins.first() {
            return Err(EngineError::UnsupportedOperator {
                operator: format!("join on '{}'", join.target),
            });
        }
        if !query.aggregations.is_empty() {
            return Err(EngineError::UnsupportedOperator {
                operator: "aggregation".to_string(),
            });
        }

        let mut params = Vec::new();

        let projection = match &query.projection {
            Some(p) if !p.include.is_empty() => {
                let mut parts = Vec::with_capacity(p.include.len());
                for path in &p.include {
                    let accessor = field_accessor(self.schema(), path)?;
                    parts.push(format!("{} AS {}", accessor, quote_ident(path)));
                }
                parts.join(", ")
            }
            _ => "*".to_string(),
        };

        let mut sql = format!("SELECT {} FROM {}", projection, self.table());

        if let Some(filter) = &query.filter {
            let clause = filter_clause(self.schema(), filter, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !query.sort.is_empty() {
            let mut keys = Vec::with_capacity(query.sort.len());
            for sort in &query.sort {
                let accessor = field_accessor(self.schema(), &sort.field)?;
                keys.push(format!("{} {}", accessor, sort.direction.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(Pagination::Offset { limit, offset }) = &query.pagination {
            sql.push_str(&format!(" LIMIT {}", limit));
            if *offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        sql.push(';');
        Ok(Statement::new(sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::where_field;
    use crate::schema::Schema;
    use crate::sql::SqlValue;
    use crate::types::SortOrder;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(
            &json!({
                "name": "items",
                "version": "1",
                "fields": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"},
                    "meta": {"type": "object", "schema": "m"}
                },
                "nestedSchemas": {"m": {"fields": {"weight_kg": {"type": "number"}}}}
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_bare_select() {
        let schema = schema();
        let stmt = SqlGenerator::new(&schema).select(&Query::default()).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"items\";");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_dotted_filter_matches_reference_shape() {
        let schema = schema();
        let query = Query::builder()
            .filter(where_field("meta.weight_kg").gt(1.5))
            .build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"items\" WHERE json_extract(\"meta\", '$.weight_kg') > ?;"
        );
        assert_eq!(stmt.params, vec![SqlValue::Real(1.5)]);
    }

    #[test]
    fn test_projection_aliases() {
        let schema = schema();
        let query = Query::builder().include(&["id", "meta.weight_kg"]).build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\" AS \"id\", \
             json_extract(\"meta\", '$.weight_kg') AS \"meta.weight_kg\" \
             FROM \"items\";"
        );
    }

    #[test]
    fn test_sort_and_pagination() {
        let schema = schema();
        let query = Query::builder()
            .sort("name", SortOrder::Desc)
            .limit(10)
            .offset(20)
            .build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"items\" ORDER BY \"name\" DESC LIMIT 10 OFFSET 20;"
        );
    }

    #[test]
    fn test_zero_offset_not_emitted() {
        let schema = schema();
        let query = Query::builder().limit(5).build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"items\" LIMIT 5;");
    }

    #[test]
    fn test_cursor_pagination_not_emitted() {
        let schema = schema();
        let query = Query::builder().cursor(5, "abc").build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"items\";");
    }

    #[test]
    fn test_sort_on_dotted_path() {
        let schema = schema();
        let query = Query::builder().sort("meta.weight_kg", SortOrder::Asc).build();
        let stmt = SqlGenerator::new(&schema).select(&query).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"items\" ORDER BY json_extract(\"meta\", '$.weight_kg') ASC;"
        );
    }

    #[test]
    fn test_joins_rejected() {
        let schema = schema();
        let query = Query::builder().join("orders", "id", "item_id").build();
        let err = SqlGenerator::new(&schema).select(&query).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }

    #[test]
    fn test_aggregations_rejected() {
        let schema = schema();
        let query = Query::builder()
            .aggregate(crate::query::AggregateFunction::Count, None, "n")
            .build();
        let err = SqlGenerator::new(&schema).select(&query).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }

    #[test]
    fn test_custom_operator_in_filter_rejected() {
        let schema = schema();
        let query = Query::builder()
            .filter(where_field("id").custom("is_heavy", true))
            .build();
        let err = SqlGenerator::new(&schema).select(&query).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }
}
