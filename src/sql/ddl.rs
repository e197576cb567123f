//! DDL generation: table creation, indexes, drops, existence checks.
//!
//! Column types map onto SQLite storage classes; complex fields are
//! stored as JSON text. The primary key is a table-level clause, unique
//! and enum-membership constraints are inline, and indexes over dotted
//! paths compile to expression indexes on the JSON accessor.

use crate::error::EngineError;
use crate::schema::{FieldType, Index, IndexType};
use crate::sql::expr::{field_accessor_lenient, quote_ident, scalar_literal};
use crate::sql::filter::filter_clause_literal;
use crate::sql::{SqlGenerator, SqlValue, Statement};

/// SQLite column type for a declared field type.
pub fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Enum => "TEXT",
        FieldType::Integer => "INTEGER",
        FieldType::Number | FieldType::Decimal => "REAL",
        FieldType::Boolean => "INTEGER",
        FieldType::Array
        | FieldType::Set
        | FieldType::Object
        | FieldType::Record
        | FieldType::Union => "TEXT",
    }
}

impl SqlGenerator<'_> {
    /// CREATE TABLE for the collection. Columns are emitted in sorted
    /// name order so the statement is deterministic.
    pub fn create_table(&self) -> Result<String, EngineError> {
        let schema = self.schema();
        let mut columns = Vec::with_capacity(schema.fields.len());
        for name in schema.field_names() {
            let field = &schema.fields[name];
            let mut column = format!("{} {}", quote_ident(name), column_type(field.field_type));
            if field.unique {
                column.push_str(" UNIQUE");
            }
            if field.field_type == FieldType::Enum {
                let members = field
                    .values
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(scalar_literal)
                    .collect::<Vec<_>>()
                    .join(", ");
                column.push_str(&format!(" CHECK ({} IN ({}))", quote_ident(name), members));
            }
            columns.push(column);
        }

        if let Some(primary) = schema.primary_index() {
            let keys = primary
                .fields
                .iter()
                .map(|f| quote_ident(f))
                .collect::<Vec<_>>()
                .join(", ");
            columns.push(format!("PRIMARY KEY ({})", keys));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.table(),
            columns.join(", ")
        ))
    }

    pub fn drop_table(name: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_ident(name))
    }

    /// Existence check against the catalog.
    pub fn exists_check(name: &str) -> Statement {
        Statement::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?;".to_string(),
            vec![SqlValue::Text(name.to_string())],
        )
    }

    /// CREATE INDEX for one index record, or `None` for the primary index
    /// (created with the table). Spatial and fulltext indexes degrade to
    /// plain indexes on this backend.
    pub fn create_index(collection: &str, index: &Index) -> Option<String> {
        if index.index_type == IndexType::Primary {
            return None;
        }

        let unique = if index.is_unique() { "UNIQUE " } else { "" };
        let order = index.order.map(|o| o.as_sql()).unwrap_or("ASC");
        let keys = index
            .fields
            .iter()
            .map(|path| format!("{} {}", field_accessor_lenient(path), order))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique,
            quote_ident(&index.name),
            quote_ident(collection),
            keys
        );
        if let Some(partial) = &index.partial {
            sql.push_str(" WHERE ");
            sql.push_str(&filter_clause_literal(partial));
        }
        sql.push(';');
        Some(sql)
    }
}
