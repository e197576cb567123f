//! SQL generation for the reference SQLite dialect.
//!
//! Translates the pushdown subset of the query DSL into parameterized
//! statements: positional `?` placeholders, double-quoted identifiers,
//! `RETURNING *` on inserts, and `json_extract` for dotted paths into
//! object columns. Custom operators never reach this layer; the executor
//! strips them first, and the generator rejects any that slip through.

pub mod ddl;
pub mod expr;
pub mod filter;
pub mod select;
pub mod write;

use crate::schema::Schema;

pub use ddl::column_type;
pub use expr::quote_ident;

/// One parameter bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A generated statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: String, params: Vec<SqlValue>) -> Self {
        Statement { sql, params }
    }
}

/// Generates statements for one collection schema.
pub struct SqlGenerator<'a> {
    schema: &'a Schema,
}

impl<'a> SqlGenerator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        SqlGenerator { schema }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    fn table(&self) -> String {
        quote_ident(&self.schema.name)
    }
}
