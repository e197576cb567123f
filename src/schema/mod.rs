//! Collection schemas: typed field descriptions, indexes, constraints, and
//! nested object/union schemas.
//!
//! A `Schema` is pure data. It is constructed from a declarative
//! description (`descriptor`), checked once, and never mutated afterwards.

pub mod definition;
pub mod descriptor;

pub use definition::{
    Constraint, Field, FieldGroup, FieldType, Index, IndexType, LiteralSchema, NestedSchema,
    Schema, SchemaRef, StructuredSchema, WhenClause,
};
