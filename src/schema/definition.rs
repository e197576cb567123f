//! Core schema definition types.
//!
//! Backend-agnostic description of a collection: fields and their types,
//! indexes, constraints, and nested schemas. The SQL generator maps these
//! onto column types and DDL; the validator walks them against documents.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::EngineError;
use crate::types::{LogicalOperator, SortOrder};

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Text data
    String,
    /// Signed integer data
    Integer,
    /// Floating point data
    Number,
    /// Fixed-point numeric data, stored like `Number`
    Decimal,
    /// Boolean data
    Boolean,
    /// Ordered list of values
    Array,
    /// List of values with duplicates forbidden
    Set,
    /// One of a declared list of values
    Enum,
    /// Structured value described by a nested schema
    Object,
    /// Free-form key-value mapping
    Record,
    /// One of several nested schemas, discriminated by shape
    Union,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Set => "set",
            FieldType::Enum => "enum",
            FieldType::Object => "object",
            FieldType::Record => "record",
            FieldType::Union => "union",
        }
    }

    pub fn parse(name: &str) -> Option<FieldType> {
        match name {
            "string" => Some(FieldType::String),
            "integer" => Some(FieldType::Integer),
            "number" => Some(FieldType::Number),
            "decimal" => Some(FieldType::Decimal),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "set" => Some(FieldType::Set),
            "enum" => Some(FieldType::Enum),
            "object" => Some(FieldType::Object),
            "record" => Some(FieldType::Record),
            "union" => Some(FieldType::Union),
            _ => None,
        }
    }

    /// True for types whose values hold named subfields, making dotted
    /// path access into the stored column legal.
    pub fn is_structured(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Record | FieldType::Union)
    }

    /// True for types stored as JSON text in the backing column.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            FieldType::Array
                | FieldType::Set
                | FieldType::Object
                | FieldType::Record
                | FieldType::Union
        )
    }
}

/// Reference from a field to one nested schema, or to several for unions.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaRef {
    One(String),
    Many(Vec<String>),
}

impl SchemaRef {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            SchemaRef::One(id) => vec![id.as_str()],
            SchemaRef::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// A single field in a schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    /// Default value, opaque to the engine.
    pub default: Option<Value>,
    /// Legal members for `enum` fields.
    pub values: Option<Vec<Value>>,
    /// Element type for `array` and `set` fields.
    pub items_type: Option<FieldType>,
    /// Nested schema id(s) for `object`, `record`, and `union` fields.
    pub schema: Option<SchemaRef>,
    pub description: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl Field {
    /// Minimal field with everything optional left empty.
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Field {
            name: name.to_string(),
            field_type,
            required: false,
            unique: false,
            default: None,
            values: None,
            items_type: None,
            schema: None,
            description: None,
            constraints: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A declarative validation rule or a logical group of rules.
///
/// Rules invoke a named predicate from the function registry. Groups
/// combine child outcomes with a logical operator and nest arbitrarily.
#[derive(Debug, Clone)]
pub enum Constraint {
    Rule {
        name: String,
        predicate: String,
        /// Field the rule applies to; the owning field when absent.
        field: Option<String>,
        /// Opaque parameters decoded by the predicate itself.
        parameters: Value,
        error_message: Option<String>,
    },
    Group {
        name: String,
        operator: LogicalOperator,
        rules: Vec<Constraint>,
    },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Rule { name, .. } => name,
            Constraint::Group { name, .. } => name,
        }
    }
}

/// Index kind, mapped per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Normal,
    Unique,
    Primary,
    Spatial,
    Fulltext,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Normal => "normal",
            IndexType::Unique => "unique",
            IndexType::Primary => "primary",
            IndexType::Spatial => "spatial",
            IndexType::Fulltext => "fulltext",
        }
    }

    pub fn parse(name: &str) -> Option<IndexType> {
        match name {
            "normal" => Some(IndexType::Normal),
            "unique" => Some(IndexType::Unique),
            "primary" => Some(IndexType::Primary),
            "spatial" => Some(IndexType::Spatial),
            "fulltext" => Some(IndexType::Fulltext),
            _ => None,
        }
    }
}

/// An index over one or more fields.
///
/// Fields may use dotted paths into object-typed columns; backends without
/// native JSON indexing compile those to expression indexes.
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub fields: Vec<String>,
    pub index_type: IndexType,
    pub unique: bool,
    pub order: Option<SortOrder>,
    /// Condition limiting the indexed rows.
    pub partial: Option<crate::query::QueryFilter>,
}

impl Index {
    pub fn new(name: &str, fields: &[&str], index_type: IndexType) -> Self {
        Index {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            index_type,
            unique: false,
            order: None,
            partial: None,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.index_type == IndexType::Unique
    }
}

/// Discriminator guard for a structured nested-schema field group.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub field: String,
    pub value: Value,
}

/// One field group of a structured nested schema, optionally guarded.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub when: Option<WhenClause>,
    pub fields: HashMap<String, Field>,
}

/// A nested schema with named fields.
///
/// A plain object schema has one unguarded group. A partitioned schema has
/// several groups, each guarded by a `when` clause; only the group whose
/// clause matches the value under validation is active.
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub groups: Vec<FieldGroup>,
}

impl StructuredSchema {
    pub fn plain(fields: HashMap<String, Field>) -> Self {
        StructuredSchema {
            groups: vec![FieldGroup { when: None, fields }],
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.groups.iter().any(|g| g.when.is_some())
    }
}

/// A nested schema constraining values to a primitive type.
#[derive(Debug, Clone)]
pub struct LiteralSchema {
    pub field_type: FieldType,
    pub constraints: Vec<Constraint>,
}

/// Nested schema shape: structured field map or literal primitive.
#[derive(Debug, Clone)]
pub enum NestedSchema {
    Structured(StructuredSchema),
    Literal(LiteralSchema),
}

/// A named, versioned collection schema.
///
/// Immutable for the lifetime of its collection handle.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub fields: HashMap<String, Field>,
    pub indexes: Vec<Index>,
    /// Constraints evaluated against the whole document.
    pub constraints: Vec<Constraint>,
    pub nested: HashMap<String, NestedSchema>,
}

impl Schema {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Resolve a nested-schema id.
    pub fn nested(&self, id: &str) -> Option<&NestedSchema> {
        self.nested.get(id)
    }

    /// The primary index, when one is declared.
    pub fn primary_index(&self) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|i| i.index_type == IndexType::Primary)
    }

    /// Field names in a stable order, for deterministic iteration.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check structural invariants.
    ///
    /// # Errors
    /// `SCHEMA_INVALID` when more than one primary index is declared, a
    /// primary index names an unknown field, an enum field has no values,
    /// or a nested-schema reference does not resolve.
    pub fn check(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::SchemaInvalid {
            name: self.name.clone(),
            reason,
        };

        let primaries: Vec<&Index> = self
            .indexes
            .iter()
            .filter(|i| i.index_type == IndexType::Primary)
            .collect();
        if primaries.len() > 1 {
            return Err(invalid(format!(
                "{} primary indexes declared, at most one allowed",
                primaries.len()
            )));
        }
        if let Some(primary) = primaries.first() {
            for field in &primary.fields {
                if self.field(field).is_none() {
                    return Err(invalid(format!(
                        "primary index '{}' names unknown field '{}'",
                        primary.name, field
                    )));
                }
            }
        }

        for name in self.field_names() {
            let field = &self.fields[name];
            if field.field_type == FieldType::Enum
                && field.values.as_ref().map_or(true, |v| v.is_empty())
            {
                return Err(invalid(format!(
                    "enum field '{}' declares no values",
                    name
                )));
            }
            if let Some(schema_ref) = &field.schema {
                for id in schema_ref.ids() {
                    if self.nested(id).is_none() {
                        return Err(invalid(format!(
                            "field '{}' references unknown nested schema '{}'",
                            name, id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
