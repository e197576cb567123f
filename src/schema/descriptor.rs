//! Declarative schema descriptions.
//!
//! A schema arrives as a structured JSON document. The descriptor structs
//! here mirror that format one-to-one; `Schema::from_descriptor` converts
//! a parsed description into the checked internal model. The raw
//! descriptor is what the store persists into the `_schemas` collection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::query::QueryFilter;
use crate::schema::definition::{
    Constraint, Field, FieldGroup, FieldType, Index, IndexType, LiteralSchema, NestedSchema,
    Schema, SchemaRef, StructuredSchema, WhenClause,
};
use crate::types::{LogicalOperator, SortOrder};

/// Top-level schema description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: HashMap<String, FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub nested_schemas: HashMap<String, NestedSchemaDescriptor>,
}

/// Field descriptor, keyed by field name in the containing map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Defaults to the map key when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRefDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintDescriptor>,
}

/// One nested-schema id, or a list of ids for union fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRefDescriptor {
    One(String),
    Many(Vec<String>),
}

/// Rule or group constraint, discriminated by shape at the text boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintDescriptor {
    Rule {
        name: String,
        predicate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default)]
        parameters: Value,
        #[serde(default, rename = "errorMessage", skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    Group {
        name: String,
        operator: LogicalOperator,
        rules: Vec<ConstraintDescriptor>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(rename = "type")]
    pub index_type: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<QueryFilter>,
}

/// Nested schema description: literal primitive, plain field map, or a
/// partitioned list of guarded field groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedSchemaDescriptor {
    Literal {
        #[serde(rename = "type")]
        field_type: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        constraints: Vec<ConstraintDescriptor>,
    },
    Plain {
        fields: HashMap<String, FieldDescriptor>,
    },
    Partitioned {
        variants: Vec<FieldGroupDescriptor>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldGroupDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenDescriptor>,
    pub fields: HashMap<String, FieldDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenDescriptor {
    pub field: String,
    pub value: Value,
}

impl SchemaDescriptor {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::SchemaInvalid {
            name: "<unparsed>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse a description from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        serde_json::from_value(value).map_err(|e| EngineError::SchemaInvalid {
            name: "<unparsed>".to_string(),
            reason: e.to_string(),
        })
    }

    /// The raw descriptor as a JSON value, as stored in `_schemas`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Schema {
    /// Build and check a schema from its descriptor.
    ///
    /// # Errors
    /// `SCHEMA_INVALID` on unknown type names or violated invariants.
    pub fn from_descriptor(desc: &SchemaDescriptor) -> Result<Schema, EngineError> {
        let invalid = |reason: String| EngineError::SchemaInvalid {
            name: desc.name.clone(),
            reason,
        };

        let mut fields = HashMap::new();
        for (key, fd) in &desc.fields {
            let field = convert_field(key, fd).map_err(&invalid)?;
            fields.insert(key.clone(), field);
        }

        let mut indexes = Vec::with_capacity(desc.indexes.len());
        for id in &desc.indexes {
            let index_type = IndexType::parse(&id.index_type)
                .ok_or_else(|| invalid(format!("unknown index type '{}'", id.index_type)))?;
            indexes.push(Index {
                name: id.name.clone(),
                fields: id.fields.clone(),
                index_type,
                unique: id.unique,
                order: id.order,
                partial: id.partial.clone(),
            });
        }

        let constraints = desc
            .constraints
            .iter()
            .map(convert_constraint)
            .collect::<Vec<_>>();

        let mut nested = HashMap::new();
        for (id, nd) in &desc.nested_schemas {
            nested.insert(id.clone(), convert_nested(id, nd).map_err(&invalid)?);
        }

        let schema = Schema {
            name: desc.name.clone(),
            version: desc.version.clone(),
            description: desc.description.clone(),
            fields,
            indexes,
            constraints,
            nested,
        };
        schema.check()?;
        Ok(schema)
    }

    /// Parse JSON text straight into a checked schema.
    pub fn from_json(text: &str) -> Result<Schema, EngineError> {
        Schema::from_descriptor(&SchemaDescriptor::from_json(text)?)
    }
}

fn convert_field(key: &str, fd: &FieldDescriptor) -> Result<Field, String> {
    let field_type = FieldType::parse(&fd.field_type)
        .ok_or_else(|| format!("field '{}' has unknown type '{}'", key, fd.field_type))?;
    let items_type = match &fd.items_type {
        Some(name) => Some(
            FieldType::parse(name)
                .ok_or_else(|| format!("field '{}' has unknown items type '{}'", key, name))?,
        ),
        None => None,
    };
    let schema = fd.schema.as_ref().map(|r| match r {
        SchemaRefDescriptor::One(id) => SchemaRef::One(id.clone()),
        SchemaRefDescriptor::Many(ids) => SchemaRef::Many(ids.clone()),
    });

    Ok(Field {
        name: fd.name.clone().unwrap_or_else(|| key.to_string()),
        field_type,
        required: fd.required,
        unique: fd.unique,
        default: fd.default.clone(),
        values: fd.values.clone(),
        items_type,
        schema,
        description: fd.description.clone(),
        constraints: fd.constraints.iter().map(convert_constraint).collect(),
    })
}

fn convert_constraint(cd: &ConstraintDescriptor) -> Constraint {
    match cd {
        ConstraintDescriptor::Rule {
            name,
            predicate,
            field,
            parameters,
            error_message,
        } => Constraint::Rule {
            name: name.clone(),
            predicate: predicate.clone(),
            field: field.clone(),
            parameters: parameters.clone(),
            error_message: error_message.clone(),
        },
        ConstraintDescriptor::Group {
            name,
            operator,
            rules,
        } => Constraint::Group {
            name: name.clone(),
            operator: *operator,
            rules: rules.iter().map(convert_constraint).collect(),
        },
    }
}

fn convert_nested(id: &str, nd: &NestedSchemaDescriptor) -> Result<NestedSchema, String> {
    match nd {
        NestedSchemaDescriptor::Literal {
            field_type,
            constraints,
        } => {
            let field_type = FieldType::parse(field_type).ok_or_else(|| {
                format!("nested schema '{}' has unknown type '{}'", id, field_type)
            })?;
            Ok(NestedSchema::Literal(LiteralSchema {
                field_type,
                constraints: constraints.iter().map(convert_constraint).collect(),
            }))
        }
        NestedSchemaDescriptor::Plain { fields } => {
            let fields = convert_field_map(fields)?;
            Ok(NestedSchema::Structured(StructuredSchema::plain(fields)))
        }
        NestedSchemaDescriptor::Partitioned { variants } => {
            let mut groups = Vec::with_capacity(variants.len());
            for variant in variants {
                groups.push(FieldGroup {
                    when: variant.when.as_ref().map(|w| WhenClause {
                        field: w.field.clone(),
                        value: w.value.clone(),
                    }),
                    fields: convert_field_map(&variant.fields)?,
                });
            }
            Ok(NestedSchema::Structured(StructuredSchema { groups }))
        }
    }
}

fn convert_field_map(
    fields: &HashMap<String, FieldDescriptor>,
) -> Result<HashMap<String, Field>, String> {
    let mut out = HashMap::new();
    for (key, fd) in fields {
        out.insert(key.clone(), convert_field(key, fd)?);
    }
    Ok(out)
}
