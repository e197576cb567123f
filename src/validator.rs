//! Document-to-schema validation.
//!
//! `Validator::validate` walks a document against its schema and reports
//! every problem as a coded issue with a dotted path. Validation is pure:
//! no I/O, no mutation of the document, safe to run concurrently over
//! disjoint documents.
//!
//! String values are coerced before type checks: case-insensitive
//! `"null"` becomes null, `"true"`/`"false"` become booleans, and decimal
//! strings become numbers when the field expects a numeric type.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::registry::{FunctionError, FunctionRegistry, RegistrySnapshot};
use crate::schema::{Constraint, Field, FieldType, NestedSchema, Schema, StructuredSchema};
use crate::types::{Document, resolve_path, type_name};

/// How severe an issue is. Only `Error` issues fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-readable issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    RequiredFieldMissing,
    UnexpectedField,
    NullValue,
    TypeMismatch,
    EnumViolation,
    SetDuplicate,
    ConstraintViolation,
    ConstraintGroupViolation,
    MissingPredicate,
    InvalidPredicateType,
    UnionNoMatch,
    MissingUnionSchema,
    NestedSchemaNotFound,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            IssueCode::UnexpectedField => "UNEXPECTED_FIELD",
            IssueCode::NullValue => "NULL_VALUE",
            IssueCode::TypeMismatch => "TYPE_MISMATCH",
            IssueCode::EnumViolation => "ENUM_VIOLATION",
            IssueCode::SetDuplicate => "SET_DUPLICATE",
            IssueCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            IssueCode::ConstraintGroupViolation => "CONSTRAINT_GROUP_VIOLATION",
            IssueCode::MissingPredicate => "MISSING_PREDICATE",
            IssueCode::InvalidPredicateType => "INVALID_PREDICATE_TYPE",
            IssueCode::UnionNoMatch => "UNION_NO_MATCH",
            IssueCode::MissingUnionSchema => "MISSING_UNION_SCHEMA",
            IssueCode::NestedSchemaNotFound => "NESTED_SCHEMA_NOT_FOUND",
        }
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    /// Dotted path from the document root; array indices use brackets.
    pub path: String,
    pub severity: Severity,
}

impl Issue {
    fn error(code: IssueCode, path: &str, message: String) -> Self {
        Issue {
            code,
            message,
            path: path.to_string(),
            severity: Severity::Error,
        }
    }

    fn warning(code: IssueCode, path: &str, message: String) -> Self {
        Issue {
            code,
            message,
            path: path.to_string(),
            severity: Severity::Warning,
        }
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone)]
pub struct Report {
    pub ok: bool,
    pub issues: Vec<Issue>,
}

/// Validates documents against one schema, using the shared predicate
/// registry for constraint rules.
#[derive(Debug)]
pub struct Validator {
    schema: Arc<Schema>,
    registry: Arc<FunctionRegistry>,
}

impl Validator {
    pub fn new(schema: Arc<Schema>, registry: Arc<FunctionRegistry>) -> Self {
        Validator { schema, registry }
    }

    /// Validate one document.
    ///
    /// In loose mode, `REQUIRED_FIELD_MISSING` issues are suppressed;
    /// everything else still reports.
    pub fn validate(&self, document: &Document, loose: bool) -> Report {
        let mut run = Run {
            schema: &self.schema,
            snapshot: self.registry.snapshot(),
            issues: Vec::new(),
        };

        run.validate_fields(&self.schema.fields, document, "");

        let doc_value = Value::Object(document.clone());
        for constraint in &self.schema.constraints {
            run.apply_constraint(constraint, &doc_value, "", document, "");
        }

        let issues: Vec<Issue> = if loose {
            run.issues
                .into_iter()
                .filter(|i| i.code != IssueCode::RequiredFieldMissing)
                .collect()
        } else {
            run.issues
        };
        let ok = !issues.iter().any(|i| i.severity == Severity::Error);
        Report { ok, issues }
    }
}

struct Run<'a> {
    schema: &'a Schema,
    snapshot: RegistrySnapshot,
    issues: Vec<Issue>,
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

impl<'a> Run<'a> {
    fn validate_fields(
        &mut self,
        fields: &std::collections::HashMap<String, Field>,
        document: &Document,
        prefix: &str,
    ) {
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort_unstable();

        for name in names {
            let field = &fields[name];
            let path = join_path(prefix, name);
            match document.get(name.as_str()) {
                None => {
                    if field.required {
                        self.issues.push(Issue::error(
                            IssueCode::RequiredFieldMissing,
                            &path,
                            format!("required field '{}' is missing", name),
                        ));
                    }
                }
                Some(Value::Null) => {
                    if field.required {
                        self.issues.push(Issue::error(
                            IssueCode::NullValue,
                            &path,
                            format!("required field '{}' is null", name),
                        ));
                    }
                }
                Some(value) => self.validate_value(field, value, &path),
            }
        }

        for key in document.keys() {
            if !fields.contains_key(key) {
                let path = join_path(prefix, key);
                self.issues.push(Issue::warning(
                    IssueCode::UnexpectedField,
                    &path,
                    format!("field '{}' is not declared in the schema", key),
                ));
            }
        }
    }

    fn validate_value(&mut self, field: &Field, raw: &Value, path: &str) {
        let coerced = coerce(raw, field.field_type);
        let value: &Value = coerced.as_ref();

        if value.is_null() {
            if field.required {
                self.issues.push(Issue::error(
                    IssueCode::NullValue,
                    path,
                    format!("required field '{}' is null", field.name),
                ));
            }
            return;
        }

        match field.field_type {
            FieldType::String => self.check_type(value.is_string(), field, value, path),
            FieldType::Integer => self.check_type(
                matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
                field,
                value,
                path,
            ),
            FieldType::Number | FieldType::Decimal => {
                self.check_type(value.is_number(), field, value, path)
            }
            FieldType::Boolean => self.check_type(value.is_boolean(), field, value, path),
            FieldType::Enum => {
                let members = field.values.as_deref().unwrap_or(&[]);
                if !members.iter().any(|m| m == value) {
                    self.issues.push(Issue::error(
                        IssueCode::EnumViolation,
                        path,
                        format!(
                            "value is not one of the {} declared members of '{}'",
                            members.len(),
                            field.name
                        ),
                    ));
                }
            }
            FieldType::Array => {
                if let Value::Array(items) = value {
                    self.validate_items(field, items, path);
                } else {
                    self.type_mismatch(field, value, path);
                }
            }
            FieldType::Set => {
                if let Value::Array(items) = value {
                    self.validate_items(field, items, path);
                    for (i, item) in items.iter().enumerate() {
                        if items[..i].contains(item) {
                            self.issues.push(Issue::error(
                                IssueCode::SetDuplicate,
                                &format!("{}[{}]", path, i),
                                format!("duplicate value in set '{}'", field.name),
                            ));
                        }
                    }
                } else {
                    self.type_mismatch(field, value, path);
                }
            }
            FieldType::Object => {
                if !value.is_object() {
                    self.type_mismatch(field, value, path);
                    return;
                }
                if let Some(schema_ref) = &field.schema {
                    let ids = schema_ref.ids();
                    if ids.len() == 1 {
                        self.validate_against_nested(ids[0], value, path);
                    } else {
                        self.validate_union(field, value, path);
                    }
                }
            }
            FieldType::Record => {
                if !value.is_object() {
                    self.type_mismatch(field, value, path);
                }
            }
            FieldType::Union => self.validate_union(field, value, path),
        }

        let doc_holder;
        let doc: &Document = match value {
            Value::Object(map) => map,
            _ => {
                doc_holder = Document::new();
                &doc_holder
            }
        };
        for constraint in &field.constraints {
            self.apply_constraint(constraint, value, &field.name, doc, path);
        }
    }

    fn check_type(&mut self, ok: bool, field: &Field, value: &Value, path: &str) {
        if !ok {
            self.type_mismatch(field, value, path);
        }
    }

    fn type_mismatch(&mut self, field: &Field, value: &Value, path: &str) {
        self.issues.push(Issue::error(
            IssueCode::TypeMismatch,
            path,
            format!(
                "'{}' expects {}, got {}",
                field.name,
                field.field_type.as_str(),
                type_name(value)
            ),
        ));
    }

    fn validate_items(&mut self, field: &Field, items: &[Value], path: &str) {
        let Some(items_type) = field.items_type else {
            return;
        };
        let mut element = Field::new(&field.name, items_type);
        element.values = field.values.clone();
        element.schema = field.schema.clone();
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, i);
            self.validate_value(&element, item, &item_path);
        }
    }

    fn validate_against_nested(&mut self, id: &str, value: &Value, path: &str) {
        let schema = self.schema;
        let Some(nested) = schema.nested(id) else {
            self.issues.push(Issue::error(
                IssueCode::NestedSchemaNotFound,
                path,
                format!("nested schema '{}' is not defined", id),
            ));
            return;
        };
        self.validate_nested(nested, value, path);
    }

    fn validate_nested(&mut self, nested: &NestedSchema, value: &Value, path: &str) {
        match nested {
            NestedSchema::Literal(literal) => {
                let mut synthetic = Field::new(path, literal.field_type);
                synthetic.constraints = literal.constraints.clone();
                self.validate_value(&synthetic, value, path);
            }
            NestedSchema::Structured(structured) => {
                let Value::Object(object) = value else {
                    self.issues.push(Issue::error(
                        IssueCode::TypeMismatch,
                        path,
                        format!("expected object, got {}", type_name(value)),
                    ));
                    return;
                };
                match Self::active_group(structured, object) {
                    Some(fields) => {
                        self.validate_fields(fields, object, path);
                    }
                    None => {
                        self.issues.push(Issue::error(
                            IssueCode::UnionNoMatch,
                            path,
                            "no schema variant matches the discriminator".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Pick the field group whose `when` clause matches, or the single
    /// unguarded group.
    fn active_group<'b>(
        structured: &'b StructuredSchema,
        object: &Document,
    ) -> Option<&'b std::collections::HashMap<String, Field>> {
        if !structured.is_partitioned() {
            return structured.groups.first().map(|g| &g.fields);
        }
        structured
            .groups
            .iter()
            .find(|group| match &group.when {
                Some(when) => object.get(&when.field) == Some(&when.value),
                None => true,
            })
            .map(|g| &g.fields)
    }

    fn validate_union(&mut self, field: &Field, value: &Value, path: &str) {
        let ids: Vec<String> = match &field.schema {
            Some(r) => r.ids().iter().map(|s| s.to_string()).collect(),
            None => Vec::new(),
        };
        if ids.is_empty() {
            self.issues.push(Issue::error(
                IssueCode::MissingUnionSchema,
                path,
                format!("union field '{}' declares no schemas", field.name),
            ));
            return;
        }

        let schema = self.schema;
        let mut unresolved = Vec::new();
        for id in &ids {
            let Some(nested) = schema.nested(id) else {
                unresolved.push(id.clone());
                continue;
            };
            let mark = self.issues.len();
            self.validate_nested(nested, value, path);
            if self.issues.len() == mark {
                return;
            }
            self.issues.truncate(mark);
        }

        for id in unresolved {
            self.issues.push(Issue::error(
                IssueCode::MissingUnionSchema,
                path,
                format!("union schema '{}' is not defined", id),
            ));
        }
        self.issues.push(Issue::error(
            IssueCode::UnionNoMatch,
            path,
            format!("no union alternative accepts the value of '{}'", field.name),
        ));
    }

    /// Evaluate a top-level constraint and report a violation issue when
    /// it fails.
    fn apply_constraint(
        &mut self,
        constraint: &Constraint,
        subject: &Value,
        field_name: &str,
        document: &Document,
        path: &str,
    ) {
        let before = self.issues.len();
        let passed = self.constraint_result(constraint, subject, field_name, document);
        if passed {
            return;
        }
        match constraint {
            Constraint::Rule {
                name,
                error_message,
                ..
            } => {
                if self.issues.len() == before {
                    let message = error_message
                        .clone()
                        .unwrap_or_else(|| format!("constraint '{}' failed", name));
                    self.issues
                        .push(Issue::error(IssueCode::ConstraintViolation, path, message));
                }
            }
            Constraint::Group { name, operator, .. } => {
                self.issues.push(Issue::error(
                    IssueCode::ConstraintGroupViolation,
                    path,
                    format!("constraint group '{}' ({}) failed", name, operator.as_str()),
                ));
            }
        }
    }

    /// Boolean outcome of a constraint. Structural problems (missing or
    /// mistyped predicates) are reported as issues even inside groups.
    fn constraint_result(
        &mut self,
        constraint: &Constraint,
        subject: &Value,
        field_name: &str,
        document: &Document,
    ) -> bool {
        match constraint {
            Constraint::Rule {
                predicate,
                field,
                parameters,
                ..
            } => {
                let resolved;
                let (subject, target): (&Value, &str) = match field {
                    Some(f) => {
                        resolved = resolve_path(document, f).cloned().unwrap_or(Value::Null);
                        (&resolved, f.as_str())
                    }
                    None => (subject, field_name),
                };
                let Some(function) = self.snapshot.predicate(predicate).cloned() else {
                    self.issues.push(Issue::error(
                        IssueCode::MissingPredicate,
                        target,
                        format!("predicate '{}' is not registered", predicate),
                    ));
                    return false;
                };
                match function(subject, target, parameters) {
                    Ok(result) => result,
                    Err(FunctionError::InvalidType(message)) => {
                        self.issues.push(Issue::error(
                            IssueCode::InvalidPredicateType,
                            target,
                            message,
                        ));
                        false
                    }
                    Err(FunctionError::Failed(_)) => false,
                }
            }
            Constraint::Group {
                operator, rules, ..
            } => {
                let results: Vec<bool> = rules
                    .iter()
                    .map(|rule| self.constraint_result(rule, subject, field_name, document))
                    .collect();
                if results.is_empty() {
                    return true;
                }
                operator.combine(&results)
            }
        }
    }
}

/// Best-effort coercion of string values toward the declared type.
fn coerce<'a>(value: &'a Value, target: FieldType) -> Cow<'a, Value> {
    let Value::String(s) = value else {
        return Cow::Borrowed(value);
    };
    let trimmed = s.trim();

    if trimmed.eq_ignore_ascii_case("null") {
        return Cow::Owned(Value::Null);
    }

    match target {
        FieldType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                return Cow::Owned(Value::Bool(true));
            }
            if trimmed.eq_ignore_ascii_case("false") {
                return Cow::Owned(Value::Bool(false));
            }
        }
        FieldType::Integer => {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Cow::Owned(Value::Number(Number::from(n)));
            }
        }
        FieldType::Number | FieldType::Decimal => {
            if let Ok(f) = trimmed.parse::<f64>() {
                if let Some(n) = Number::from_f64(f) {
                    return Cow::Owned(Value::Number(n));
                }
            }
        }
        _ => {}
    }
    Cow::Borrowed(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRef;
    use serde_json::json;

    fn validator_for(text: &str) -> Validator {
        let schema = Schema::from_json(text).unwrap();
        Validator::new(Arc::new(schema), Arc::new(FunctionRegistry::with_builtins()))
    }

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn users_validator() -> Validator {
        validator_for(
            &json!({
                "name": "u",
                "version": "1",
                "fields": {
                    "id": {"type": "integer", "required": true},
                    "name": {"type": "string", "required": true}
                }
            })
            .to_string(),
        )
    }

    #[test]
    fn test_strict_reports_missing_required() {
        let report = users_validator().validate(&doc(json!({"id": 1})), false);
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::RequiredFieldMissing);
        assert_eq!(report.issues[0].path, "name");
    }

    #[test]
    fn test_loose_suppresses_missing_required() {
        let report = users_validator().validate(&doc(json!({"id": 1})), true);
        assert!(report.ok);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_loose_keeps_other_issues() {
        let report = users_validator().validate(&doc(json!({"id": "abc"})), true);
        assert!(!report.ok);
        assert_eq!(report.issues[0].code, IssueCode::TypeMismatch);
        assert_eq!(report.issues[0].path, "id");
    }

    #[test]
    fn test_strict_ok_implies_loose_ok() {
        let validator = users_validator();
        let document = doc(json!({"id": 1, "name": "ada"}));
        let strict = validator.validate(&document, false);
        let loose = validator.validate(&document, true);
        assert!(strict.ok);
        assert!(loose.ok);
    }

    #[test]
    fn test_unexpected_field_is_warning() {
        let report =
            users_validator().validate(&doc(json!({"id": 1, "name": "a", "extra": 9})), false);
        assert!(report.ok);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::UnexpectedField);
        assert_eq!(report.issues[0].severity, Severity::Warning);
        assert_eq!(report.issues[0].path, "extra");
    }

    #[test]
    fn test_null_for_required_field() {
        let report = users_validator().validate(&doc(json!({"id": null, "name": "a"})), false);
        assert!(!report.ok);
        assert_eq!(report.issues[0].code, IssueCode::NullValue);
    }

    #[test]
    fn test_null_for_optional_field_passes() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"note": {"type": "string"}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"note": null})), false);
        assert!(report.ok);
    }

    #[test]
    fn test_string_coercion_to_bool_and_numbers() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {
                    "active": {"type": "boolean"},
                    "count": {"type": "integer"},
                    "ratio": {"type": "number"}
                }
            })
            .to_string(),
        );
        let report = validator.validate(
            &doc(json!({"active": "TRUE", "count": "42", "ratio": "2.5"})),
            false,
        );
        assert!(report.ok, "issues: {:?}", report.issues);
    }

    #[test]
    fn test_string_null_coercion() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"note": {"type": "string", "required": true}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"note": "NULL"})), false);
        assert!(!report.ok);
        assert_eq!(report.issues[0].code, IssueCode::NullValue);
    }

    #[test]
    fn test_failed_coercion_reports_type_mismatch() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"count": {"type": "integer"}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"count": "forty"})), false);
        assert_eq!(report.issues[0].code, IssueCode::TypeMismatch);
    }

    #[test]
    fn test_float_is_not_integer() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"count": {"type": "integer"}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"count": 1.5})), false);
        assert_eq!(report.issues[0].code, IssueCode::TypeMismatch);
    }

    #[test]
    fn test_enum_deep_equality() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"level": {"type": "enum", "values": [1, 2, "high"]}}
            })
            .to_string(),
        );
        assert!(validator.validate(&doc(json!({"level": 2})), false).ok);
        assert!(validator.validate(&doc(json!({"level": "high"})), false).ok);
        let report = validator.validate(&doc(json!({"level": "2"})), false);
        assert_eq!(report.issues[0].code, IssueCode::EnumViolation);
    }

    #[test]
    fn test_set_duplicates_with_bracket_path() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"tags": {"type": "set", "itemsType": "string"}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"tags": ["a", "b", "a"]})), false);
        assert!(!report.ok);
        assert_eq!(report.issues[0].code, IssueCode::SetDuplicate);
        assert_eq!(report.issues[0].path, "tags[2]");
    }

    #[test]
    fn test_array_item_type_checked() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"nums": {"type": "array", "itemsType": "integer"}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"nums": [1, "x", 3]})), false);
        assert_eq!(report.issues[0].code, IssueCode::TypeMismatch);
        assert_eq!(report.issues[0].path, "nums[1]");
    }

    #[test]
    fn test_object_delegates_to_nested_schema() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"meta": {"type": "object", "schema": "meta_schema"}},
                "nestedSchemas": {
                    "meta_schema": {"fields": {
                        "weight_kg": {"type": "number", "required": true}
                    }}
                }
            })
            .to_string(),
        );
        assert!(
            validator
                .validate(&doc(json!({"meta": {"weight_kg": 1.5}})), false)
                .ok
        );
        let report = validator.validate(&doc(json!({"meta": {}})), false);
        assert_eq!(report.issues[0].code, IssueCode::RequiredFieldMissing);
        assert_eq!(report.issues[0].path, "meta.weight_kg");
    }

    #[test]
    fn test_union_first_match_wins() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"shape": {"type": "union", "schema": ["circle", "rect"]}},
                "nestedSchemas": {
                    "circle": {"fields": {"radius": {"type": "number", "required": true}}},
                    "rect": {"fields": {
                        "w": {"type": "number", "required": true},
                        "h": {"type": "number", "required": true}
                    }}
                }
            })
            .to_string(),
        );
        assert!(
            validator
                .validate(&doc(json!({"shape": {"radius": 2.0}})), false)
                .ok
        );
        assert!(
            validator
                .validate(&doc(json!({"shape": {"w": 1.0, "h": 2.0}})), false)
                .ok
        );
        let report = validator.validate(&doc(json!({"shape": {"sides": 3}})), false);
        assert!(!report.ok);
        assert_eq!(
            report.issues.last().unwrap().code,
            IssueCode::UnionNoMatch
        );
    }

    #[test]
    fn test_union_without_schemas() {
        let schema = Schema {
            name: "t".to_string(),
            version: "1".to_string(),
            description: None,
            fields: [(
                "x".to_string(),
                Field::new("x", FieldType::Union),
            )]
            .into_iter()
            .collect(),
            indexes: vec![],
            constraints: vec![],
            nested: Default::default(),
        };
        let validator = Validator::new(Arc::new(schema), Arc::new(FunctionRegistry::new()));
        let report = validator.validate(&doc(json!({"x": {"a": 1}})), false);
        assert_eq!(report.issues[0].code, IssueCode::MissingUnionSchema);
    }

    #[test]
    fn test_nested_schema_not_found() {
        let mut field = Field::new("meta", FieldType::Object);
        field.schema = Some(SchemaRef::One("gone".to_string()));
        let schema = Schema {
            name: "t".to_string(),
            version: "1".to_string(),
            description: None,
            fields: [("meta".to_string(), field)].into_iter().collect(),
            indexes: vec![],
            constraints: vec![],
            nested: Default::default(),
        };
        let validator = Validator::new(Arc::new(schema), Arc::new(FunctionRegistry::new()));
        let report = validator.validate(&doc(json!({"meta": {}})), false);
        assert_eq!(report.issues[0].code, IssueCode::NestedSchemaNotFound);
    }

    #[test]
    fn test_literal_nested_schema_with_constraint() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"label": {"type": "object", "schema": "short"}},
                "nestedSchemas": {
                    "short": {"type": "string", "constraints": [
                        {"name": "len", "predicate": "max_length", "parameters": 3}
                    ]}
                }
            })
            .to_string(),
        );
        assert!(validator.validate(&doc(json!({"label": "abc"})), false).ok);
        let report = validator.validate(&doc(json!({"label": "abcdef"})), false);
        assert_eq!(report.issues[0].code, IssueCode::ConstraintViolation);
    }

    #[test]
    fn test_partitioned_nested_schema_discriminates() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"payload": {"type": "object", "schema": "payload"}},
                "nestedSchemas": {
                    "payload": {"variants": [
                        {"when": {"field": "kind", "value": "click"},
                         "fields": {
                            "kind": {"type": "string"},
                            "x": {"type": "integer", "required": true}
                         }},
                        {"when": {"field": "kind", "value": "key"},
                         "fields": {
                            "kind": {"type": "string"},
                            "code": {"type": "string", "required": true}
                         }}
                    ]}
                }
            })
            .to_string(),
        );
        assert!(
            validator
                .validate(&doc(json!({"payload": {"kind": "click", "x": 3}})), false)
                .ok
        );
        let report = validator.validate(
            &doc(json!({"payload": {"kind": "click", "code": "KeyA"}})),
            false,
        );
        assert!(!report.ok);
        let report = validator.validate(&doc(json!({"payload": {"kind": "drag"}})), false);
        assert_eq!(report.issues[0].code, IssueCode::UnionNoMatch);
    }

    #[test]
    fn test_field_constraint_with_builtin() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"sku": {"type": "string", "constraints": [
                    {"name": "format", "predicate": "pattern",
                     "parameters": "^[A-Z]{3}-\\d+$",
                     "errorMessage": "sku must look like ABC-123"}
                ]}}
            })
            .to_string(),
        );
        assert!(validator.validate(&doc(json!({"sku": "ABC-42"})), false).ok);
        let report = validator.validate(&doc(json!({"sku": "nope"})), false);
        assert_eq!(report.issues[0].code, IssueCode::ConstraintViolation);
        assert_eq!(report.issues[0].message, "sku must look like ABC-123");
    }

    #[test]
    fn test_missing_predicate_reported() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"x": {"type": "integer", "constraints": [
                    {"name": "c", "predicate": "no_such", "parameters": null}
                ]}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"x": 1})), false);
        assert_eq!(report.issues[0].code, IssueCode::MissingPredicate);
    }

    #[test]
    fn test_invalid_predicate_type_reported() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"x": {"type": "integer", "constraints": [
                    {"name": "c", "predicate": "pattern", "parameters": "^a$"}
                ]}}
            })
            .to_string(),
        );
        let report = validator.validate(&doc(json!({"x": 1})), false);
        assert_eq!(report.issues[0].code, IssueCode::InvalidPredicateType);
    }

    #[test]
    fn test_schema_level_constraint_group() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {
                    "low": {"type": "integer"},
                    "high": {"type": "integer"}
                },
                "constraints": [{
                    "name": "bounds",
                    "operator": "and",
                    "rules": [
                        {"name": "low_ok", "predicate": "range", "field": "low",
                         "parameters": {"min": 0}},
                        {"name": "high_ok", "predicate": "range", "field": "high",
                         "parameters": {"max": 100}}
                    ]
                }]
            })
            .to_string(),
        );
        assert!(
            validator
                .validate(&doc(json!({"low": 1, "high": 50})), false)
                .ok
        );
        let report = validator.validate(&doc(json!({"low": -1, "high": 50})), false);
        assert_eq!(
            report.issues[0].code,
            IssueCode::ConstraintGroupViolation
        );
    }

    #[test]
    fn test_or_group_passes_with_one_true() {
        let validator = validator_for(
            &json!({
                "name": "t", "version": "1",
                "fields": {"n": {"type": "integer"}},
                "constraints": [{
                    "name": "either",
                    "operator": "or",
                    "rules": [
                        {"name": "small", "predicate": "range", "field": "n",
                         "parameters": {"max": 10}},
                        {"name": "large", "predicate": "range", "field": "n",
                         "parameters": {"min": 100}}
                    ]
                }]
            })
            .to_string(),
        );
        assert!(validator.validate(&doc(json!({"n": 5})), false).ok);
        assert!(validator.validate(&doc(json!({"n": 500})), false).ok);
        assert!(!validator.validate(&doc(json!({"n": 50})), false).ok);
    }
}
