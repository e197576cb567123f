//! In-memory query evaluation.
//!
//! Runs after the SQL pass: a filter pass over the fetched rows, a
//! compute pass producing projection values, then the final
//! include/exclude projection. Standard operators the SQL layer already
//! enforced are passed in as skipped and treated as satisfied; custom
//! operators resolve against the predicate registry snapshot.

pub mod fields;

use serde_json::Value;

use crate::error::EngineError;
use crate::query::{
    CaseBranch, ComputedField, Condition, Operator, Projection, Query, QueryFilter,
};
use crate::registry::{FunctionError, RegistrySnapshot};
use crate::types::{Document, numeric, resolve_path};

pub use fields::fields_to_select;

/// Evaluates filters, computed fields, and projection over fetched rows.
pub struct Processor {
    snapshot: RegistrySnapshot,
}

impl Processor {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Processor { snapshot }
    }

    /// Run the filter, compute, and projection passes in that order.
    ///
    /// Rows are processed in delivery order. `skipped` lists the standard
    /// operators the SQL pass already enforced; conditions using them are
    /// treated as satisfied.
    pub fn process(
        &self,
        rows: Vec<Document>,
        query: &Query,
        skipped: &[Operator],
    ) -> Result<Vec<Document>, EngineError> {
        let projection = query.projection.as_ref();
        let computed_names: Vec<String> = query
            .computed()
            .iter()
            .map(|c| c.output_name().to_string())
            .collect();

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(filter) = &query.filter {
                if !self.eval_filter(filter, &row, skipped)? {
                    continue;
                }
            }

            let mut row = row;
            for item in query.computed() {
                self.apply_computed(item, &mut row)?;
            }

            out.push(apply_projection(row, projection, &computed_names));
        }
        Ok(out)
    }

    /// Evaluate a filter tree against one document, skipping nothing.
    pub fn matches(
        &self,
        filter: &QueryFilter,
        document: &Document,
    ) -> Result<bool, EngineError> {
        self.eval_filter(filter, document, &[])
    }

    fn eval_filter(
        &self,
        filter: &QueryFilter,
        document: &Document,
        skipped: &[Operator],
    ) -> Result<bool, EngineError> {
        match filter {
            QueryFilter::Condition(condition) => {
                self.eval_condition(condition, document, skipped)
            }
            QueryFilter::Group {
                operator,
                conditions,
            } => {
                if conditions.is_empty() {
                    return Ok(true);
                }
                match operator {
                    crate::types::LogicalOperator::And => {
                        for child in conditions {
                            if !self.eval_filter(child, document, skipped)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    crate::types::LogicalOperator::Or => {
                        for child in conditions {
                            if self.eval_filter(child, document, skipped)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    other => {
                        let mut results = Vec::with_capacity(conditions.len());
                        for child in conditions {
                            results.push(self.eval_filter(child, document, skipped)?);
                        }
                        Ok(other.combine(&results))
                    }
                }
            }
        }
    }

    fn eval_condition(
        &self,
        condition: &Condition,
        document: &Document,
        skipped: &[Operator],
    ) -> Result<bool, EngineError> {
        if condition.operator.is_standard() {
            if skipped.contains(&condition.operator) {
                return Ok(true);
            }
            let actual = resolve_path(document, &condition.field);
            return eval_standard(condition, actual);
        }

        let name = condition.operator.name();
        let Some(predicate) = self.snapshot.predicate(name) else {
            return Err(EngineError::UnregisteredPredicate {
                name: name.to_string(),
            });
        };
        let subject = Value::Object(document.clone());
        predicate(&subject, &condition.field, &condition.value).map_err(|e| {
            EngineError::FunctionFailed {
                name: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    fn apply_computed(
        &self,
        item: &ComputedField,
        row: &mut Document,
    ) -> Result<(), EngineError> {
        match item {
            ComputedField::Expression {
                function,
                arguments,
                ..
            } => {
                let Some(compute) = self.snapshot.compute(function) else {
                    return Err(EngineError::UnregisteredCompute {
                        name: function.clone(),
                    });
                };
                let value =
                    compute(row, arguments).map_err(|e: FunctionError| {
                        EngineError::FunctionFailed {
                            name: function.clone(),
                            message: e.to_string(),
                        }
                    })?;
                row.insert(item.output_name().to_string(), value);
            }
            ComputedField::Case {
                branches,
                otherwise,
                ..
            } => {
                let name = item.output_name().to_string();
                if let Some(value) = self.eval_case(branches, otherwise.as_ref(), row)? {
                    row.insert(name, value);
                }
            }
        }
        Ok(())
    }

    /// Walk case branches in order; first matching `when` wins. With no
    /// match and no `else`, the field is omitted.
    fn eval_case(
        &self,
        branches: &[CaseBranch],
        otherwise: Option<&Value>,
        row: &Document,
    ) -> Result<Option<Value>, EngineError> {
        for branch in branches {
            if self.eval_filter(&branch.when, row, &[])? {
                return Ok(Some(branch.then.clone()));
            }
        }
        Ok(otherwise.cloned())
    }
}

/// Standard operator semantics, mirroring what the SQL layer emits so the
/// fallback path agrees with pushdown.
fn eval_standard(condition: &Condition, actual: Option<&Value>) -> Result<bool, EngineError> {
    let expected = &condition.value;
    let present = actual.filter(|v| !v.is_null());

    match condition.operator {
        Operator::Eq => Ok(present.is_some_and(|a| a == expected)),
        Operator::Neq => Ok(present.is_some_and(|a| a != expected)),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let Some(actual) = present else {
                return Ok(false);
            };
            let left = numeric(actual).ok_or_else(|| coercion_failed(condition, actual))?;
            let right = numeric(expected).ok_or_else(|| coercion_failed(condition, expected))?;
            Ok(match condition.operator {
                Operator::Lt => left < right,
                Operator::Lte => left <= right,
                Operator::Gt => left > right,
                Operator::Gte => left >= right,
                _ => unreachable!("filtered to ordering operators above"),
            })
        }
        Operator::In => {
            let members = expected.as_array().map(Vec::as_slice).unwrap_or(&[]);
            Ok(present.is_some_and(|a| members.contains(a)))
        }
        Operator::Nin => {
            let members = expected.as_array().map(Vec::as_slice).unwrap_or(&[]);
            if members.is_empty() {
                return Ok(true);
            }
            Ok(present.is_some_and(|a| !members.contains(a)))
        }
        Operator::Contains => Ok(string_pair(present, expected)
            .is_some_and(|(a, e)| a.contains(&e))),
        Operator::Ncontains => Ok(string_pair(present, expected)
            .is_some_and(|(a, e)| !a.contains(&e))),
        Operator::Startswith => Ok(string_pair(present, expected)
            .is_some_and(|(a, e)| a.starts_with(&e))),
        Operator::Endswith => Ok(string_pair(present, expected)
            .is_some_and(|(a, e)| a.ends_with(&e))),
        Operator::Exists => Ok(present.is_some()),
        Operator::Nexists => Ok(present.is_none()),
        Operator::Custom(_) => unreachable!("custom operators resolve via the registry"),
    }
}

fn coercion_failed(condition: &Condition, value: &Value) -> EngineError {
    EngineError::CoercionFailed {
        field: condition.field.clone(),
        value: value.to_string(),
    }
}

/// Both sides as text for the substring operators.
fn string_pair(actual: Option<&Value>, expected: &Value) -> Option<(String, String)> {
    let actual = actual?.as_str()?.to_string();
    let expected = match expected {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((actual, expected))
}

fn apply_projection(
    row: Document,
    projection: Option<&Projection>,
    computed_names: &[String],
) -> Document {
    let Some(projection) = projection else {
        return row;
    };

    if !projection.include.is_empty() {
        row.into_iter()
            .filter(|(key, _)| {
                projection.include.iter().any(|f| f == key)
                    || (computed_names.iter().any(|c| c == key)
                        && !projection.exclude.iter().any(|e| e == key))
            })
            .collect()
    } else if !projection.exclude.is_empty() {
        row.into_iter()
            .filter(|(key, _)| !projection.exclude.iter().any(|e| e == key))
            .collect()
    } else if !computed_names.is_empty() {
        row.into_iter()
            .filter(|(key, _)| computed_names.iter().any(|c| c == key))
            .collect()
    } else {
        row
    }
}
