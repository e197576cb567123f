//! Registries for user-supplied predicate and compute functions.
//!
//! Predicates back both constraint rules in the validator and custom
//! filter operators in the processor. Computes produce projection values.
//! The two maps are kept separate so each call site stays typed; both sit
//! behind many-reader/one-writer locks, and a query takes a snapshot so
//! concurrent registration cannot change semantics mid-query.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;

use crate::types::{Document, numeric};

/// Failure reported by a predicate or compute function.
#[derive(Error, Debug)]
pub enum FunctionError {
    /// The subject or the parameters had a shape the function cannot use.
    #[error("{0}")]
    InvalidType(String),
    /// The function ran and failed.
    #[error("{0}")]
    Failed(String),
}

/// Predicate over a subject value.
///
/// The validator invokes predicates with the field value as subject; the
/// processor invokes them with the whole row as subject. The second
/// argument names the field under test, the third carries opaque
/// parameters.
pub type PredicateFn =
    Arc<dyn Fn(&Value, &str, &Value) -> Result<bool, FunctionError> + Send + Sync>;

/// Computes a projection value from a row and an argument list.
pub type ComputeFn =
    Arc<dyn Fn(&Document, &[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// Immutable view of both maps, taken once per query.
#[derive(Clone)]
pub struct RegistrySnapshot {
    predicates: HashMap<String, PredicateFn>,
    computes: HashMap<String, ComputeFn>,
}

impl RegistrySnapshot {
    pub fn predicate(&self, name: &str) -> Option<&PredicateFn> {
        self.predicates.get(name)
    }

    pub fn compute(&self, name: &str) -> Option<&ComputeFn> {
        self.computes.get(name)
    }
}

/// Shared registry of named extension functions.
pub struct FunctionRegistry {
    predicates: RwLock<HashMap<String, PredicateFn>>,
    computes: RwLock<HashMap<String, ComputeFn>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").finish_non_exhaustive()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        FunctionRegistry {
            predicates: RwLock::new(HashMap::new()),
            computes: RwLock::new(HashMap::new()),
        }
    }

    /// A registry preloaded with the built-in constraint predicates:
    /// `pattern`, `min_length`, `max_length`, and `range`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_predicate("pattern", Arc::new(pattern_predicate));
        registry.register_predicate("min_length", Arc::new(min_length_predicate));
        registry.register_predicate("max_length", Arc::new(max_length_predicate));
        registry.register_predicate("range", Arc::new(range_predicate));
        registry
    }

    /// Register or replace a predicate.
    pub fn register_predicate(&self, name: &str, predicate: PredicateFn) {
        let mut map = self
            .predicates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(name.to_string(), predicate);
    }

    /// Register or replace a compute function.
    pub fn register_compute(&self, name: &str, compute: ComputeFn) {
        let mut map = self
            .computes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(name.to_string(), compute);
    }

    pub fn unregister_predicate(&self, name: &str) -> bool {
        let mut map = self
            .predicates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(name).is_some()
    }

    pub fn unregister_compute(&self, name: &str) -> bool {
        let mut map = self
            .computes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(name).is_some()
    }

    /// Clone-out view of both maps for the duration of one query.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let predicates = self
            .predicates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let computes = self
            .computes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        RegistrySnapshot {
            predicates,
            computes,
        }
    }
}

// Built-in predicates

fn subject_str<'a>(subject: &'a Value, field: &str) -> Result<&'a str, FunctionError> {
    subject.as_str().ok_or_else(|| {
        FunctionError::InvalidType(format!("'{}' is not a string", field))
    })
}

fn pattern_predicate(subject: &Value, field: &str, params: &Value) -> Result<bool, FunctionError> {
    let pattern = params
        .as_str()
        .or_else(|| params.get("pattern").and_then(Value::as_str))
        .ok_or_else(|| {
            FunctionError::InvalidType("pattern predicate requires a regex parameter".to_string())
        })?;
    let regex = regex::Regex::new(pattern)
        .map_err(|e| FunctionError::Failed(format!("invalid pattern for '{}': {}", field, e)))?;
    Ok(regex.is_match(subject_str(subject, field)?))
}

fn length_of(subject: &Value, field: &str) -> Result<usize, FunctionError> {
    match subject {
        Value::String(s) => Ok(s.chars().count()),
        Value::Array(items) => Ok(items.len()),
        _ => Err(FunctionError::InvalidType(format!(
            "'{}' has no length",
            field
        ))),
    }
}

fn min_length_predicate(
    subject: &Value,
    field: &str,
    params: &Value,
) -> Result<bool, FunctionError> {
    let min = params.as_u64().ok_or_else(|| {
        FunctionError::InvalidType("min_length requires an integer parameter".to_string())
    })?;
    Ok(length_of(subject, field)? as u64 >= min)
}

fn max_length_predicate(
    subject: &Value,
    field: &str,
    params: &Value,
) -> Result<bool, FunctionError> {
    let max = params.as_u64().ok_or_else(|| {
        FunctionError::InvalidType("max_length requires an integer parameter".to_string())
    })?;
    Ok(length_of(subject, field)? as u64 <= max)
}

fn range_predicate(subject: &Value, field: &str, params: &Value) -> Result<bool, FunctionError> {
    let n = numeric(subject).ok_or_else(|| {
        FunctionError::InvalidType(format!("'{}' is not numeric", field))
    })?;
    let min = params.get("min").and_then(numeric);
    let max = params.get("max").and_then(numeric);
    if min.is_none() && max.is_none() {
        return Err(FunctionError::InvalidType(
            "range requires a min or max parameter".to_string(),
        ));
    }
    Ok(min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_snapshot_predicate() {
        let registry = FunctionRegistry::new();
        registry.register_predicate(
            "always",
            Arc::new(|_subject, _field, _params| Ok(true)),
        );
        let snapshot = registry.snapshot();
        let predicate = snapshot.predicate("always").unwrap();
        assert!(predicate(&json!(1), "x", &Value::Null).unwrap());
        assert!(snapshot.predicate("never").is_none());
    }

    #[test]
    fn test_snapshot_isolated_from_later_registration() {
        let registry = FunctionRegistry::new();
        let snapshot = registry.snapshot();
        registry.register_predicate("late", Arc::new(|_, _, _| Ok(true)));
        assert!(snapshot.predicate("late").is_none());
        assert!(registry.snapshot().predicate("late").is_some());
    }

    #[test]
    fn test_unregister() {
        let registry = FunctionRegistry::new();
        registry.register_compute("f", Arc::new(|_, _| Ok(Value::Null)));
        assert!(registry.unregister_compute("f"));
        assert!(!registry.unregister_compute("f"));
        assert!(registry.snapshot().compute("f").is_none());
    }

    #[test]
    fn test_pattern_builtin() {
        let registry = FunctionRegistry::with_builtins();
        let snapshot = registry.snapshot();
        let pattern = snapshot.predicate("pattern").unwrap();
        assert!(pattern(&json!("abc-123"), "sku", &json!(r"^[a-z]+-\d+$")).unwrap());
        assert!(!pattern(&json!("nope"), "sku", &json!(r"^\d+$")).unwrap());
        assert!(pattern(&json!(42), "sku", &json!("a")).is_err());
    }

    #[test]
    fn test_pattern_accepts_object_params() {
        let registry = FunctionRegistry::with_builtins();
        let snapshot = registry.snapshot();
        let pattern = snapshot.predicate("pattern").unwrap();
        assert!(pattern(&json!("xy"), "f", &json!({"pattern": "^xy$"})).unwrap());
    }

    #[test]
    fn test_length_builtins() {
        let registry = FunctionRegistry::with_builtins();
        let snapshot = registry.snapshot();
        let min = snapshot.predicate("min_length").unwrap();
        let max = snapshot.predicate("max_length").unwrap();
        assert!(min(&json!("abcd"), "f", &json!(3)).unwrap());
        assert!(!min(&json!("ab"), "f", &json!(3)).unwrap());
        assert!(max(&json!([1, 2]), "f", &json!(2)).unwrap());
        assert!(!max(&json!([1, 2, 3]), "f", &json!(2)).unwrap());
        assert!(min(&json!(true), "f", &json!(1)).is_err());
    }

    #[test]
    fn test_range_builtin() {
        let registry = FunctionRegistry::with_builtins();
        let snapshot = registry.snapshot();
        let range = snapshot.predicate("range").unwrap();
        assert!(range(&json!(5), "f", &json!({"min": 1, "max": 10})).unwrap());
        assert!(!range(&json!(11), "f", &json!({"max": 10})).unwrap());
        assert!(range(&json!("7"), "f", &json!({"min": 7})).unwrap());
        assert!(range(&json!(5), "f", &json!({})).is_err());
    }
}
