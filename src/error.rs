//! Error types surfaced by the persistence engine.
//!
//! Every fallible public API returns `EngineError`. Backend drivers wrap
//! their native errors into `EngineError::Backend` with the operation that
//! failed; validation failures carry the full issue list.

use thiserror::Error;

use crate::query::validate::DslError;
use crate::validator::Issue;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid schema '{name}': {reason}")]
    SchemaInvalid { name: String, reason: String },

    #[error("validation failed for '{collection}': {} issue(s)", issues.len())]
    ValidationFailed {
        collection: String,
        issues: Vec<Issue>,
    },

    #[error("invalid query: {}", DslError::join(errors))]
    InvalidQuery { errors: Vec<DslError> },

    #[error("operator '{operator}' is not supported by this backend")]
    UnsupportedOperator { operator: String },

    #[error("no predicate registered under '{name}'")]
    UnregisteredPredicate { name: String },

    #[error("no compute function registered under '{name}'")]
    UnregisteredCompute { name: String },

    #[error("field '{field}' is not defined in schema '{schema}'")]
    FieldNotInSchema { field: String, schema: String },

    #[error("cannot resolve '{path}': '{field}' is not an object-typed field")]
    NestedAccessOnScalar { path: String, field: String },

    #[error("refusing to delete without a filter; pass unsafe_delete to remove all rows")]
    UnsafeDeleteRefused,

    #[error("backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error("commit or rollback called outside a transaction")]
    NotInTransaction,

    #[error("a transaction is already open on this handle")]
    NestedTransactionRefused,

    #[error("cannot coerce value '{value}' of '{field}' to a number")]
    CoercionFailed { field: String, value: String },

    #[error("function '{name}' failed: {message}")]
    FunctionFailed { name: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Wrap a backend driver error with the operation that was running.
    pub fn backend(operation: &str, err: impl std::fmt::Display) -> Self {
        EngineError::Backend {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SchemaInvalid { .. } => "SCHEMA_INVALID",
            EngineError::ValidationFailed { .. } => "VALIDATION_FAILED",
            EngineError::InvalidQuery { .. } => "INVALID_QUERY",
            EngineError::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            EngineError::UnregisteredPredicate { .. } => "UNREGISTERED_PREDICATE",
            EngineError::UnregisteredCompute { .. } => "UNREGISTERED_COMPUTE",
            EngineError::FieldNotInSchema { .. } => "FIELD_NOT_IN_SCHEMA",
            EngineError::NestedAccessOnScalar { .. } => "NESTED_ACCESS_ON_SCALAR",
            EngineError::UnsafeDeleteRefused => "UNSAFE_DELETE_REFUSED",
            EngineError::Backend { .. } => "BACKEND_ERROR",
            EngineError::NotInTransaction => "NOT_IN_TRANSACTION",
            EngineError::NestedTransactionRefused => "NESTED_TRANSACTION_REFUSED",
            EngineError::CoercionFailed { .. } => "COERCION_FAILED",
            EngineError::FunctionFailed { .. } => "FUNCTION_FAILED",
            EngineError::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_wrapper_carries_operation() {
        let err = EngineError::backend("select", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "backend error during select: disk I/O error"
        );
        assert_eq!(err.code(), "BACKEND_ERROR");
    }

    #[test]
    fn test_unsafe_delete_code() {
        assert_eq!(EngineError::UnsafeDeleteRefused.code(), "UNSAFE_DELETE_REFUSED");
    }

    #[test]
    fn test_transaction_misuse_messages() {
        assert_eq!(
            EngineError::NotInTransaction.to_string(),
            "commit or rollback called outside a transaction"
        );
        assert_eq!(
            EngineError::NestedTransactionRefused.code(),
            "NESTED_TRANSACTION_REFUSED"
        );
    }
}
