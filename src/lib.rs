//! docstore library - Schema-driven document persistence over SQL
//!
//! Provides collection schemas, document validation, a backend-agnostic
//! query DSL with SQL pushdown plus an in-memory evaluation pass, and a
//! SQLite reference storage backend.

pub mod backend;
pub mod error;
pub mod events;
pub mod executor;
pub mod processor;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sql;
pub mod store;
pub mod types;
pub mod validator;

// Re-export commonly used items
pub use backend::{CancelToken, StorageBackend};
pub use backend::sqlite::SqliteBackend;
pub use error::EngineError;
pub use events::{Event, EventBus, EventPhase, Subscription};
pub use executor::{Executor, QueryData, QueryOutput};
pub use query::{Condition, Operator, Query, QueryFilter};
pub use query::builder::{QueryBuilder, where_field};
pub use registry::FunctionRegistry;
pub use schema::{Field, FieldType, Index, IndexType, Schema};
pub use schema::descriptor::SchemaDescriptor;
pub use store::{Collection, Store};
pub use types::{Document, LogicalOperator, SortOrder};
pub use validator::{Issue, IssueCode, Severity, Validator};
