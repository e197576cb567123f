//! Query execution orchestration.
//!
//! The executor is the one place that knows what the backend can push
//! down. A read is planned in three steps: ask the processor which fields
//! the in-memory pass needs, hand the SQL generator a filter stripped of
//! custom operators together with an include-only projection covering
//! those fields, then run the processor over the fetched rows with the
//! pushed-down standard operators marked as skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{CancelToken, StorageBackend};
use crate::error::EngineError;
use crate::processor::{Processor, fields_to_select};
use crate::query::validate::validate;
use crate::query::{Operator, Pagination, Projection, Query, QueryFilter};
use crate::registry::{ComputeFn, FunctionRegistry, PredicateFn};
use crate::schema::Schema;
use crate::types::Document;
use crate::validator::Validator;

/// Result rows: unwrapped to a single document when exactly one row
/// matched, a list otherwise. Callers must handle both shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryData {
    One(Document),
    Many(Vec<Document>),
}

impl QueryData {
    /// The rows regardless of shape.
    pub fn into_rows(self) -> Vec<Document> {
        match self {
            QueryData::One(document) => vec![document],
            QueryData::Many(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryData::One(_) => 1,
            QueryData::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shaped result of a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    pub data: QueryData,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Document>,
}

/// Runs reads and writes for one collection over a storage backend.
#[derive(Debug)]
pub struct Executor {
    backend: Arc<dyn StorageBackend>,
    schema: Arc<Schema>,
    registry: Arc<FunctionRegistry>,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        schema: Arc<Schema>,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Executor {
            backend,
            schema,
            registry,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Plan and run a read.
    pub fn query(&self, query: &Query, cancel: &CancelToken) -> Result<QueryOutput, EngineError> {
        let errors = validate(query);
        if !errors.is_empty() {
            return Err(EngineError::InvalidQuery { errors });
        }

        // String compute arguments double as field references; names whose
        // root the schema does not know cannot be projected and resolve in
        // memory instead.
        let mut required = fields_to_select(query);
        required.retain(|path| {
            let root = path.split('.').next().unwrap_or(path);
            self.schema.field(root).is_some()
        });
        let sql_filter = query.filter.as_ref().and_then(|f| f.strip_custom());
        let skipped: Vec<Operator> = sql_filter
            .as_ref()
            .map(|f| f.standard_operators())
            .unwrap_or_default();

        let sql_query = Query {
            filter: sql_filter,
            sort: query.sort.clone(),
            pagination: query.pagination.clone(),
            projection: if required.is_empty() {
                None
            } else {
                Some(Projection {
                    include: required,
                    exclude: Vec::new(),
                    computed: Vec::new(),
                })
            },
            joins: query.joins.clone(),
            aggregations: query.aggregations.clone(),
            hints: query.hints.clone(),
        };

        tracing::debug!(
            collection = %self.schema.name,
            skipped = skipped.len(),
            "planned read"
        );

        let rows = self.backend.select(&self.schema, &sql_query, cancel)?;
        cancel.check()?;

        let processor = Processor::new(self.registry.snapshot());
        let rows = processor.process(rows, query, &skipped)?;

        Ok(shape_output(rows, query.pagination.clone()))
    }

    /// Validate strictly and insert, returning the persisted rows.
    ///
    /// Any validation failure prevents the backend call.
    pub fn insert(
        &self,
        records: &[Document],
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError> {
        let validator = Validator::new(Arc::clone(&self.schema), Arc::clone(&self.registry));
        let mut issues = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let report = validator.validate(record, false);
            if !report.ok {
                for mut issue in report.issues {
                    if records.len() > 1 {
                        issue.path = if issue.path.is_empty() {
                            format!("[{}]", i)
                        } else {
                            format!("[{}].{}", i, issue.path)
                        };
                    }
                    issues.push(issue);
                }
            }
        }
        if !issues.is_empty() {
            return Err(EngineError::ValidationFailed {
                collection: self.schema.name.clone(),
                issues,
            });
        }

        self.backend.insert(&self.schema, records, cancel)
    }

    /// Update matching rows, returning the affected count.
    pub fn update(
        &self,
        updates: &Document,
        filter: Option<&QueryFilter>,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        self.backend.update(&self.schema, updates, filter, cancel)
    }

    /// Delete matching rows, returning the affected count.
    pub fn delete(
        &self,
        filter: Option<&QueryFilter>,
        unsafe_delete: bool,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        self.backend
            .delete(&self.schema, filter, unsafe_delete, cancel)
    }

    /// Evaluate a filter against a single document, skipping nothing.
    pub fn matches(
        &self,
        filter: &QueryFilter,
        document: &Document,
    ) -> Result<bool, EngineError> {
        Processor::new(self.registry.snapshot()).matches(filter, document)
    }

    pub fn register_predicate(&self, name: &str, predicate: PredicateFn) {
        self.registry.register_predicate(name, predicate);
    }

    pub fn register_compute(&self, name: &str, compute: ComputeFn) {
        self.registry.register_compute(name, compute);
    }

    pub fn unregister_predicate(&self, name: &str) -> bool {
        self.registry.unregister_predicate(name)
    }

    pub fn unregister_compute(&self, name: &str) -> bool {
        self.registry.unregister_compute(name)
    }
}

fn shape_output(mut rows: Vec<Document>, pagination: Option<Pagination>) -> QueryOutput {
    let count = rows.len();
    let data = if count == 1 {
        QueryData::One(rows.remove(0))
    } else {
        QueryData::Many(rows)
    };
    QueryOutput {
        data,
        count,
        pagination,
        aggregations: None,
    }
}
