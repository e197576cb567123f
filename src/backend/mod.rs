//! Storage backend abstraction.
//!
//! Backends execute parameterized statements for one collection at a
//! time, create tables and indexes, and provide transaction handles. The
//! engine core only ever talks to `dyn StorageBackend`; the reference
//! SQLite implementation lives in `sqlite`.

pub mod sqlite;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::EngineError;
use crate::query::{Query, QueryFilter};
use crate::schema::{Field, FieldType, Index, Schema};
use crate::types::Document;

/// Cooperative cancellation flag shared between a caller and an
/// in-flight operation. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error out when the token has been cancelled.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Executes statements for collections described by schemas.
///
/// Rows returned to the core are documents with per-field normalization
/// applied: numerics take the declared integer or float representation,
/// booleans decode from their storage form, JSON-typed columns decode
/// from text. Unknown columns pass through unchanged.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Run a read and return decoded rows.
    fn select(
        &self,
        schema: &Schema,
        query: &Query,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError>;

    /// Insert records and return their persisted forms.
    fn insert(
        &self,
        schema: &Schema,
        records: &[Document],
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError>;

    /// Update matching rows, returning the affected count.
    fn update(
        &self,
        schema: &Schema,
        updates: &Document,
        filter: Option<&QueryFilter>,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError>;

    /// Delete matching rows, returning the affected count.
    ///
    /// A nil filter is refused unless `unsafe_delete` is set.
    fn delete(
        &self,
        schema: &Schema,
        filter: Option<&QueryFilter>,
        unsafe_delete: bool,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError>;

    fn create_collection(&self, schema: &Schema) -> Result<(), EngineError>;

    fn create_index(&self, collection: &str, index: &Index) -> Result<(), EngineError>;

    fn drop_collection(&self, name: &str) -> Result<(), EngineError>;

    fn collection_exists(&self, name: &str) -> Result<bool, EngineError>;

    /// Column type the backend would use for a field.
    fn column_type_for(&self, field_type: FieldType, field: &Field) -> String;

    /// Open a transaction and return a handle scoped to it.
    ///
    /// # Errors
    /// `NESTED_TRANSACTION_REFUSED` when called on a handle that is
    /// already transactional.
    fn begin_transaction(&self) -> Result<Box<dyn StorageBackend>, EngineError>;

    /// Commit the transaction this handle represents.
    ///
    /// # Errors
    /// `NOT_IN_TRANSACTION` on a non-transactional handle.
    fn commit(&self) -> Result<(), EngineError>;

    /// Roll back the transaction this handle represents.
    ///
    /// # Errors
    /// `NOT_IN_TRANSACTION` on a non-transactional handle.
    fn rollback(&self) -> Result<(), EngineError>;

    fn in_transaction(&self) -> bool;
}
