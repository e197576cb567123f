//! Reference storage backend over SQLite.
//!
//! File-backed and single-node. Statement execution serializes behind a
//! connection mutex; the database file itself serializes writes, reads
//! may overlap at the SQLite level. A transactional handle shares the
//! connection and brackets its work with BEGIN/COMMIT/ROLLBACK.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Number, Value};

use crate::backend::{CancelToken, StorageBackend};
use crate::error::EngineError;
use crate::query::{Query, QueryFilter};
use crate::schema::{Field, FieldType, Index, Schema};
use crate::sql::{SqlGenerator, SqlValue, Statement, column_type};
use crate::types::Document;

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// SQLite-backed storage.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    transactional: bool,
}

impl SqliteBackend {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path).map_err(|e| EngineError::backend("open", e))?;
        Self::configure(conn)
    }

    /// Open a private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn =
            Connection::open_in_memory().map_err(|e| EngineError::backend("open", e))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, EngineError> {
        // The journal_mode pragma returns a row; query_row is the form
        // SQLite accepts for it.
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| EngineError::backend("open", e))?;
        tracing::debug!(journal_mode = %mode, "opened sqlite database");
        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
            transactional: false,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn execute(&self, operation: &str, statement: &Statement) -> Result<u64, EngineError> {
        let conn = self.lock();
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), %operation, "executing");
        conn.execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map(|n| n as u64)
            .map_err(|e| EngineError::backend(operation, e))
    }

    fn execute_sql(&self, operation: &str, sql: &str) -> Result<(), EngineError> {
        let conn = self.lock();
        tracing::debug!(%sql, %operation, "executing");
        conn.execute(sql, [])
            .map(|_| ())
            .map_err(|e| EngineError::backend(operation, e))
    }

    fn query_documents(
        &self,
        operation: &str,
        schema: &Schema,
        statement: &Statement,
    ) -> Result<Vec<Document>, EngineError> {
        let conn = self.lock();
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), %operation, "querying");
        let mut stmt = conn
            .prepare(&statement.sql)
            .map_err(|e| EngineError::backend(operation, e))?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|n| n.to_string()).collect();

        let mut rows = stmt
            .query(params_from_iter(statement.params.iter()))
            .map_err(|e| EngineError::backend(operation, e))?;

        let mut documents = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| EngineError::backend(operation, e))?
        {
            let mut document = Document::new();
            for (i, name) in column_names.iter().enumerate() {
                let raw = row
                    .get_ref(i)
                    .map_err(|e| EngineError::backend(operation, e))?;
                document.insert(name.clone(), normalize_column(schema, name, raw));
            }
            documents.push(document);
        }
        Ok(documents)
    }
}

impl StorageBackend for SqliteBackend {
    fn select(
        &self,
        schema: &Schema,
        query: &Query,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError> {
        cancel.check()?;
        let statement = SqlGenerator::new(schema).select(query)?;
        self.query_documents("select", schema, &statement)
    }

    fn insert(
        &self,
        schema: &Schema,
        records: &[Document],
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError> {
        cancel.check()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let statement = SqlGenerator::new(schema).insert(records)?;
        self.query_documents("insert", schema, &statement)
    }

    fn update(
        &self,
        schema: &Schema,
        updates: &Document,
        filter: Option<&QueryFilter>,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        cancel.check()?;
        if updates.is_empty() {
            return Ok(0);
        }
        let statement = SqlGenerator::new(schema).update(updates, filter)?;
        self.execute("update", &statement)
    }

    fn delete(
        &self,
        schema: &Schema,
        filter: Option<&QueryFilter>,
        unsafe_delete: bool,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        cancel.check()?;
        let statement = SqlGenerator::new(schema).delete(filter, unsafe_delete)?;
        self.execute("delete", &statement)
    }

    fn create_collection(&self, schema: &Schema) -> Result<(), EngineError> {
        let sql = SqlGenerator::new(schema).create_table()?;
        self.execute_sql("create_collection", &sql)
    }

    fn create_index(&self, collection: &str, index: &Index) -> Result<(), EngineError> {
        match SqlGenerator::create_index(collection, index) {
            Some(sql) => self.execute_sql("create_index", &sql),
            None => Ok(()),
        }
    }

    fn drop_collection(&self, name: &str) -> Result<(), EngineError> {
        self.execute_sql("drop_collection", &SqlGenerator::drop_table(name))
    }

    fn collection_exists(&self, name: &str) -> Result<bool, EngineError> {
        let statement = SqlGenerator::exists_check(name);
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&statement.sql)
            .map_err(|e| EngineError::backend("collection_exists", e))?;
        stmt.exists(params_from_iter(statement.params.iter()))
            .map_err(|e| EngineError::backend("collection_exists", e))
    }

    fn column_type_for(&self, field_type: FieldType, _field: &Field) -> String {
        column_type(field_type).to_string()
    }

    fn begin_transaction(&self) -> Result<Box<dyn StorageBackend>, EngineError> {
        if self.transactional {
            return Err(EngineError::NestedTransactionRefused);
        }
        self.execute_sql("begin_transaction", "BEGIN IMMEDIATE;")?;
        Ok(Box::new(SqliteBackend {
            conn: Arc::clone(&self.conn),
            transactional: true,
        }))
    }

    fn commit(&self) -> Result<(), EngineError> {
        if !self.transactional {
            return Err(EngineError::NotInTransaction);
        }
        self.execute_sql("commit", "COMMIT;")
    }

    fn rollback(&self) -> Result<(), EngineError> {
        if !self.transactional {
            return Err(EngineError::NotInTransaction);
        }
        self.execute_sql("rollback", "ROLLBACK;")
    }

    fn in_transaction(&self) -> bool {
        self.transactional
    }
}

/// Decode one column value into its document form, driven by the
/// declared field type when the column is known.
fn normalize_column(schema: &Schema, name: &str, raw: ValueRef<'_>) -> Value {
    let field = match schema.field(name) {
        Some(field) => field,
        None => {
            if !name.contains('.') {
                tracing::warn!(column = %name, collection = %schema.name, "unknown column passed through");
            }
            return raw_value(raw);
        }
    };

    if matches!(raw, ValueRef::Null) {
        return Value::Null;
    }

    match field.field_type {
        FieldType::Boolean => match raw {
            ValueRef::Integer(i) => Value::Bool(i != 0),
            other => raw_value(other),
        },
        FieldType::Integer => match raw {
            ValueRef::Integer(i) => Value::Number(Number::from(i)),
            ValueRef::Real(f) => Value::Number(Number::from(f as i64)),
            ValueRef::Text(_) => raw_value(raw),
            other => raw_value(other),
        },
        FieldType::Number | FieldType::Decimal => match raw {
            ValueRef::Integer(i) => float_value(i as f64),
            ValueRef::Real(f) => float_value(f),
            other => raw_value(other),
        },
        FieldType::Array
        | FieldType::Set
        | FieldType::Object
        | FieldType::Record
        | FieldType::Union => match raw {
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(column = %name, error = %e, "stored JSON failed to decode");
                        Value::String(text.into_owned())
                    }
                }
            }
            other => raw_value(other),
        },
        FieldType::Enum => match raw {
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                match serde_json::from_str::<Value>(&text) {
                    Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
                    _ => Value::String(text.into_owned()),
                }
            }
            other => raw_value(other),
        },
        FieldType::String => raw_value(raw),
    }
}

fn raw_value(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(Number::from(i)),
        ValueRef::Real(f) => float_value(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            tracing::warn!("blob column has no document representation");
            Value::Null
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
