//! INSERT, UPDATE, and DELETE generation.
//!
//! Parameter preparation is driven by the declared field type, not the
//! runtime value type, so identical inputs bind identically regardless of
//! their source representation. Complex values are JSON-encoded to text;
//! booleans become 0/1.

use serde_json::Value;

use crate::error::EngineError;
use crate::query::QueryFilter;
use crate::schema::{Field, FieldType};
use crate::sql::expr::quote_ident;
use crate::sql::filter::filter_clause;
use crate::sql::{SqlGenerator, SqlValue, Statement};
use crate::types::{Document, numeric};

impl SqlGenerator<'_> {
    /// Multi-row insert returning the persisted rows.
    ///
    /// The column list is the union of keys across all records in
    /// first-seen order; records missing a column bind null.
    pub fn insert(&self, records: &[Document]) -> Result<Statement, EngineError> {
        let mut columns: Vec<&str> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        let mut params = Vec::with_capacity(records.len() * columns.len());
        for record in records {
            for column in &columns {
                match record.get(*column) {
                    None => params.push(SqlValue::Null),
                    Some(value) => {
                        params.push(prepare_value(self.schema().field(column), value)?)
                    }
                }
            }
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = vec![row_placeholders; records.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} RETURNING *;",
            self.table(),
            column_list,
            values
        );
        Ok(Statement::new(sql, params))
    }

    /// Update matching rows with the given field values.
    pub fn update(
        &self,
        updates: &Document,
        filter: Option<&QueryFilter>,
    ) -> Result<Statement, EngineError> {
        let mut params = Vec::with_capacity(updates.len());
        let mut assignments = Vec::with_capacity(updates.len());
        for (column, value) in updates {
            params.push(prepare_value(self.schema().field(column), value)?);
            assignments.push(format!("{} = ?", quote_ident(column)));
        }

        let mut sql = format!("UPDATE {} SET {}", self.table(), assignments.join(", "));
        if let Some(filter) = filter {
            let clause = filter_clause(self.schema(), filter, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql.push(';');
        Ok(Statement::new(sql, params))
    }

    /// Delete matching rows.
    ///
    /// # Errors
    /// `UNSAFE_DELETE_REFUSED` when no filter is given and `unsafe_delete`
    /// is false; no SQL is produced in that case.
    pub fn delete(
        &self,
        filter: Option<&QueryFilter>,
        unsafe_delete: bool,
    ) -> Result<Statement, EngineError> {
        let mut params = Vec::new();
        let sql = match filter {
            None if !unsafe_delete => return Err(EngineError::UnsafeDeleteRefused),
            None => format!("DELETE FROM {};", self.table()),
            Some(filter) => {
                let clause = filter_clause(self.schema(), filter, &mut params)?;
                format!("DELETE FROM {} WHERE {};", self.table(), clause)
            }
        };
        Ok(Statement::new(sql, params))
    }
}

/// Bind one value according to its declared field type. Unknown columns
/// fall back to the runtime value type.
pub(crate) fn prepare_value(
    field: Option<&Field>,
    value: &Value,
) -> Result<SqlValue, EngineError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let Some(field) = field else {
        return Ok(runtime_value(value));
    };

    let fail = || EngineError::CoercionFailed {
        field: field.name.clone(),
        value: value.to_string(),
    };

    match field.field_type {
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(SqlValue::Integer(1)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(SqlValue::Integer(0)),
            Value::Number(n) => Ok(SqlValue::Integer(i64::from(n.as_f64() != Some(0.0)))),
            _ => Err(fail()),
        },
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() => Ok(SqlValue::Integer(n.as_i64().unwrap_or(0))),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| SqlValue::Integer(f as i64))
                .ok_or_else(fail),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
        FieldType::Number | FieldType::Decimal => {
            numeric(value).map(SqlValue::Real).ok_or_else(fail)
        }
        FieldType::String | FieldType::Enum => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Ok(SqlValue::Text(other.to_string())),
        },
        FieldType::Array
        | FieldType::Set
        | FieldType::Object
        | FieldType::Record
        | FieldType::Union => serde_json::to_string(value)
            .map(SqlValue::Text)
            .map_err(|_| fail()),
    }
}

fn runtime_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) if n.is_i64() => SqlValue::Integer(n.as_i64().unwrap_or(0)),
        Value::Number(n) => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
