use crate::attribution::Attribution;
use crate::audit_log::{AuditLogEntry, AuditLogQuery};
use crate::catalog::types::{Row, Value};
use crate::error::ProvError;
use crate::identity::WriteContext;
use crate::storage::keyspace::PrimaryKey;
use crate::{Committed, ProvDb};

pub trait TryFromRow: Sized {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError>;
}

pub trait IntoRow {
    fn into_row(self) -> Row;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDecodeError {
    #[error("missing column '{column}'")]
    MissingColumn { column: String },
    #[error("column '{column}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{message}")]
    Custom { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Prov(#[from] ProvError),
    #[error(transparent)]
    Decode(#[from] RowDecodeError),
}

/// Typed access to one domain table, with every write attributed to the
/// bound context.
pub struct Repository<'a> {
    db: &'a ProvDb,
    ctx: &'a WriteContext,
    table_name: String,
}

impl<'a> Repository<'a> {
    pub fn new(db: &'a ProvDb, ctx: &'a WriteContext, table_name: impl Into<String>) -> Self {
        Self {
            db,
            ctx,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn ctx(&self) -> &WriteContext {
        self.ctx
    }

    pub fn insert<T: IntoRow>(&self, item: T) -> Result<Committed<PrimaryKey>, RepositoryError> {
        Ok(self.db.insert_row(self.ctx, &self.table_name, item.into_row())?)
    }

    pub fn get<T: TryFromRow>(&self, primary_key: &[Value]) -> Result<Option<T>, RepositoryError> {
        match self.db.get_row(&self.table_name, primary_key)? {
            Some(row) => Ok(Some(T::try_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Applies `changes` and decodes the stored row.
    pub fn update<T: TryFromRow>(
        &self,
        primary_key: &[Value],
        changes: Row,
    ) -> Result<Committed<T>, RepositoryError> {
        let committed = self
            .db
            .update_row(self.ctx, &self.table_name, primary_key, changes)?;
        Ok(Committed {
            value: T::try_from_row(committed.value)?,
            commit: committed.commit,
        })
    }

    pub fn delete(&self, primary_key: &[Value]) -> Result<Committed<Row>, RepositoryError> {
        Ok(self.db.delete_row(self.ctx, &self.table_name, primary_key)?)
    }

    pub fn list<T: TryFromRow>(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(decode_rows(self.db.scan_table(&self.table_name)?)?)
    }

    pub fn attribution(&self, primary_key: &[Value]) -> Result<Option<Attribution>, RepositoryError> {
        Ok(self
            .db
            .get_row(&self.table_name, primary_key)?
            .as_ref()
            .and_then(Attribution::from_row))
    }

    /// Audit entries for one row, oldest first. Survives deletion of the row.
    pub fn history(&self, primary_key: &[Value]) -> Vec<AuditLogEntry> {
        self.db
            .audit_entries(&AuditLogQuery::new().table(self.table_name.clone()))
            .into_iter()
            .filter(|entry| entry.primary_key.as_slice() == primary_key)
            .collect()
    }
}

pub fn decode_rows<T: TryFromRow>(rows: Vec<Row>) -> Result<Vec<T>, RowDecodeError> {
    rows.into_iter().map(T::try_from_row).collect()
}

fn column<'r>(row: &'r Row, column: &str) -> Result<&'r Value, RowDecodeError> {
    row.get(column).ok_or_else(|| RowDecodeError::MissingColumn {
        column: column.to_string(),
    })
}

fn mismatch(column: &str, expected: &'static str, actual: &Value) -> RowDecodeError {
    RowDecodeError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: actual.kind_name(),
    }
}

pub fn text_at<'r>(row: &'r Row, name: &str) -> Result<&'r str, RowDecodeError> {
    match column(row, name)? {
        Value::Text(v) => Ok(v.as_str()),
        other => Err(mismatch(name, "text", other)),
    }
}

/// `None` for a missing or NULL column.
pub fn opt_text_at<'r>(row: &'r Row, name: &str) -> Result<Option<&'r str>, RowDecodeError> {
    match row.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(v)) => Ok(Some(v.as_str())),
        Some(other) => Err(mismatch(name, "text", other)),
    }
}

pub fn i64_at(row: &Row, name: &str) -> Result<i64, RowDecodeError> {
    match column(row, name)? {
        Value::Integer(v) => Ok(*v),
        other => Err(mismatch(name, "integer", other)),
    }
}

pub fn f64_at(row: &Row, name: &str) -> Result<f64, RowDecodeError> {
    match column(row, name)? {
        Value::Float(v) => Ok(*v),
        Value::Integer(v) => Ok(*v as f64),
        other => Err(mismatch(name, "float", other)),
    }
}

pub fn bool_at(row: &Row, name: &str) -> Result<bool, RowDecodeError> {
    match column(row, name)? {
        Value::Boolean(v) => Ok(*v),
        other => Err(mismatch(name, "boolean", other)),
    }
}

pub fn timestamp_at(row: &Row, name: &str) -> Result<i64, RowDecodeError> {
    match column(row, name)? {
        Value::Timestamp(v) => Ok(*v),
        other => Err(mismatch(name, "timestamp", other)),
    }
}

/// Actor ids and version ids are stored as non-negative integers.
pub fn id_at(row: &Row, name: &str) -> Result<u64, RowDecodeError> {
    let value = column(row, name)?;
    value.as_u64().ok_or_else(|| mismatch(name, "id", value))
}

#[cfg(test)]
mod tests {
    use super::{RowDecodeError, id_at, opt_text_at, text_at, timestamp_at};
    use crate::catalog::types::{Row, Value};

    #[test]
    fn accessors_report_missing_and_mismatched_columns() {
        let row = Row::new()
            .with("name", "Main reservoir")
            .with("capacity", 12)
            .with("updated_at", Value::Timestamp(99))
            .with("note", Value::Null);
        assert_eq!(text_at(&row, "name").expect("name"), "Main reservoir");
        assert_eq!(opt_text_at(&row, "note").expect("note"), None);
        assert_eq!(timestamp_at(&row, "updated_at").expect("ts"), 99);
        assert_eq!(id_at(&row, "capacity").expect("id"), 12);
        assert_eq!(
            text_at(&row, "absent").expect_err("missing"),
            RowDecodeError::MissingColumn {
                column: "absent".into()
            }
        );
        assert!(matches!(
            text_at(&row, "capacity"),
            Err(RowDecodeError::TypeMismatch {
                expected: "text",
                actual: "integer",
                ..
            })
        ));
        assert!(id_at(&row.clone().with("capacity", -1), "capacity").is_err());
    }
}
