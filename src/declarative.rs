use crate::catalog::schema::{
    CREATED_AT, CREATED_BY, ColumnDef, ColumnDefault, TableSchema, UPDATED_AT, UPDATED_BY,
    is_attribution_column,
};
use crate::catalog::types::{ColumnType, Value};
use crate::error::ProvError;

/// A version-id column bound to a family through an active-version default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionColumnSpec {
    pub column: String,
    pub family_code: String,
    pub nullable: bool,
}

/// Declarative enrollment of a domain table: columns, attribution, audit
/// enrollment and the optional domain map registration, applied in one
/// transaction by `ProvDb::enroll_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table_name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub attributed: bool,
    pub audited: bool,
    pub version_columns: Vec<VersionColumnSpec>,
    /// When set, the table is registered in the domain map under the family
    /// of its first version column, with this note.
    pub map_note: Option<String>,
}

impl TableSpec {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            if_not_exists: false,
            columns: Vec::new(),
            primary_key: Vec::new(),
            attributed: true,
            audited: false,
            version_columns: Vec::new(),
            map_note: None,
        }
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    pub fn column(mut self, name: impl Into<String>, col_type: ColumnType, nullable: bool) -> Self {
        self.columns.push(ColumnDef::new(name, col_type, nullable));
        self
    }

    pub fn column_with_default(
        mut self,
        name: impl Into<String>,
        col_type: ColumnType,
        default: Value,
    ) -> Self {
        self.columns.push(
            ColumnDef::new(name, col_type, false).with_default(ColumnDefault::Literal(default)),
        );
        self
    }

    pub fn primary_key(mut self, primary_key: &[&str]) -> Self {
        self.primary_key = primary_key.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn attributed(mut self, attributed: bool) -> Self {
        self.attributed = attributed;
        self
    }

    /// Enrolls the table in the field-level audit log.
    pub fn audited(mut self, audited: bool) -> Self {
        self.audited = audited;
        self
    }

    /// Adds a NOT NULL version-id column defaulting to the family's active
    /// version at insert time.
    pub fn versioned_by(mut self, column: impl Into<String>, family_code: impl Into<String>) -> Self {
        self.version_columns.push(VersionColumnSpec {
            column: column.into(),
            family_code: family_code.into(),
            nullable: false,
        });
        self
    }

    pub fn register_in_map(mut self, note: impl Into<String>) -> Self {
        self.map_note = Some(note.into());
        self
    }

    /// Family and column the map registration should use, if any.
    pub fn map_target(&self) -> Option<(&VersionColumnSpec, &str)> {
        let note = self.map_note.as_deref()?;
        self.version_columns.first().map(|v| (v, note))
    }

    pub fn to_schema(&self, now_micros: i64) -> Result<TableSchema, ProvError> {
        if self.map_note.is_some() && self.version_columns.is_empty() {
            return Err(ProvError::Validation(format!(
                "table '{}' asks for domain map registration but has no version column",
                self.table_name
            )));
        }
        let mut columns = self.columns.clone();
        for version in &self.version_columns {
            columns.push(
                ColumnDef::new(&version.column, ColumnType::VersionId, version.nullable)
                    .with_default(ColumnDefault::ActiveVersion {
                        family: version.family_code.clone(),
                    }),
            );
        }
        if self.attributed {
            if let Some(reserved) = columns.iter().find(|c| is_attribution_column(&c.name)) {
                return Err(ProvError::Validation(format!(
                    "column '{}' is reserved for attribution",
                    reserved.name
                )));
            }
            columns.push(ColumnDef::new(CREATED_AT, ColumnType::Timestamp, false));
            columns.push(ColumnDef::new(CREATED_BY, ColumnType::ActorRef, false));
            columns.push(ColumnDef::new(UPDATED_AT, ColumnType::Timestamp, false));
            columns.push(ColumnDef::new(UPDATED_BY, ColumnType::ActorRef, false));
        }
        Ok(TableSchema {
            table_name: self.table_name.clone(),
            columns,
            primary_key: self.primary_key.clone(),
            attributed: self.attributed,
            audited: self.audited,
            created_at_micros: now_micros,
        })
    }
}
