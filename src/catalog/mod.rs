pub mod schema;
pub mod types;

use crate::catalog::schema::{ColumnDef, TableSchema, is_attribution_column, validate_table_name};
use crate::error::{ProvError, ResourceType};
use im::HashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DdlOperation {
    CreateTable {
        schema: TableSchema,
        if_not_exists: bool,
    },
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    AddColumn {
        table_name: String,
        column: ColumnDef,
    },
}

impl DdlOperation {
    pub fn table_name(&self) -> &str {
        match self {
            DdlOperation::CreateTable { schema, .. } => &schema.table_name,
            DdlOperation::DropTable { table_name, .. } => table_name,
            DdlOperation::AddColumn { table_name, .. } => table_name,
        }
    }
}

/// Domain tables known to the instance. The system registries (actors,
/// families, versions, domain map, audit log) live outside the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub tables: HashMap<String, TableSchema>,
}

impl Catalog {
    pub fn table(&self, table_name: &str) -> Option<&TableSchema> {
        self.tables.get(table_name)
    }

    pub fn require_table(&self, table_name: &str) -> Result<&TableSchema, ProvError> {
        self.tables
            .get(table_name)
            .ok_or_else(|| ProvError::not_found(ResourceType::Table, table_name))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Applies one DDL operation. Returns `false` when an `if_not_exists` /
    /// `if_exists` guard turned the operation into a no-op.
    pub fn apply_ddl(&mut self, op: DdlOperation) -> Result<bool, ProvError> {
        match op {
            DdlOperation::CreateTable {
                schema,
                if_not_exists,
            } => {
                if self.tables.contains_key(&schema.table_name) {
                    if if_not_exists {
                        return Ok(false);
                    }
                    return Err(ProvError::already_exists(
                        ResourceType::Table,
                        &schema.table_name,
                    ));
                }
                validate_schema(&schema)?;
                self.tables.insert(schema.table_name.clone(), schema);
                Ok(true)
            }
            DdlOperation::DropTable {
                table_name,
                if_exists,
            } => {
                if self.tables.remove(&table_name).is_none() {
                    if if_exists {
                        return Ok(false);
                    }
                    return Err(ProvError::not_found(ResourceType::Table, table_name));
                }
                Ok(true)
            }
            DdlOperation::AddColumn { table_name, column } => {
                let schema = self
                    .tables
                    .get_mut(&table_name)
                    .ok_or_else(|| ProvError::not_found(ResourceType::Table, &table_name))?;
                if schema.has_column(&column.name) {
                    return Err(ProvError::Validation(format!(
                        "column '{}' already exists in table '{table_name}'",
                        column.name
                    )));
                }
                if !column.nullable && column.default.is_none() {
                    return Err(ProvError::Validation(format!(
                        "added column '{}' must be nullable or carry a default",
                        column.name
                    )));
                }
                if schema.attributed && is_attribution_column(&column.name) {
                    return Err(ProvError::Validation(format!(
                        "column '{}' is reserved for attribution",
                        column.name
                    )));
                }
                schema.columns.push(column);
                Ok(true)
            }
        }
    }
}

fn validate_schema(schema: &TableSchema) -> Result<(), ProvError> {
    validate_table_name(&schema.table_name).map_err(ProvError::Validation)?;
    if schema.columns.is_empty() {
        return Err(ProvError::Validation(format!(
            "table '{}' has no columns",
            schema.table_name
        )));
    }
    if schema.primary_key.is_empty() {
        return Err(ProvError::Validation(format!(
            "table '{}' has no primary key",
            schema.table_name
        )));
    }
    let mut seen = std::collections::BTreeSet::new();
    for column in &schema.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(ProvError::Validation(format!(
                "duplicate column '{}' in table '{}'",
                column.name, schema.table_name
            )));
        }
    }
    for pk in &schema.primary_key {
        let column = schema.column(pk).ok_or_else(|| ProvError::UnknownColumn {
            table: schema.table_name.clone(),
            column: pk.clone(),
        })?;
        if column.nullable {
            return Err(ProvError::Validation(format!(
                "primary key column '{pk}' in table '{}' must not be nullable",
                schema.table_name
            )));
        }
    }
    if schema.attributed {
        for name in schema::ATTRIBUTION_COLUMNS {
            if !schema.has_column(name) {
                return Err(ProvError::Validation(format!(
                    "attributed table '{}' is missing column '{name}'",
                    schema.table_name
                )));
            }
        }
    }
    Ok(())
}
