use crate::catalog::types::{ColumnType, Value};
use serde::{Deserialize, Serialize};

pub const CREATED_AT: &str = "created_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_AT: &str = "updated_at";
pub const UPDATED_BY: &str = "updated_by";

/// The four columns maintained by the attribution stamp.
pub const ATTRIBUTION_COLUMNS: [&str; 4] = [CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY];

pub fn is_attribution_column(name: &str) -> bool {
    ATTRIBUTION_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnDefault {
    Literal(Value),
    /// Active version id of the named family, evaluated at insert time.
    ActiveVersion { family: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            col_type,
            nullable,
            default: None,
        }
    }

    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn active_version_family(&self) -> Option<&str> {
        match &self.default {
            Some(ColumnDefault::ActiveVersion { family }) => Some(family.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    /// Schema-qualified name, e.g. `network.reservoir`.
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub attributed: bool,
    pub audited: bool,
    pub created_at_micros: i64,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns that look like version-id columns: declared `VersionId`, or named
    /// with the configured suffix.
    pub fn version_shaped_columns<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a ColumnDef> + 'a {
        self.columns
            .iter()
            .filter(move |c| c.col_type == ColumnType::VersionId || c.name.ends_with(suffix))
    }
}

/// Splits `schema.table` into its parts. Unqualified names land in `public`.
pub fn split_qualified_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => ("public", name),
    }
}

pub fn validate_table_name(name: &str) -> Result<(), String> {
    let (schema, table) = split_qualified_name(name);
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    if !valid_part(schema) || !valid_part(table) || table.contains('.') {
        return Err(format!(
            "table name '{name}' must be [schema.]table using lower-case letters, digits and '_'"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ColumnDef, TableSchema, split_qualified_name, validate_table_name};
    use crate::catalog::types::ColumnType;

    #[test]
    fn qualified_names_split_on_first_dot() {
        assert_eq!(split_qualified_name("network.reservoir"), ("network", "reservoir"));
        assert_eq!(split_qualified_name("reservoir"), ("public", "reservoir"));
        assert!(validate_table_name("network.reservoir").is_ok());
        assert!(validate_table_name("Network.Reservoir").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("network.").is_err());
    }

    #[test]
    fn version_shaped_columns_match_type_or_suffix() {
        let schema = TableSchema {
            table_name: "network.link".into(),
            columns: vec![
                ColumnDef::new("id", ColumnType::Integer, false),
                ColumnDef::new("network_version_id", ColumnType::Integer, true),
                ColumnDef::new("pinned", ColumnType::VersionId, true),
            ],
            primary_key: vec!["id".into()],
            attributed: true,
            audited: false,
            created_at_micros: 0,
        };
        let names: Vec<_> = schema
            .version_shaped_columns("_version_id")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["network_version_id", "pinned"]);
    }
}
