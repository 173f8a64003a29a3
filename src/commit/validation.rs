use crate::catalog::schema::{ColumnDefault, TableSchema};
use crate::catalog::types::{ColumnType, Row, Value};
use crate::directory::ActorDirectory;
use crate::error::ProvError;
use crate::storage::keyspace::PrimaryKey;
use crate::versioning::{FamilyRegistry, VersionStore};

/// Fills absent columns that carry a literal default.
pub fn apply_literal_defaults(schema: &TableSchema, row: &mut Row) {
    for column in &schema.columns {
        if let Some(ColumnDefault::Literal(value)) = &column.default {
            if row.get(&column.name).is_none() {
                row.set(column.name.clone(), value.clone());
            }
        }
    }
}

/// Checks a fully staged row: known columns, types, NOT NULL, and the
/// reference columns (actor ids, version ids) against the registries.
pub fn validate_row(
    schema: &TableSchema,
    row: &Row,
    directory: &ActorDirectory,
    families: &FamilyRegistry,
    versions: &VersionStore,
) -> Result<(), ProvError> {
    for column in row.values.keys() {
        if !schema.has_column(column) {
            return Err(ProvError::UnknownColumn {
                table: schema.table_name.clone(),
                column: column.clone(),
            });
        }
    }

    for column in &schema.columns {
        let value = row.get(&column.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if !column.nullable {
                return Err(ProvError::NotNullViolation {
                    table: schema.table_name.clone(),
                    column: column.name.clone(),
                });
            }
            continue;
        }
        if !column.col_type.accepts(value) {
            return Err(ProvError::TypeMismatch {
                table: schema.table_name.clone(),
                column: column.name.clone(),
                expected: column.col_type.name().to_string(),
                actual: value.kind_name().to_string(),
            });
        }

        let fk_violation = |reference: String| ProvError::ForeignKeyViolation {
            table: schema.table_name.clone(),
            column: column.name.clone(),
            reference,
        };
        if column.col_type == ColumnType::ActorRef {
            let id = value.as_u64().ok_or_else(|| fk_violation(format!("actor {value}")))?;
            if directory.get(id).is_none() {
                return Err(fk_violation(format!("actor {id}")));
            }
        }
        let family_code = column.active_version_family();
        if column.col_type == ColumnType::VersionId || family_code.is_some() {
            let id = value
                .as_u64()
                .ok_or_else(|| fk_violation(format!("version {value}")))?;
            let version = versions
                .get(id)
                .ok_or_else(|| fk_violation(format!("version {id}")))?;
            if let Some(code) = family_code {
                let family = families.require_by_code(code)?;
                if version.family_id != family.id {
                    return Err(fk_violation(format!(
                        "version {id} in family '{code}' (it belongs to family {})",
                        version.family_id
                    )));
                }
            }
        }
    }
    Ok(())
}

pub fn extract_primary_key(schema: &TableSchema, row: &Row) -> Result<PrimaryKey, ProvError> {
    schema
        .primary_key
        .iter()
        .map(|column| match row.get(column) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(ProvError::NotNullViolation {
                table: schema.table_name.clone(),
                column: column.clone(),
            }),
        })
        .collect()
}

pub fn format_primary_key(primary_key: &[Value]) -> String {
    let parts: Vec<String> = primary_key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::{apply_literal_defaults, extract_primary_key, validate_row};
    use crate::catalog::schema::{ColumnDef, ColumnDefault, TableSchema};
    use crate::catalog::types::{ColumnType, Row, Value};
    use crate::directory::ActorDirectory;
    use crate::error::ProvErrorCode;
    use crate::versioning::{FamilyRegistry, Manifest, VersionStore};

    struct Fixture {
        schema: TableSchema,
        directory: ActorDirectory,
        families: FamilyRegistry,
        versions: VersionStore,
        network_version: u64,
        tier_version: u64,
    }

    fn fixture() -> Fixture {
        let mut families = FamilyRegistry::default();
        let network = families.create("network", "Network", "", 1, 0).expect("network");
        let tier = families.create("tier", "Tier", "", 1, 0).expect("tier");
        let mut versions = VersionStore::default();
        let network_version = versions
            .create(families.require(network).expect("f"), "1.0.0", Manifest::new(), "", 1, 0)
            .expect("nv");
        let tier_version = versions
            .create(families.require(tier).expect("f"), "1.0.0", Manifest::new(), "", 1, 0)
            .expect("tv");
        let schema = TableSchema {
            table_name: "network.link".into(),
            columns: vec![
                ColumnDef::new("id", ColumnType::Integer, false),
                ColumnDef::new("status", ColumnType::Text, false)
                    .with_default(ColumnDefault::Literal(Value::text("planned"))),
                ColumnDef::new("owner", ColumnType::ActorRef, true),
                ColumnDef::new("network_version_id", ColumnType::VersionId, false).with_default(
                    ColumnDefault::ActiveVersion {
                        family: "network".into(),
                    },
                ),
            ],
            primary_key: vec!["id".into()],
            attributed: false,
            audited: false,
            created_at_micros: 0,
        };
        Fixture {
            schema,
            directory: ActorDirectory::default(),
            families,
            versions,
            network_version,
            tier_version,
        }
    }

    fn check(f: &Fixture, row: &Row) -> Result<(), crate::error::ProvError> {
        validate_row(&f.schema, row, &f.directory, &f.families, &f.versions)
    }

    #[test]
    fn literal_defaults_fill_missing_columns_only() {
        let f = fixture();
        let mut row = Row::new().with("id", 1);
        apply_literal_defaults(&f.schema, &mut row);
        assert_eq!(row.get("status"), Some(&Value::text("planned")));
        let mut row = Row::new().with("id", 1).with("status", "built");
        apply_literal_defaults(&f.schema, &mut row);
        assert_eq!(row.get("status"), Some(&Value::text("built")));
    }

    #[test]
    fn version_column_must_reference_its_family() {
        let f = fixture();
        let base = Row::new().with("id", 1).with("status", "built");
        check(&f, &base.clone().with("network_version_id", f.network_version as i64))
            .expect("own family");
        let err = check(&f, &base.clone().with("network_version_id", f.tier_version as i64))
            .expect_err("other family");
        assert_eq!(err.code(), ProvErrorCode::ForeignKeyViolation);
        let err = check(&f, &base.with("network_version_id", 999)).expect_err("missing version");
        assert_eq!(err.code(), ProvErrorCode::ForeignKeyViolation);
    }

    #[test]
    fn rejects_unknown_columns_type_mismatch_and_nulls() {
        let f = fixture();
        let ok = Row::new()
            .with("id", 1)
            .with("status", "built")
            .with("network_version_id", f.network_version as i64);
        let err = check(&f, &ok.clone().with("bogus", 1)).expect_err("unknown");
        assert_eq!(err.code(), ProvErrorCode::UnknownColumn);
        let err = check(&f, &ok.clone().with("status", 5)).expect_err("type");
        assert_eq!(err.code(), ProvErrorCode::TypeMismatch);
        let err = check(&f, &ok.clone().with("status", Value::Null)).expect_err("null");
        assert_eq!(err.code(), ProvErrorCode::NotNullViolation);
        let err = check(&f, &ok.with("owner", 42)).expect_err("missing actor");
        assert_eq!(err.code(), ProvErrorCode::ForeignKeyViolation);
    }

    #[test]
    fn primary_key_requires_values() {
        let f = fixture();
        assert_eq!(
            extract_primary_key(&f.schema, &Row::new().with("id", 4)).expect("pk"),
            vec![Value::Integer(4)]
        );
        assert!(extract_primary_key(&f.schema, &Row::new()).is_err());
    }
}
