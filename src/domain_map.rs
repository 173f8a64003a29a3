use crate::catalog::Catalog;
use crate::directory::ActorId;
use crate::error::{ProvError, ResourceType};
use crate::versioning::FamilyId;
use im::OrdMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Declares that a table's version-id column belongs to a family. Bookkeeping
/// for tooling; the domain table's own version column is what carries the
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainFamilyEntry {
    pub table_name: String,
    pub family_id: FamilyId,
    pub version_column: Option<String>,
    pub note: String,
    pub registered_at_micros: i64,
    pub registered_by: ActorId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainFamilyMap {
    entries: OrdMap<String, DomainFamilyEntry>,
}

impl DomainFamilyMap {
    pub fn register(&mut self, entry: DomainFamilyEntry) -> Result<(), ProvError> {
        if self.entries.contains_key(&entry.table_name) {
            return Err(ProvError::already_exists(
                ResourceType::MapEntry,
                &entry.table_name,
            ));
        }
        self.entries.insert(entry.table_name.clone(), entry);
        Ok(())
    }

    pub fn unregister(&mut self, table_name: &str) -> Result<DomainFamilyEntry, ProvError> {
        self.entries
            .remove(table_name)
            .ok_or_else(|| ProvError::not_found(ResourceType::MapEntry, table_name))
    }

    pub fn entry(&self, table_name: &str) -> Option<&DomainFamilyEntry> {
        self.entries.get(table_name)
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.entries.contains_key(table_name)
    }

    /// Sorted table names registered to `family_id`.
    pub fn tables_in_family(&self, family_id: FamilyId) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.family_id == family_id)
            .map(|e| e.table_name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainFamilyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Tables with a version-shaped column and no map entry.
    pub unmapped: Vec<String>,
    /// Map entries whose table no longer exists.
    pub stale_entries: Vec<String>,
    /// `(table, column)` pairs where the entry names a column the table lacks.
    pub column_mismatches: Vec<(String, String)>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.unmapped.is_empty() && self.stale_entries.is_empty() && self.column_mismatches.is_empty()
    }

    pub fn finding_count(&self) -> usize {
        self.unmapped.len() + self.stale_entries.len() + self.column_mismatches.len()
    }

    pub fn log_findings(&self) {
        for table in &self.unmapped {
            warn!(table = table.as_str(), "version-bearing table missing from domain map");
        }
        for table in &self.stale_entries {
            warn!(table = table.as_str(), "domain map entry references a dropped table");
        }
        for (table, column) in &self.column_mismatches {
            warn!(
                table = table.as_str(),
                column = column.as_str(),
                "domain map entry names a column the table does not have"
            );
        }
    }

    /// For callers that want drift to fail a check run. Writes never use this.
    pub fn into_result(self) -> Result<(), ProvError> {
        if let Some(table) = self.unmapped.into_iter().next() {
            return Err(ProvError::UnmappedTable { table });
        }
        if let Some(table) = self.stale_entries.into_iter().next() {
            return Err(ProvError::IntegrityError {
                message: format!("domain map entry for dropped table '{table}'"),
            });
        }
        if let Some((table, column)) = self.column_mismatches.into_iter().next() {
            return Err(ProvError::IntegrityError {
                message: format!("domain map entry for '{table}' names missing column '{column}'"),
            });
        }
        Ok(())
    }
}

pub fn unmapped_tables(catalog: &Catalog, map: &DomainFamilyMap, suffix: &str) -> Vec<String> {
    let mut out: Vec<String> = catalog
        .tables
        .values()
        .filter(|schema| schema.version_shaped_columns(suffix).next().is_some())
        .filter(|schema| !map.contains(&schema.table_name))
        .map(|schema| schema.table_name.clone())
        .collect();
    out.sort();
    out
}

pub fn check_consistency(catalog: &Catalog, map: &DomainFamilyMap, suffix: &str) -> ConsistencyReport {
    let mut report = ConsistencyReport {
        unmapped: unmapped_tables(catalog, map, suffix),
        ..ConsistencyReport::default()
    };
    for entry in map.iter() {
        match catalog.table(&entry.table_name) {
            None => report.stale_entries.push(entry.table_name.clone()),
            Some(schema) => {
                if let Some(column) = &entry.version_column {
                    if !schema.has_column(column) {
                        report
                            .column_mismatches
                            .push((entry.table_name.clone(), column.clone()));
                    }
                }
            }
        }
    }
    report
}
