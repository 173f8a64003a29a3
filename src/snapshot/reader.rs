use crate::audit_log::{AuditLog, AuditLogEntry, AuditLogQuery};
use crate::catalog::Catalog;
use crate::catalog::types::{Row, Value};
use crate::commit::DbState;
use crate::directory::ActorDirectory;
use crate::domain_map::{ConsistencyReport, DomainFamilyMap, check_consistency, unmapped_tables};
use crate::error::ProvError;
use crate::storage::keyspace::Keyspace;
use crate::versioning::{
    ActiveVersionToken, FamilyId, FamilyRegistry, Version, VersionFamily, VersionId, VersionStore,
};
use std::sync::Arc;

/// An immutable view of one committed state. Readers never block writers and
/// never observe a half-applied transaction.
#[derive(Debug, Clone)]
pub struct SnapshotReadView {
    state: Arc<DbState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVersionSummary {
    pub family: VersionFamily,
    pub active: Option<Version>,
}

impl SnapshotReadView {
    pub(crate) fn new(state: Arc<DbState>) -> Self {
        Self { state }
    }

    pub fn seq(&self) -> u64 {
        self.state.seq
    }

    pub fn clock_micros(&self) -> i64 {
        self.state.clock_micros
    }

    pub fn state(&self) -> &DbState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.state.keyspace
    }

    pub fn directory(&self) -> &ActorDirectory {
        &self.state.directory
    }

    pub fn families(&self) -> &FamilyRegistry {
        &self.state.families
    }

    pub fn versions(&self) -> &VersionStore {
        &self.state.versions
    }

    pub fn domain_map(&self) -> &DomainFamilyMap {
        &self.state.domain_map
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.state.audit_log
    }

    /// `Ok(None)` when the family exists but nothing is active.
    pub fn get_active_version(&self, family_code: &str) -> Result<Option<&Version>, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        Ok(self.state.versions.active_for(family.id))
    }

    pub fn require_active_version(&self, family_code: &str) -> Result<&Version, ProvError> {
        self.get_active_version(family_code)?
            .ok_or_else(|| ProvError::NoActiveVersion {
                family: family_code.to_string(),
            })
    }

    /// Token for the family's active version as of this snapshot.
    pub fn active_version_token(
        &self,
        family_code: &str,
    ) -> Result<Option<ActiveVersionToken>, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        Ok(self
            .state
            .versions
            .active_for(family.id)
            .map(|version| ActiveVersionToken {
                family_id: family.id,
                family_code: family.code.clone(),
                version_id: version.id,
                seq: self.state.seq,
            }))
    }

    pub fn active_versions(&self) -> Vec<ActiveVersionSummary> {
        self.state
            .families
            .iter()
            .map(|family| ActiveVersionSummary {
                family: family.clone(),
                active: self.state.versions.active_for(family.id).cloned(),
            })
            .collect()
    }

    pub fn list_versions(&self, family_code: &str) -> Result<Vec<Version>, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        Ok(self
            .state
            .versions
            .list(family.id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Version active for the family at `at_micros`, per activation history.
    pub fn version_active_at(
        &self,
        family_code: &str,
        at_micros: i64,
    ) -> Result<Option<VersionId>, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        Ok(self.state.versions.active_at(family.id, at_micros))
    }

    pub fn tables_in_family(&self, family_id: FamilyId) -> Result<Vec<String>, ProvError> {
        self.state.families.require(family_id)?;
        Ok(self.state.domain_map.tables_in_family(family_id))
    }

    pub fn unmapped_attributed_tables(&self, version_column_suffix: &str) -> Vec<String> {
        unmapped_tables(
            &self.state.catalog,
            &self.state.domain_map,
            version_column_suffix,
        )
    }

    pub fn consistency_report(&self, version_column_suffix: &str) -> ConsistencyReport {
        check_consistency(
            &self.state.catalog,
            &self.state.domain_map,
            version_column_suffix,
        )
    }

    pub fn get_row(&self, table_name: &str, primary_key: &[Value]) -> Result<Option<&Row>, ProvError> {
        self.state.catalog.require_table(table_name)?;
        Ok(self.state.keyspace.get_row(table_name, primary_key))
    }

    /// Rows in primary key order, at most `limit`.
    pub fn scan_table(&self, table_name: &str, limit: usize) -> Result<Vec<Row>, ProvError> {
        self.state.catalog.require_table(table_name)?;
        Ok(self
            .state
            .keyspace
            .table(table_name)
            .map(|t| t.rows.values().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    pub fn audit_entries(&self, query: &AuditLogQuery, max_rows: usize) -> Vec<AuditLogEntry> {
        self.state.audit_log.query(query, max_rows)
    }

    pub fn recent_audit_entries(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.state.audit_log.recent(limit)
    }
}
