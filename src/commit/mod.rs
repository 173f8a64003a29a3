pub mod interceptor;
pub mod validation;

use crate::audit_log::{AuditLog, AuditOperation, diff_rows};
use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::catalog::{Catalog, DdlOperation};
use crate::commit::interceptor::{PendingWrite, WriteEnv, WriteInterceptor, WriteKind};
use crate::commit::validation::{
    apply_literal_defaults, extract_primary_key, format_primary_key, validate_row,
};
use crate::config::ProvConfig;
use crate::declarative::TableSpec;
use crate::directory::{ActorDirectory, ActorId, NewActor};
use crate::domain_map::{DomainFamilyEntry, DomainFamilyMap};
use crate::error::{ProvError, ResourceType};
use crate::identity::WriteContext;
use crate::storage::keyspace::{Keyspace, PrimaryKey};
use crate::versioning::{
    ActiveVersionToken, FamilyId, FamilyRegistry, Manifest, VersionId, VersionStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Everything a provdb instance persists. Cloning is cheap: every collection
/// is a persistent `im` structure, so a transaction works on a clone and the
/// commit publishes it whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbState {
    pub seq: u64,
    /// Highest timestamp issued so far; commit timestamps strictly increase.
    pub clock_micros: i64,
    pub catalog: Catalog,
    pub keyspace: Keyspace,
    pub directory: ActorDirectory,
    pub families: FamilyRegistry,
    pub versions: VersionStore,
    pub domain_map: DomainFamilyMap,
    pub audit_log: AuditLog,
}

impl DbState {
    pub fn check_invariants(&self) -> Result<(), ProvError> {
        self.versions.check_invariants()?;
        if self.directory.bootstrap_actor().is_none() {
            return Err(ProvError::IntegrityError {
                message: "no active bootstrap system actor".into(),
            });
        }
        for entry in self.domain_map.iter() {
            self.families.require(entry.family_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    pub seq: u64,
    pub committed_at_micros: i64,
    pub actor_id: ActorId,
    /// The writer was attributed through the bootstrap fallback.
    pub attribution_degraded: bool,
    pub audit_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub table_name: String,
    pub created: bool,
    pub registered_family: Option<FamilyId>,
}

/// A write transaction over a private copy of the head state. Dropping it
/// without committing discards every change.
pub struct WriteTxn<'a> {
    state: DbState,
    ctx: &'a WriteContext,
    config: &'a ProvConfig,
    interceptors: &'a [Arc<dyn WriteInterceptor>],
    now_micros: i64,
    seq: u64,
    audit_entries: usize,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn begin(
        base: &DbState,
        ctx: &'a WriteContext,
        config: &'a ProvConfig,
        interceptors: &'a [Arc<dyn WriteInterceptor>],
        wall_micros: i64,
    ) -> Result<Self, ProvError> {
        if !base.directory.is_active(ctx.actor_id()) {
            return Err(ProvError::UnresolvedActor {
                identity: ctx.identity().to_string(),
            });
        }
        Ok(Self {
            state: base.clone(),
            ctx,
            config,
            interceptors,
            now_micros: wall_micros.max(base.clock_micros + 1),
            seq: base.seq + 1,
            audit_entries: 0,
        })
    }

    pub(crate) fn finish(mut self) -> (DbState, CommitResult) {
        self.state.seq = self.seq;
        self.state.clock_micros = self.now_micros;
        let result = CommitResult {
            seq: self.seq,
            committed_at_micros: self.now_micros,
            actor_id: self.ctx.actor_id(),
            attribution_degraded: self.ctx.is_degraded(),
            audit_entries: self.audit_entries,
        };
        (self.state, result)
    }

    pub fn ctx(&self) -> &WriteContext {
        self.ctx
    }

    pub fn now_micros(&self) -> i64 {
        self.now_micros
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
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

    /// Fallback-resolved contexts never count as administrators, whatever
    /// actor they landed on.
    fn require_admin(&self, action: &str) -> Result<(), ProvError> {
        let strategy = self.ctx.resolution().strategy;
        if strategy.is_fallback() {
            return Err(ProvError::PermissionDenied(format!(
                "{action} requires a registered admin; identity '{}' resolved through {}",
                self.ctx.identity(),
                strategy.as_str()
            )));
        }
        let actor = self.state.directory.require(self.ctx.actor_id())?;
        if !actor.role.is_administrative() {
            return Err(ProvError::PermissionDenied(format!(
                "{action} requires an admin actor; actor {} is {}",
                actor.id,
                actor.role.as_str()
            )));
        }
        Ok(())
    }

    // --- actors -----------------------------------------------------------

    /// Registration never accepts a fallback-resolved writer: an unregistered
    /// principal must not mint identities.
    pub fn register_actor(&mut self, new: NewActor) -> Result<ActorId, ProvError> {
        if self.ctx.resolution().strategy.is_fallback() {
            return Err(ProvError::UnresolvedActor {
                identity: self.ctx.identity().to_string(),
            });
        }
        self.require_admin("actor registration")?;
        for alias in &new.aliases {
            self.check_alias_not_reserved(alias)?;
        }
        let id = self
            .state
            .directory
            .register(new, self.ctx.actor_id(), self.now_micros)?;
        info!(actor_id = id, registered_by = self.ctx.actor_id(), "registered actor");
        Ok(id)
    }

    /// Aliases decide attribution, so binding one is administrative even for
    /// the actor's own record.
    pub fn add_actor_alias(&mut self, actor_id: ActorId, alias: &str) -> Result<(), ProvError> {
        self.require_admin("alias binding")?;
        self.check_alias_not_reserved(alias)?;
        self.state.directory.add_alias(actor_id, alias)
    }

    /// The superuser and lenient maintenance principals resolve through the
    /// configured fallback chain and can never become an actor alias.
    fn check_alias_not_reserved(&self, alias: &str) -> Result<(), ProvError> {
        if alias == self.config.superuser_identity || self.config.lenient_principals.contains(alias) {
            return Err(ProvError::Validation(format!(
                "'{alias}' is a reserved maintenance identity and cannot be an actor alias"
            )));
        }
        Ok(())
    }

    pub fn deactivate_actor(&mut self, actor_id: ActorId) -> Result<bool, ProvError> {
        self.require_admin("actor deactivation")?;
        self.state.directory.deactivate(actor_id)
    }

    // --- version families and versions -------------------------------------

    pub fn create_family(
        &mut self,
        code: &str,
        label: &str,
        description: &str,
    ) -> Result<FamilyId, ProvError> {
        let id = self.state.families.create(
            code,
            label,
            description,
            self.ctx.actor_id(),
            self.now_micros,
        )?;
        info!(family_id = id, code, "created version family");
        Ok(id)
    }

    pub fn rename_family(
        &mut self,
        family_id: FamilyId,
        label: &str,
        description: Option<&str>,
    ) -> Result<(), ProvError> {
        self.state.families.rename(family_id, label, description)
    }

    pub fn deactivate_family(&mut self, family_id: FamilyId) -> Result<bool, ProvError> {
        self.require_admin("family deactivation")?;
        self.state.families.deactivate(family_id)
    }

    pub fn create_version(
        &mut self,
        family_id: FamilyId,
        version_number: &str,
        manifest: Manifest,
        changelog: &str,
    ) -> Result<VersionId, ProvError> {
        let family = self.state.families.require(family_id)?.clone();
        self.state.versions.create(
            &family,
            version_number,
            manifest,
            changelog,
            self.ctx.actor_id(),
            self.now_micros,
        )
    }

    /// Deactivates the family's current version and activates `version_id` as
    /// one step of this transaction. Returns the previously active version.
    pub fn activate_version(&mut self, version_id: VersionId) -> Result<Option<VersionId>, ProvError> {
        let version = self.state.versions.require(version_id)?;
        let family = self.state.families.require(version.family_id)?;
        if !family.active {
            return Err(ProvError::Validation(format!(
                "version family '{}' is inactive",
                family.code
            )));
        }
        let family_code = family.code.clone();
        let previous =
            self.state
                .versions
                .activate(version_id, self.ctx.actor_id(), self.now_micros, self.seq)?;
        info!(
            family = family_code.as_str(),
            version_id,
            previous = ?previous,
            actor_id = self.ctx.actor_id(),
            "activated version"
        );
        Ok(previous)
    }

    /// Compare-and-swap activation: succeeds only if the family's active
    /// version is still the one `expected` names (`None`: nothing active).
    pub fn activate_version_expecting(
        &mut self,
        version_id: VersionId,
        expected: Option<&ActiveVersionToken>,
    ) -> Result<Option<VersionId>, ProvError> {
        let family_id = self.state.versions.require(version_id)?.family_id;
        if let Some(token) = expected {
            if token.family_id != family_id {
                return Err(ProvError::Validation(format!(
                    "activation token names family {}, version {version_id} belongs to family {family_id}",
                    token.family_id
                )));
            }
        }
        let expected_id = expected.map(|t| t.version_id);
        let actual = self.state.versions.active_for(family_id).map(|v| v.id);
        if actual != expected_id {
            let family = self.state.families.require(family_id)?;
            return Err(ProvError::ConflictingActivation {
                family: family.code.clone(),
                expected: expected_id,
                actual,
            });
        }
        self.activate_version(version_id)
    }

    pub fn active_version(&self, family_code: &str) -> Result<Option<VersionId>, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        Ok(self.state.versions.active_for(family.id).map(|v| v.id))
    }

    pub fn require_active_version(
        &self,
        family_code: &str,
    ) -> Result<ActiveVersionToken, ProvError> {
        let family = self.state.families.require_by_code(family_code)?;
        let version = self
            .state
            .versions
            .active_for(family.id)
            .ok_or_else(|| ProvError::NoActiveVersion {
                family: family_code.to_string(),
            })?;
        Ok(ActiveVersionToken {
            family_id: family.id,
            family_code: family.code.clone(),
            version_id: version.id,
            seq: self.seq,
        })
    }

    // --- catalog and domain map ---------------------------------------------

    pub fn apply_ddl(&mut self, op: DdlOperation) -> Result<bool, ProvError> {
        let table_name = op.table_name().to_string();
        let dropping = matches!(op, DdlOperation::DropTable { .. });
        let applied = self.state.catalog.apply_ddl(op)?;
        if applied && dropping {
            self.state.keyspace.drop_table(&table_name);
        }
        Ok(applied)
    }

    pub fn create_table(&mut self, schema: TableSchema, if_not_exists: bool) -> Result<bool, ProvError> {
        self.apply_ddl(DdlOperation::CreateTable {
            schema,
            if_not_exists,
        })
    }

    /// Removes the table and its rows. Audit entries and any domain map entry
    /// are left in place; the latter shows up as stale in consistency reports.
    pub fn drop_table(&mut self, table_name: &str, if_exists: bool) -> Result<bool, ProvError> {
        self.apply_ddl(DdlOperation::DropTable {
            table_name: table_name.to_string(),
            if_exists,
        })
    }

    /// Creates the table described by `spec` and, when it asks for it,
    /// registers it in the domain map.
    pub fn enroll_table(&mut self, spec: &TableSpec) -> Result<Enrollment, ProvError> {
        let schema = spec.to_schema(self.now_micros)?;
        for version in &spec.version_columns {
            self.state.families.require_by_code(&version.family_code)?;
        }
        let created = self.apply_ddl(DdlOperation::CreateTable {
            schema,
            if_not_exists: spec.if_not_exists,
        })?;
        let mut registered_family = None;
        if let Some((version, note)) = spec.map_target() {
            let family_id = self
                .state
                .families
                .require_by_code(&version.family_code)?
                .id;
            if !self.state.domain_map.contains(&spec.table_name) {
                self.register_table(&spec.table_name, family_id, Some(&version.column), note)?;
            }
            registered_family = Some(family_id);
        }
        info!(
            table = spec.table_name.as_str(),
            created,
            audited = spec.audited,
            registered = registered_family.is_some(),
            "enrolled table"
        );
        Ok(Enrollment {
            table_name: spec.table_name.clone(),
            created,
            registered_family,
        })
    }

    pub fn register_table(
        &mut self,
        table_name: &str,
        family_id: FamilyId,
        version_column: Option<&str>,
        note: &str,
    ) -> Result<(), ProvError> {
        let schema = self.state.catalog.require_table(table_name)?;
        if let Some(column) = version_column {
            if !schema.has_column(column) {
                return Err(ProvError::UnknownColumn {
                    table: table_name.to_string(),
                    column: column.to_string(),
                });
            }
        }
        self.state.families.require(family_id)?;
        self.state.domain_map.register(DomainFamilyEntry {
            table_name: table_name.to_string(),
            family_id,
            version_column: version_column.map(str::to_string),
            note: note.to_string(),
            registered_at_micros: self.now_micros,
            registered_by: self.ctx.actor_id(),
        })
    }

    pub fn unregister_table(&mut self, table_name: &str) -> Result<DomainFamilyEntry, ProvError> {
        self.state.domain_map.unregister(table_name)
    }

    // --- rows -----------------------------------------------------------------

    pub fn get(&self, table_name: &str, primary_key: &[Value]) -> Option<&Row> {
        self.state.keyspace.get_row(table_name, primary_key)
    }

    /// Rows of `table_name` in primary key order, capped at the configured
    /// scan limit.
    pub fn scan(&self, table_name: &str) -> Result<Vec<Row>, ProvError> {
        self.state.catalog.require_table(table_name)?;
        Ok(self
            .state
            .keyspace
            .table(table_name)
            .map(|t| {
                t.rows
                    .values()
                    .take(self.config.max_scan_rows)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn insert(&mut self, table_name: &str, row: Row) -> Result<PrimaryKey, ProvError> {
        let schema = self.state.catalog.require_table(table_name)?.clone();
        let mut row = row;
        apply_literal_defaults(&schema, &mut row);
        self.run_interceptors(&schema, WriteKind::Insert, None, &mut row)?;
        validate_row(
            &schema,
            &row,
            &self.state.directory,
            &self.state.families,
            &self.state.versions,
        )?;
        let primary_key = extract_primary_key(&schema, &row)?;
        if self.state.keyspace.get_row(table_name, &primary_key).is_some() {
            return Err(ProvError::DuplicatePK {
                table: table_name.to_string(),
                key: format_primary_key(&primary_key),
            });
        }
        if schema.audited {
            self.record_audit(table_name, AuditOperation::Insert, &primary_key, None, Some(&row));
        }
        self.state
            .keyspace
            .upsert_row(table_name, primary_key.clone(), row, self.seq);
        Ok(primary_key)
    }

    /// Applies `changes` over the stored row. Primary key columns cannot change.
    pub fn update(
        &mut self,
        table_name: &str,
        primary_key: &[Value],
        changes: Row,
    ) -> Result<Row, ProvError> {
        let schema = self.state.catalog.require_table(table_name)?.clone();
        let existing = self
            .state
            .keyspace
            .get_row(table_name, primary_key)
            .cloned()
            .ok_or_else(|| {
                ProvError::not_found(
                    ResourceType::Row,
                    format!("{table_name}{}", format_primary_key(primary_key)),
                )
            })?;
        let mut row = existing.clone();
        for (column, value) in changes.values {
            if schema.primary_key.contains(&column) && existing.get(&column) != Some(&value) {
                return Err(ProvError::Validation(format!(
                    "primary key column '{column}' of '{table_name}' cannot be updated"
                )));
            }
            row.set(column, value);
        }
        self.run_interceptors(&schema, WriteKind::Update, Some(&existing), &mut row)?;
        validate_row(
            &schema,
            &row,
            &self.state.directory,
            &self.state.families,
            &self.state.versions,
        )?;
        if schema.audited {
            self.record_audit(
                table_name,
                AuditOperation::Update,
                primary_key,
                Some(&existing),
                Some(&row),
            );
        }
        self.state
            .keyspace
            .upsert_row(table_name, primary_key.to_vec(), row.clone(), self.seq);
        Ok(row)
    }

    pub fn delete(&mut self, table_name: &str, primary_key: &[Value]) -> Result<Row, ProvError> {
        let audited = self.state.catalog.require_table(table_name)?.audited;
        let removed = self
            .state
            .keyspace
            .delete_row(table_name, primary_key)
            .ok_or_else(|| {
                ProvError::not_found(
                    ResourceType::Row,
                    format!("{table_name}{}", format_primary_key(primary_key)),
                )
            })?;
        if audited {
            self.record_audit(
                table_name,
                AuditOperation::Delete,
                primary_key,
                Some(&removed),
                None,
            );
        }
        Ok(removed)
    }

    // --- audit log --------------------------------------------------------------

    pub fn purge_audit_log_before(&mut self, cutoff_micros: i64) -> Result<usize, ProvError> {
        self.require_admin("audit log purge")?;
        let purged = self.state.audit_log.purge_before(cutoff_micros);
        info!(
            cutoff_micros,
            purged,
            actor_id = self.ctx.actor_id(),
            "purged audit log entries"
        );
        Ok(purged)
    }

    fn record_audit(
        &mut self,
        table_name: &str,
        operation: AuditOperation,
        primary_key: &[Value],
        old: Option<&Row>,
        new: Option<&Row>,
    ) {
        self.state.audit_log.record_change(
            table_name,
            operation,
            self.ctx.actor_id(),
            primary_key.to_vec(),
            diff_rows(old, new),
            self.now_micros,
            self.seq,
        );
        self.audit_entries += 1;
    }

    fn run_interceptors(
        &self,
        schema: &TableSchema,
        kind: WriteKind,
        existing: Option<&Row>,
        row: &mut Row,
    ) -> Result<(), ProvError> {
        let env = WriteEnv {
            ctx: self.ctx,
            now_micros: self.now_micros,
            seq: self.seq,
            families: &self.state.families,
            versions: &self.state.versions,
        };
        let mut pending = PendingWrite {
            schema,
            kind,
            existing,
            row,
        };
        for interceptor in self.interceptors {
            interceptor.before_write(&env, &mut pending)?;
        }
        Ok(())
    }
}
