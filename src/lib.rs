pub mod attribution;
pub mod audit_log;
pub mod catalog;
pub mod checkpoint;
pub mod commit;
pub mod config;
pub mod declarative;
pub mod directory;
pub mod domain_map;
pub mod error;
pub mod identity;
#[cfg(test)]
mod lib_tests;
pub mod offline;
pub mod repository;
pub mod resolver;
pub mod snapshot;
pub mod storage;
pub mod versioning;

use crate::attribution::AttributionStamp;
use crate::audit_log::{AuditLogEntry, AuditLogQuery};
use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::checkpoint::{CheckpointMeta, load_checkpoint, write_checkpoint};
use crate::commit::interceptor::WriteInterceptor;
use crate::commit::{CommitResult, DbState, Enrollment, WriteTxn};
use crate::config::ProvConfig;
use crate::declarative::TableSpec;
use crate::directory::{Actor, ActorId, ActorRole, NewActor};
use crate::domain_map::{ConsistencyReport, DomainFamilyEntry};
use crate::error::ProvError;
use crate::identity::{CallerContext, WriteContext};
use crate::snapshot::{ActiveVersionSummary, SnapshotReadView};
use crate::storage::keyspace::PrimaryKey;
use crate::versioning::{
    ActiveVersionDefaults, ActiveVersionToken, FamilyId, Manifest, Version, VersionFamily,
    VersionId,
};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Creates a directory with restrictive permissions (0o700 on Unix); checkpoints
/// carry the whole actor directory and audit log.
fn create_private_dir_all(path: &Path) -> Result<(), ProvError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        if !fs::metadata(path)?.is_dir() {
            return Err(ProvError::Validation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn wall_clock_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// The value a write produced together with its commit receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub commit: CommitResult,
}

/// Embedded versioning-and-audit store.
///
/// Readers take a `SnapshotReadView` (a pointer clone of the published state).
/// Writers are serialized; each transaction runs against a copy-on-write clone
/// and publishes it with one pointer swap, so a failed transaction leaves no
/// trace.
pub struct ProvDb {
    config: ProvConfig,
    head: RwLock<Arc<DbState>>,
    commit_lock: Mutex<()>,
    /// Full write-path chain: registered interceptors, then version defaults,
    /// then attribution (last, so nothing can overwrite its stamps).
    interceptors: RwLock<Arc<Vec<Arc<dyn WriteInterceptor>>>>,
}

impl ProvDb {
    pub fn new(config: ProvConfig) -> Result<Self, ProvError> {
        Self::with_state(config, DbState::default())
    }

    /// Restores an instance from a checkpoint file written by [`ProvDb::checkpoint`].
    pub fn open_checkpoint(config: ProvConfig, path: &Path) -> Result<Self, ProvError> {
        let state = load_checkpoint(path)?;
        info!(
            path = %path.display(),
            seq = state.seq,
            families = state.families.len(),
            versions = state.versions.len(),
            "loaded checkpoint"
        );
        Self::with_state(config, state)
    }

    fn with_state(config: ProvConfig, state: DbState) -> Result<Self, ProvError> {
        config.validate()?;
        Ok(Self {
            config,
            head: RwLock::new(Arc::new(state)),
            commit_lock: Mutex::new(()),
            interceptors: RwLock::new(Arc::new(default_chain(Vec::new()))),
        })
    }

    pub fn config(&self) -> &ProvConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SnapshotReadView {
        SnapshotReadView::new(self.head.read().clone())
    }

    pub fn seq(&self) -> u64 {
        self.head.read().seq
    }

    /// Adds write-path middleware. Registered interceptors run in
    /// registration order, before version defaults and attribution stamping.
    pub fn register_interceptor(&self, interceptor: Arc<dyn WriteInterceptor>) {
        let mut chain = self.interceptors.write();
        let extra_count = chain.len().saturating_sub(2);
        let mut extras: Vec<_> = chain.iter().take(extra_count).cloned().collect();
        info!(interceptor = interceptor.name(), "registered write interceptor");
        extras.push(interceptor);
        *chain = Arc::new(default_chain(extras));
    }

    /// Resolves the caller's ambient identity to an actor once, at the edge.
    /// Strict unless the configuration makes this identity lenient.
    pub fn authenticate(&self, caller: &CallerContext) -> Result<WriteContext, ProvError> {
        if caller.is_internal_system() {
            return Ok(WriteContext::system());
        }
        let snapshot = self.head.read().clone();
        let mode = self.config.mode_for(&caller.identity);
        let resolution = resolver::resolve(&snapshot.directory, &caller.identity, mode, &self.config)?;
        Ok(WriteContext::new(caller.identity.clone(), resolution))
    }

    /// Registers the first administrator on behalf of the bootstrap system
    /// actor. Refused once any active admin exists.
    pub fn bootstrap_admin(&self, new: NewActor) -> Result<Committed<ActorId>, ProvError> {
        if new.role != ActorRole::Admin {
            return Err(ProvError::Validation(
                "bootstrap actor must have the admin role".into(),
            ));
        }
        let ctx = self.authenticate(&CallerContext::system_internal())?;
        self.transaction(&ctx, |tx| {
            if tx
                .directory()
                .iter_active()
                .any(|a| a.role == ActorRole::Admin)
            {
                return Err(ProvError::PermissionDenied(
                    "an admin actor already exists; register further actors as an admin".into(),
                ));
            }
            tx.register_actor(new)
        })
    }

    /// Runs `f` as one atomic transaction attributed to `ctx`. Any error rolls
    /// the whole transaction back.
    pub fn transaction<T, F>(&self, ctx: &WriteContext, f: F) -> Result<Committed<T>, ProvError>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, ProvError>,
    {
        let chain = self.interceptors.read().clone();
        let _guard = self.commit_lock.lock();
        let base = self.head.read().clone();
        let mut txn = WriteTxn::begin(&base, ctx, &self.config, &chain, wall_clock_micros())?;
        let value = f(&mut txn)?;
        let (state, commit) = txn.finish();
        *self.head.write() = Arc::new(state);
        if commit.attribution_degraded {
            warn!(
                seq = commit.seq,
                identity = ctx.identity(),
                actor_id = commit.actor_id,
                "commit attributed through bootstrap fallback"
            );
        }
        Ok(Committed { value, commit })
    }

    // --- actors -------------------------------------------------------------

    pub fn register_actor(
        &self,
        ctx: &WriteContext,
        new: NewActor,
    ) -> Result<Committed<ActorId>, ProvError> {
        self.transaction(ctx, |tx| tx.register_actor(new))
    }

    pub fn add_actor_alias(
        &self,
        ctx: &WriteContext,
        actor_id: ActorId,
        alias: &str,
    ) -> Result<Committed<()>, ProvError> {
        self.transaction(ctx, |tx| tx.add_actor_alias(actor_id, alias))
    }

    pub fn deactivate_actor(
        &self,
        ctx: &WriteContext,
        actor_id: ActorId,
    ) -> Result<Committed<bool>, ProvError> {
        self.transaction(ctx, |tx| tx.deactivate_actor(actor_id))
    }

    pub fn list_actors(&self) -> Vec<Actor> {
        self.snapshot().directory().iter().cloned().collect()
    }

    // --- families and versions ----------------------------------------------

    pub fn create_family(
        &self,
        ctx: &WriteContext,
        code: &str,
        label: &str,
        description: &str,
    ) -> Result<Committed<FamilyId>, ProvError> {
        self.transaction(ctx, |tx| tx.create_family(code, label, description))
    }

    pub fn rename_family(
        &self,
        ctx: &WriteContext,
        family_id: FamilyId,
        label: &str,
        description: Option<&str>,
    ) -> Result<Committed<()>, ProvError> {
        self.transaction(ctx, |tx| tx.rename_family(family_id, label, description))
    }

    pub fn deactivate_family(
        &self,
        ctx: &WriteContext,
        family_id: FamilyId,
    ) -> Result<Committed<bool>, ProvError> {
        self.transaction(ctx, |tx| tx.deactivate_family(family_id))
    }

    pub fn family_by_code(&self, code: &str) -> Result<VersionFamily, ProvError> {
        self.snapshot().families().require_by_code(code).cloned()
    }

    pub fn list_families(&self) -> Vec<VersionFamily> {
        self.snapshot().families().iter().cloned().collect()
    }

    pub fn create_version(
        &self,
        ctx: &WriteContext,
        family_id: FamilyId,
        version_number: &str,
        manifest: Manifest,
        changelog: &str,
    ) -> Result<Committed<VersionId>, ProvError> {
        self.transaction(ctx, |tx| {
            tx.create_version(family_id, version_number, manifest, changelog)
        })
    }

    /// Returns the previously active version of the family.
    pub fn activate_version(
        &self,
        ctx: &WriteContext,
        version_id: VersionId,
    ) -> Result<Committed<Option<VersionId>>, ProvError> {
        self.transaction(ctx, |tx| tx.activate_version(version_id))
    }

    pub fn activate_version_expecting(
        &self,
        ctx: &WriteContext,
        version_id: VersionId,
        expected: Option<&ActiveVersionToken>,
    ) -> Result<Committed<Option<VersionId>>, ProvError> {
        self.transaction(ctx, |tx| tx.activate_version_expecting(version_id, expected))
    }

    /// `Ok(None)` when the family exists but has no active version.
    pub fn get_active_version(&self, family_code: &str) -> Result<Option<VersionId>, ProvError> {
        Ok(self
            .snapshot()
            .get_active_version(family_code)?
            .map(|v| v.id))
    }

    pub fn require_active_version(&self, family_code: &str) -> Result<ActiveVersionToken, ProvError> {
        self.active_version_token(family_code)?
            .ok_or_else(|| ProvError::NoActiveVersion {
                family: family_code.to_string(),
            })
    }

    pub fn active_version_token(
        &self,
        family_code: &str,
    ) -> Result<Option<ActiveVersionToken>, ProvError> {
        self.snapshot().active_version_token(family_code)
    }

    pub fn active_versions(&self) -> Vec<ActiveVersionSummary> {
        self.snapshot().active_versions()
    }

    pub fn count_active_versions(&self, family_id: FamilyId) -> usize {
        self.snapshot().versions().count_active(family_id)
    }

    pub fn list_versions(&self, family_id: FamilyId) -> Result<Vec<Version>, ProvError> {
        let snapshot = self.snapshot();
        snapshot.families().require(family_id)?;
        Ok(snapshot
            .versions()
            .list(family_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_version(&self, version_id: VersionId) -> Result<Version, ProvError> {
        self.snapshot().versions().require(version_id).cloned()
    }

    // --- tables and domain map ----------------------------------------------

    pub fn enroll_table(
        &self,
        ctx: &WriteContext,
        spec: &TableSpec,
    ) -> Result<Committed<Enrollment>, ProvError> {
        self.transaction(ctx, |tx| tx.enroll_table(spec))
    }

    /// Creates a table without touching the domain map.
    pub fn create_table(
        &self,
        ctx: &WriteContext,
        schema: TableSchema,
        if_not_exists: bool,
    ) -> Result<Committed<bool>, ProvError> {
        self.transaction(ctx, |tx| tx.create_table(schema, if_not_exists))
    }

    pub fn drop_table(
        &self,
        ctx: &WriteContext,
        table_name: &str,
        if_exists: bool,
    ) -> Result<Committed<bool>, ProvError> {
        self.transaction(ctx, |tx| tx.drop_table(table_name, if_exists))
    }

    pub fn register_table(
        &self,
        ctx: &WriteContext,
        table_name: &str,
        family_id: FamilyId,
        version_column: Option<&str>,
        note: &str,
    ) -> Result<Committed<()>, ProvError> {
        self.transaction(ctx, |tx| {
            tx.register_table(table_name, family_id, version_column, note)
        })
    }

    pub fn unregister_table(
        &self,
        ctx: &WriteContext,
        table_name: &str,
    ) -> Result<Committed<DomainFamilyEntry>, ProvError> {
        self.transaction(ctx, |tx| tx.unregister_table(table_name))
    }

    pub fn tables_in_family(&self, family_id: FamilyId) -> Result<Vec<String>, ProvError> {
        self.snapshot().tables_in_family(family_id)
    }

    pub fn unmapped_attributed_tables(&self) -> Vec<String> {
        self.snapshot()
            .unmapped_attributed_tables(&self.config.version_column_suffix)
    }

    /// Drift between the catalog and the domain map. Findings are logged at
    /// warn level; nothing here blocks writes.
    pub fn consistency_report(&self) -> ConsistencyReport {
        let report = self
            .snapshot()
            .consistency_report(&self.config.version_column_suffix);
        report.log_findings();
        report
    }

    // --- rows ---------------------------------------------------------------

    pub fn insert_row(
        &self,
        ctx: &WriteContext,
        table_name: &str,
        row: Row,
    ) -> Result<Committed<PrimaryKey>, ProvError> {
        self.transaction(ctx, |tx| tx.insert(table_name, row))
    }

    /// Applies a partial set of column changes; returns the stored row.
    pub fn update_row(
        &self,
        ctx: &WriteContext,
        table_name: &str,
        primary_key: &[Value],
        changes: Row,
    ) -> Result<Committed<Row>, ProvError> {
        self.transaction(ctx, |tx| tx.update(table_name, primary_key, changes))
    }

    pub fn delete_row(
        &self,
        ctx: &WriteContext,
        table_name: &str,
        primary_key: &[Value],
    ) -> Result<Committed<Row>, ProvError> {
        self.transaction(ctx, |tx| tx.delete(table_name, primary_key))
    }

    pub fn get_row(&self, table_name: &str, primary_key: &[Value]) -> Result<Option<Row>, ProvError> {
        Ok(self.snapshot().get_row(table_name, primary_key)?.cloned())
    }

    pub fn scan_table(&self, table_name: &str) -> Result<Vec<Row>, ProvError> {
        self.snapshot()
            .scan_table(table_name, self.config.max_scan_rows)
    }

    // --- audit log ----------------------------------------------------------

    pub fn audit_entries(&self, query: &AuditLogQuery) -> Vec<AuditLogEntry> {
        self.snapshot()
            .audit_entries(query, self.config.max_audit_query_rows)
    }

    pub fn recent_audit_entries(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.snapshot()
            .recent_audit_entries(limit.min(self.config.max_audit_query_rows))
    }

    pub fn purge_audit_log_before(
        &self,
        ctx: &WriteContext,
        cutoff_micros: i64,
    ) -> Result<Committed<usize>, ProvError> {
        self.transaction(ctx, |tx| tx.purge_audit_log_before(cutoff_micros))
    }

    // --- persistence --------------------------------------------------------

    /// Writes the current published state to `dir`. Writers keep running; the
    /// checkpoint captures one committed sequence.
    pub fn checkpoint(&self, dir: &Path) -> Result<CheckpointMeta, ProvError> {
        create_private_dir_all(dir)?;
        let state = self.head.read().clone();
        let meta = write_checkpoint(&state, dir)?;
        info!(
            seq = meta.seq,
            filename = meta.filename.as_str(),
            "wrote checkpoint"
        );
        Ok(meta)
    }
}

fn default_chain(mut extras: Vec<Arc<dyn WriteInterceptor>>) -> Vec<Arc<dyn WriteInterceptor>> {
    extras.push(Arc::new(ActiveVersionDefaults));
    extras.push(Arc::new(AttributionStamp));
    extras
}
