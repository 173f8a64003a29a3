use super::{Committed, ProvDb};
use crate::catalog::schema::{CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY};
use crate::catalog::types::{ColumnType, Row, Value};
use crate::commit::interceptor::{PendingWrite, WriteEnv, WriteInterceptor, WriteKind};
use crate::config::ProvConfig;
use crate::declarative::TableSpec;
use crate::directory::{ActorId, ActorRole, NewActor, SYSTEM_ACTOR_ID};
use crate::error::{ProvError, ProvErrorCode};
use crate::identity::{CallerContext, WriteContext};
use crate::resolver::ResolutionStrategy;
use crate::versioning::{FamilyId, Manifest, VersionId};
use std::sync::Arc;

struct Fixture {
    db: ProvDb,
    admin: WriteContext,
    admin_id: ActorId,
    dev: WriteContext,
    dev_id: ActorId,
}

fn fixture_with(config: ProvConfig) -> Fixture {
    let db = ProvDb::new(config).expect("db");
    let admin_id = db
        .bootstrap_admin(
            NewActor::new("admin@example.org", "Ada Admin", ActorRole::Admin).alias("ada"),
        )
        .expect("bootstrap admin")
        .value;
    let admin = db.authenticate(&CallerContext::new("ada")).expect("auth admin");
    let dev_id = db
        .register_actor(
            &admin,
            NewActor::new("jdoe@example.org", "Jane Doe", ActorRole::Developer).alias("jdoe"),
        )
        .expect("register jdoe")
        .value;
    let dev = db.authenticate(&CallerContext::new("jdoe")).expect("auth jdoe");
    Fixture {
        db,
        admin,
        admin_id,
        dev,
        dev_id,
    }
}

fn fixture() -> Fixture {
    fixture_with(ProvConfig::default())
}

fn network_family(f: &Fixture) -> (FamilyId, VersionId) {
    let family = f
        .db
        .create_family(&f.admin, "network", "Network", "distribution network")
        .expect("family")
        .value;
    let version = f
        .db
        .create_version(&f.admin, family, "1.0.0", Manifest::new(), "initial")
        .expect("version")
        .value;
    f.db.activate_version(&f.admin, version).expect("activate");
    (family, version)
}

fn enroll_reservoirs(f: &Fixture) {
    let spec = TableSpec::new("network.reservoir")
        .column("id", ColumnType::Integer, false)
        .column("name", ColumnType::Text, false)
        .primary_key(&["id"])
        .audited(true)
        .versioned_by("network_version_id", "network")
        .register_in_map("reservoirs");
    f.db.enroll_table(&f.admin, &spec).expect("enroll");
}

#[derive(Default)]
struct RecordingInterceptor {
    seen: parking_lot::Mutex<Vec<(String, WriteKind, ActorId)>>,
}

impl WriteInterceptor for RecordingInterceptor {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn before_write(&self, env: &WriteEnv<'_>, write: &mut PendingWrite<'_>) -> Result<(), ProvError> {
        self.seen.lock().push((
            write.schema.table_name.clone(),
            write.kind,
            env.ctx.actor_id(),
        ));
        // Attempts to forge attribution; the stamp runs afterwards.
        write.row.set(CREATED_BY, Value::Integer(SYSTEM_ACTOR_ID as i64));
        Ok(())
    }
}

struct RejectNames;

impl WriteInterceptor for RejectNames {
    fn name(&self) -> &'static str {
        "reject_names"
    }

    fn before_write(&self, _env: &WriteEnv<'_>, write: &mut PendingWrite<'_>) -> Result<(), ProvError> {
        if write.row.get("name") == Some(&Value::text("forbidden")) {
            return Err(ProvError::Validation("name is forbidden".into()));
        }
        Ok(())
    }
}

#[test]
fn strict_mode_rejects_unregistered_identity() {
    let f = fixture();
    let err = f
        .db
        .authenticate(&CallerContext::new("mallory"))
        .expect_err("strict");
    assert_eq!(err.code(), ProvErrorCode::UnresolvedActor);
    assert!(err.to_string().contains("register this identity before writing"));
}

#[test]
fn alias_resolution_wins_over_fallback() {
    let f = fixture_with(ProvConfig::development());
    assert_eq!(f.dev.actor_id(), f.dev_id);
    assert_eq!(f.dev.resolution().strategy, ResolutionStrategy::Alias);
    assert!(!f.dev.is_degraded());
}

#[test]
fn lenient_mode_attributes_to_bootstrap_and_flags_commit() {
    let f = fixture_with(ProvConfig::development());
    let ctx = f
        .db
        .authenticate(&CallerContext::new("mallory"))
        .expect("lenient");
    assert_eq!(ctx.actor_id(), SYSTEM_ACTOR_ID);
    assert!(ctx.is_degraded());

    let Committed { value: family, commit } = f
        .db
        .create_family(&ctx, "tier", "Tier", "")
        .expect("family");
    assert!(commit.attribution_degraded);
    assert_eq!(commit.actor_id, SYSTEM_ACTOR_ID);
    assert_eq!(
        f.db.snapshot().families().require(family).expect("family").created_by,
        SYSTEM_ACTOR_ID
    );

    let err = f
        .db
        .register_actor(
            &ctx,
            NewActor::new("mallory@example.org", "Mallory", ActorRole::Admin),
        )
        .expect_err("fallback contexts cannot register actors");
    assert_eq!(err.code(), ProvErrorCode::UnresolvedActor);
}

#[test]
fn maintenance_profile_maps_superuser_to_default_admin() {
    let f = fixture_with(ProvConfig::maintenance("admin@example.org"));
    let ctx = f
        .db
        .authenticate(&CallerContext::new("postgres"))
        .expect("superuser");
    assert_eq!(ctx.actor_id(), f.admin_id);
    assert_eq!(ctx.resolution().strategy, ResolutionStrategy::SuperuserFallback);
    assert!(!ctx.is_degraded());
    assert!(f.db.authenticate(&CallerContext::new("mallory")).is_err());
}

#[test]
fn failed_transaction_leaves_no_trace() {
    let f = fixture();
    let seq = f.db.seq();
    let err = f
        .db
        .transaction(&f.admin, |tx| {
            tx.create_family("network", "Network", "")?;
            tx.create_family("Bad Code", "Bad", "")
        })
        .expect_err("invalid code");
    assert_eq!(err.code(), ProvErrorCode::Validation);
    assert_eq!(f.db.seq(), seq);
    assert!(f.db.family_by_code("network").is_err());
}

#[test]
fn deactivated_actor_context_cannot_commit() {
    let f = fixture();
    network_family(&f);
    f.db.deactivate_actor(&f.admin, f.dev_id).expect("deactivate");
    let err = f
        .db
        .create_family(&f.dev, "tier", "Tier", "")
        .expect_err("inactive actor");
    assert_eq!(err.code(), ProvErrorCode::UnresolvedActor);
    assert!(f.db.family_by_code("tier").is_err());
}

#[test]
fn administrative_operations_require_admin_role() {
    let f = fixture();
    let err = f
        .db
        .register_actor(
            &f.dev,
            NewActor::new("eve@example.org", "Eve", ActorRole::Developer),
        )
        .expect_err("developer");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
    let err = f
        .db
        .purge_audit_log_before(&f.dev, i64::MAX)
        .expect_err("developer purge");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
    f.db.purge_audit_log_before(&f.admin, 0).expect("admin purge");

    let err = f
        .db
        .bootstrap_admin(NewActor::new("root@example.org", "Root", ActorRole::Admin))
        .expect_err("second bootstrap");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
}

#[test]
fn update_preserves_created_and_advances_updated() {
    let f = fixture();
    network_family(&f);
    enroll_reservoirs(&f);
    let pk = f
        .db
        .insert_row(&f.admin, "network.reservoir", Row::new().with("id", 1).with("name", "North"))
        .expect("insert")
        .value;
    let before = f
        .db
        .get_row("network.reservoir", &pk)
        .expect("read")
        .expect("row");
    let after = f
        .db
        .update_row(
            &f.dev,
            "network.reservoir",
            &pk,
            Row::new()
                .with("name", "North basin")
                .with(CREATED_BY, f.dev_id as i64)
                .with(CREATED_AT, Value::Timestamp(0)),
        )
        .expect("update")
        .value;
    assert_eq!(after.get(CREATED_AT), before.get(CREATED_AT));
    assert_eq!(after.get(CREATED_BY), Some(&Value::Integer(f.admin_id as i64)));
    assert_eq!(after.get(UPDATED_BY), Some(&Value::Integer(f.dev_id as i64)));
    let ts = |row: &Row| match row.get(UPDATED_AT) {
        Some(Value::Timestamp(v)) => *v,
        other => panic!("unexpected updated_at {other:?}"),
    };
    assert!(ts(&after) > ts(&before));
}

#[test]
fn primary_key_columns_cannot_change() {
    let f = fixture();
    network_family(&f);
    enroll_reservoirs(&f);
    let pk = f
        .db
        .insert_row(&f.admin, "network.reservoir", Row::new().with("id", 1).with("name", "North"))
        .expect("insert")
        .value;
    let err = f
        .db
        .update_row(&f.admin, "network.reservoir", &pk, Row::new().with("id", 2))
        .expect_err("pk change");
    assert_eq!(err.code(), ProvErrorCode::Validation);
}

#[test]
fn interceptors_run_before_attribution() {
    let f = fixture();
    network_family(&f);
    enroll_reservoirs(&f);
    let recorder = Arc::new(RecordingInterceptor::default());
    f.db.register_interceptor(recorder.clone());
    f.db.register_interceptor(Arc::new(RejectNames));

    let pk = f
        .db
        .insert_row(&f.dev, "network.reservoir", Row::new().with("id", 7).with("name", "East"))
        .expect("insert")
        .value;
    let row = f.db.get_row("network.reservoir", &pk).expect("read").expect("row");
    assert_eq!(row.get(CREATED_BY), Some(&Value::Integer(f.dev_id as i64)));

    let err = f
        .db
        .insert_row(
            &f.dev,
            "network.reservoir",
            Row::new().with("id", 8).with("name", "forbidden"),
        )
        .expect_err("rejected");
    assert_eq!(err.code(), ProvErrorCode::Validation);

    let seen = recorder.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        ("network.reservoir".to_string(), WriteKind::Insert, f.dev_id)
    );
}

#[test]
fn compare_and_swap_activation_detects_concurrent_change() {
    let f = fixture();
    let (family, v1) = network_family(&f);
    let token = f.db.require_active_version("network").expect("token");
    assert_eq!(token.version_id, v1);
    let v2 = f
        .db
        .create_version(&f.admin, family, "2.0.0", Manifest::new(), "")
        .expect("v2")
        .value;
    let v3 = f
        .db
        .create_version(&f.admin, family, "3.0.0", Manifest::new(), "")
        .expect("v3")
        .value;

    let previous = f
        .db
        .activate_version_expecting(&f.admin, v2, Some(&token))
        .expect("cas")
        .value;
    assert_eq!(previous, Some(v1));

    let err = f
        .db
        .activate_version_expecting(&f.admin, v3, Some(&token))
        .expect_err("stale token");
    match err {
        ProvError::ConflictingActivation {
            family,
            expected,
            actual,
        } => {
            assert_eq!(family, "network");
            assert_eq!(expected, Some(v1));
            assert_eq!(actual, Some(v2));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(f.db.get_active_version("network").expect("active"), Some(v2));
}

#[test]
fn version_pin_overrides_live_active_version() {
    let f = fixture();
    let (family, v1) = network_family(&f);
    enroll_reservoirs(&f);
    let pin = f.db.require_active_version("network").expect("token");
    let v2 = f
        .db
        .create_version(&f.admin, family, "2.0.0", Manifest::new(), "")
        .expect("v2")
        .value;
    f.db.activate_version(&f.admin, v2).expect("activate v2");

    let pinned = f.dev.clone().with_version_pin(pin);
    let pk = f
        .db
        .insert_row(&pinned, "network.reservoir", Row::new().with("id", 1).with("name", "Old"))
        .expect("pinned insert")
        .value;
    let row = f.db.get_row("network.reservoir", &pk).expect("read").expect("row");
    assert_eq!(row.get("network_version_id"), Some(&Value::Integer(v1 as i64)));

    let pk = f
        .db
        .insert_row(&f.dev, "network.reservoir", Row::new().with("id", 2).with("name", "New"))
        .expect("live insert")
        .value;
    let row = f.db.get_row("network.reservoir", &pk).expect("read").expect("row");
    assert_eq!(row.get("network_version_id"), Some(&Value::Integer(v2 as i64)));
}

#[test]
fn insert_without_active_version_fails() {
    let f = fixture();
    f.db.create_family(&f.admin, "network", "Network", "").expect("family");
    enroll_reservoirs(&f);
    assert_eq!(f.db.get_active_version("network").expect("lookup"), None);
    let err = f
        .db
        .insert_row(&f.dev, "network.reservoir", Row::new().with("id", 1).with("name", "x"))
        .expect_err("no active version");
    assert_eq!(err.code(), ProvErrorCode::NoActiveVersion);
    assert!(f.db.scan_table("network.reservoir").expect("scan").is_empty());
}

#[test]
fn dropped_table_leaves_stale_map_entry_and_audit_history() {
    let f = fixture();
    network_family(&f);
    enroll_reservoirs(&f);
    f.db.insert_row(&f.dev, "network.reservoir", Row::new().with("id", 1).with("name", "x"))
        .expect("insert");
    f.db.drop_table(&f.admin, "network.reservoir", false).expect("drop");
    let report = f.db.consistency_report();
    assert_eq!(report.stale_entries, vec!["network.reservoir".to_string()]);
    assert_eq!(f.db.recent_audit_entries(10).len(), 1);
    assert!(f.db.get_row("network.reservoir", &[Value::Integer(1)]).is_err());
}

#[test]
fn strict_mode_never_resolves_to_the_bootstrap_actor() {
    let db = ProvDb::new(ProvConfig::default()).expect("db");
    for identity in ["provdb", "@", "local", "system"] {
        let err = db
            .authenticate(&CallerContext::new(identity))
            .expect_err(identity);
        assert_eq!(err.code(), ProvErrorCode::UnresolvedActor, "{identity}");
    }
    assert_eq!(db.list_actors().len(), 1);
}

#[test]
fn fallback_contexts_cannot_run_administrative_operations() {
    let f = fixture_with(ProvConfig::development());
    network_family(&f);
    enroll_reservoirs(&f);
    f.db.insert_row(&f.dev, "network.reservoir", Row::new().with("id", 1).with("name", "x"))
        .expect("insert");

    let stranger = f
        .db
        .authenticate(&CallerContext::new("zzqq_unknown"))
        .expect("lenient");
    assert!(stranger.is_degraded());
    assert_eq!(stranger.actor_id(), SYSTEM_ACTOR_ID);

    let err = f
        .db
        .purge_audit_log_before(&stranger, i64::MAX)
        .expect_err("degraded purge");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
    assert_eq!(f.db.recent_audit_entries(10).len(), 1);

    let err = f
        .db
        .deactivate_actor(&stranger, f.admin_id)
        .expect_err("degraded deactivate");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
    let family = f.db.family_by_code("network").expect("family").id;
    let err = f
        .db
        .deactivate_family(&stranger, family)
        .expect_err("degraded family deactivate");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);
    assert!(f.db.authenticate(&CallerContext::new("ada")).is_ok());
}

#[test]
fn alias_binding_is_admin_only_and_rejects_maintenance_identities() {
    let f = fixture_with(
        ProvConfig::maintenance("admin@example.org").with_lenient_principal("etl_loader"),
    );
    let err = f
        .db
        .add_actor_alias(&f.dev, f.dev_id, "postgres")
        .expect_err("self-service alias");
    assert_eq!(err.code(), ProvErrorCode::PermissionDenied);

    for reserved in ["postgres", "etl_loader"] {
        let err = f
            .db
            .add_actor_alias(&f.admin, f.dev_id, reserved)
            .expect_err(reserved);
        assert_eq!(err.code(), ProvErrorCode::Validation, "{reserved}");
    }
    let err = f
        .db
        .register_actor(
            &f.admin,
            NewActor::new("dba@example.org", "Dba", ActorRole::Developer).alias("postgres"),
        )
        .expect_err("reserved alias at registration");
    assert_eq!(err.code(), ProvErrorCode::Validation);

    let superuser = f
        .db
        .authenticate(&CallerContext::new("postgres"))
        .expect("superuser");
    assert_eq!(superuser.actor_id(), f.admin_id);
    assert_eq!(superuser.resolution().strategy, ResolutionStrategy::SuperuserFallback);

    f.db.add_actor_alias(&f.admin, f.dev_id, "sso|jdoe").expect("admin bind");
    let ctx = f.db.authenticate(&CallerContext::new("sso|jdoe")).expect("alias");
    assert_eq!(ctx.actor_id(), f.dev_id);
}
