use provdb::ProvDb;
use provdb::config::ProvConfig;
use provdb::directory::{ActorRole, NewActor};
use provdb::error::ProvErrorCode;
use provdb::identity::{CallerContext, WriteContext};
use provdb::versioning::{FamilyId, Manifest, VersionId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::task::JoinSet;

fn setup(version_count: usize) -> (Arc<ProvDb>, WriteContext, FamilyId, Vec<VersionId>) {
    let db = ProvDb::new(ProvConfig::default()).expect("db");
    db.bootstrap_admin(NewActor::new("ops@utility.example", "Ops", ActorRole::Admin).alias("ops"))
        .expect("admin");
    let admin = db.authenticate(&CallerContext::new("ops")).expect("auth");
    let family = db.create_family(&admin, "tier", "Tier", "").expect("family").value;
    let versions = (0..version_count)
        .map(|i| {
            db.create_version(&admin, family, &format!("{i}.0"), Manifest::new(), "")
                .expect("version")
                .value
        })
        .collect();
    (Arc::new(db), admin, family, versions)
}

/// Racing activations of different versions of one family serialize: every
/// call succeeds and the family ends with exactly one active version.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_activations_leave_exactly_one_active() {
    let (db, admin, family, versions) = setup(16);
    let mut tasks = JoinSet::new();
    for version in versions.iter().copied() {
        let db = Arc::clone(&db);
        let admin = admin.clone();
        tasks.spawn_blocking(move || db.activate_version(&admin, version).map(|c| c.commit.seq));
    }
    let mut seqs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        seqs.push(joined.expect("join").expect("activate"));
    }
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs.len(), versions.len(), "each activation commits once");

    assert_eq!(db.count_active_versions(family), 1);
    let active = db.get_active_version("tier").expect("active").expect("some");
    let history = db.snapshot().versions().activation_history(family).len();
    assert_eq!(history, versions.len());
    assert!(versions.contains(&active));
    db.snapshot()
        .versions()
        .check_invariants()
        .expect("store invariants");
}

/// Readers polling while versions flip never see zero or two active versions.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_intermediate_activation_state() {
    let (db, admin, family, versions) = setup(2);
    db.activate_version(&admin, versions[0]).expect("initial");
    let done = Arc::new(AtomicBool::new(false));
    let observations = Arc::new(AtomicU64::new(0));

    let mut readers = JoinSet::new();
    for _ in 0..3 {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let observations = Arc::clone(&observations);
        readers.spawn_blocking(move || {
            while !done.load(Ordering::Acquire) {
                let snapshot = db.snapshot();
                let active = snapshot.versions().count_active(family);
                assert_eq!(active, 1, "snapshot at seq {} saw {active} active", snapshot.seq());
                assert!(snapshot.get_active_version("tier").expect("tier").is_some());
                observations.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    let writer = {
        let db = Arc::clone(&db);
        let versions = versions.clone();
        tokio::task::spawn_blocking(move || {
            for round in 0..200 {
                db.activate_version(&admin, versions[round % 2]).expect("flip");
            }
        })
    };
    writer.await.expect("writer");
    done.store(true, Ordering::Release);
    while let Some(joined) = readers.join_next().await {
        joined.expect("reader");
    }
    assert!(observations.load(Ordering::Relaxed) > 0);
    assert_eq!(db.count_active_versions(family), 1);
}

/// Compare-and-swap activations from a shared token: exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compare_and_swap_activation_has_a_single_winner() {
    let (db, admin, _family, versions) = setup(9);
    db.activate_version(&admin, versions[0]).expect("initial");
    let token = db.require_active_version("tier").expect("token");

    let mut tasks = JoinSet::new();
    for version in versions.iter().skip(1).copied() {
        let db = Arc::clone(&db);
        let admin = admin.clone();
        let token = token.clone();
        tasks.spawn_blocking(move || db.activate_version_expecting(&admin, version, Some(&token)));
    }
    let mut winners = 0;
    let mut conflicts = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("join") {
            Ok(_) => winners += 1,
            Err(err) => {
                assert_eq!(err.code(), ProvErrorCode::ConflictingActivation);
                conflicts += 1;
            }
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, versions.len() - 2);
}
