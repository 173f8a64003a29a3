//! Read-only inspection of checkpoint files, used by the `provdb` binary.

use crate::attribution::Attribution;
use crate::checkpoint::latest_checkpoint;
use crate::checkpoint::loader::decode_checkpoint;
use crate::commit::DbState;
use crate::domain_map::check_consistency;
use crate::error::ProvError;
use crate::snapshot::SnapshotReadView;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvariantReport {
    pub ok: bool,
    pub seq: u64,
    pub family_count: u64,
    pub version_count: u64,
    pub table_count: u64,
    pub table_rows: u64,
    pub audit_entries: u64,
    /// Broken invariants; any entry makes `ok` false.
    pub violations: Vec<String>,
    /// Catalog/domain map drift. Reported, never fatal.
    pub warnings: Vec<String>,
}

/// Accepts a checkpoint file or a directory holding checkpoints (the newest
/// one is used).
pub fn resolve_checkpoint_path(path: &Path) -> Result<PathBuf, ProvError> {
    if path.is_dir() {
        return latest_checkpoint(path)?.ok_or_else(|| {
            ProvError::Validation(format!("no checkpoint found in {}", path.display()))
        });
    }
    Ok(path.to_path_buf())
}

/// Opens a checkpoint for reading. Fails on hash or invariant violations.
pub fn open_snapshot(path: &Path) -> Result<SnapshotReadView, ProvError> {
    let state = decode_checkpoint(&resolve_checkpoint_path(path)?)?;
    state.check_invariants()?;
    Ok(SnapshotReadView::new(Arc::new(state)))
}

pub fn invariant_report(path: &Path, version_column_suffix: &str) -> Result<InvariantReport, ProvError> {
    let state = decode_checkpoint(&resolve_checkpoint_path(path)?)?;
    Ok(report_for_state(&state, version_column_suffix))
}

pub fn report_for_state(state: &DbState, version_column_suffix: &str) -> InvariantReport {
    let mut violations = Vec::new();

    for family in state.families.iter() {
        let active = state.versions.count_active(family.id);
        if active > 1 {
            violations.push(format!(
                "family '{}' has {active} active versions",
                family.code
            ));
        }
    }
    if let Err(err) = state.versions.check_invariants() {
        violations.push(err.to_string());
    }
    if state.directory.bootstrap_actor().is_none() {
        violations.push("no active bootstrap system actor".into());
    }
    for entry in state.domain_map.iter() {
        if state.families.get(entry.family_id).is_none() {
            violations.push(format!(
                "domain map entry '{}' references missing family {}",
                entry.table_name, entry.family_id
            ));
        }
    }

    let mut table_rows = 0u64;
    for (table_name, data) in state.keyspace.tables.iter() {
        table_rows += data.rows.len() as u64;
        let Some(schema) = state.catalog.table(table_name) else {
            violations.push(format!("rows stored for unknown table '{table_name}'"));
            continue;
        };
        if !schema.attributed {
            continue;
        }
        for (primary_key, row) in data.rows.iter() {
            match Attribution::from_row(row) {
                None => violations.push(format!(
                    "row {primary_key:?} of '{table_name}' lacks attribution"
                )),
                Some(attribution) => {
                    for actor in [attribution.created_by, attribution.updated_by] {
                        if state.directory.get(actor).is_none() {
                            violations.push(format!(
                                "row {primary_key:?} of '{table_name}' attributed to unknown actor {actor}"
                            ));
                        }
                    }
                }
            }
        }
    }

    let consistency = check_consistency(&state.catalog, &state.domain_map, version_column_suffix);
    let mut warnings = Vec::with_capacity(consistency.finding_count());
    warnings.extend(
        consistency
            .unmapped
            .iter()
            .map(|t| format!("unmapped version-bearing table '{t}'")),
    );
    warnings.extend(
        consistency
            .stale_entries
            .iter()
            .map(|t| format!("stale domain map entry '{t}'")),
    );
    warnings.extend(
        consistency
            .column_mismatches
            .iter()
            .map(|(t, c)| format!("domain map entry '{t}' names missing column '{c}'")),
    );

    InvariantReport {
        ok: violations.is_empty(),
        seq: state.seq,
        family_count: state.families.len() as u64,
        version_count: state.versions.len() as u64,
        table_count: state.catalog.tables.len() as u64,
        table_rows,
        audit_entries: state.audit_log.len() as u64,
        violations,
        warnings,
    }
}
