use crate::directory::ActorId;
use crate::error::{ProvError, ResourceType};
use crate::versioning::family::{FamilyId, VersionFamily};
use im::{HashMap, OrdMap, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type VersionId = u64;

/// Arbitrary version metadata: data sources, feature flags, migration notes.
pub type Manifest = BTreeMap<String, serde_json::Value>;

/// An immutable version instance. Only `active` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    pub family_id: FamilyId,
    pub version_number: String,
    pub manifest: Manifest,
    pub changelog: String,
    pub active: bool,
    pub created_at_micros: i64,
    pub created_by: ActorId,
}

/// One activation, kept so "which version was authoritative at time T" stays
/// answerable after later activations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationRecord {
    pub family_id: FamilyId,
    pub version_id: VersionId,
    pub previous: Option<VersionId>,
    pub activated_by: ActorId,
    pub activated_at_micros: i64,
    pub seq: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionStore {
    versions: OrdMap<VersionId, Version>,
    /// At most one entry per family; mirrors the `active` flags.
    active: HashMap<FamilyId, VersionId>,
    history: Vector<ActivationRecord>,
    next_id: VersionId,
}

impl VersionStore {
    /// Creates an inactive version.
    pub fn create(
        &mut self,
        family: &VersionFamily,
        version_number: &str,
        manifest: Manifest,
        changelog: &str,
        created_by: ActorId,
        now_micros: i64,
    ) -> Result<VersionId, ProvError> {
        if !family.active {
            return Err(ProvError::Validation(format!(
                "version family '{}' is inactive",
                family.code
            )));
        }
        let version_number = version_number.trim();
        if version_number.is_empty() {
            return Err(ProvError::Validation("version number must not be empty".into()));
        }
        let duplicate = self
            .versions
            .values()
            .any(|v| v.family_id == family.id && v.version_number == version_number);
        if duplicate {
            return Err(ProvError::already_exists(
                ResourceType::Version,
                format!("{}@{version_number}", family.code),
            ));
        }
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        self.versions.insert(
            id,
            Version {
                id,
                family_id: family.id,
                version_number: version_number.to_string(),
                manifest,
                changelog: changelog.to_string(),
                active: false,
                created_at_micros: now_micros,
                created_by,
            },
        );
        Ok(id)
    }

    /// Deactivates the family's current version and activates `version_id`.
    /// Returns the previously active version. Re-activating the active version
    /// is a no-op that returns `Ok(Some(version_id))` without recording history.
    pub fn activate(
        &mut self,
        version_id: VersionId,
        activated_by: ActorId,
        now_micros: i64,
        seq: u64,
    ) -> Result<Option<VersionId>, ProvError> {
        let family_id = self.require(version_id)?.family_id;
        let previous = self.active.get(&family_id).copied();
        if previous == Some(version_id) {
            return Ok(previous);
        }
        if let Some(prev_id) = previous {
            let prev = self.versions.get_mut(&prev_id).ok_or_else(|| {
                ProvError::IntegrityError {
                    message: format!("active version {prev_id} missing from store"),
                }
            })?;
            prev.active = false;
        }
        if let Some(target) = self.versions.get_mut(&version_id) {
            target.active = true;
        }
        self.active.insert(family_id, version_id);
        self.history.push_back(ActivationRecord {
            family_id,
            version_id,
            previous,
            activated_by,
            activated_at_micros: now_micros,
            seq,
        });
        Ok(previous)
    }

    pub fn get(&self, id: VersionId) -> Option<&Version> {
        self.versions.get(&id)
    }

    pub fn require(&self, id: VersionId) -> Result<&Version, ProvError> {
        self.versions
            .get(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Version, id))
    }

    pub fn active_for(&self, family_id: FamilyId) -> Option<&Version> {
        self.active
            .get(&family_id)
            .and_then(|id| self.versions.get(id))
    }

    pub fn count_active(&self, family_id: FamilyId) -> usize {
        self.versions
            .values()
            .filter(|v| v.family_id == family_id && v.active)
            .count()
    }

    /// Versions of a family in creation order.
    pub fn list(&self, family_id: FamilyId) -> Vec<&Version> {
        self.versions
            .values()
            .filter(|v| v.family_id == family_id)
            .collect()
    }

    pub fn activation_history(&self, family_id: FamilyId) -> Vec<&ActivationRecord> {
        self.history
            .iter()
            .filter(|r| r.family_id == family_id)
            .collect()
    }

    /// The version that was active for `family_id` at `at_micros`, per the
    /// activation history.
    pub fn active_at(&self, family_id: FamilyId, at_micros: i64) -> Option<VersionId> {
        self.history
            .iter()
            .rev()
            .find(|r| r.family_id == family_id && r.activated_at_micros <= at_micros)
            .map(|r| r.version_id)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Verifies the active flags agree with the per-family active index and that
    /// no family has more than one active version.
    pub fn check_invariants(&self) -> Result<(), ProvError> {
        let mut seen: BTreeMap<FamilyId, VersionId> = BTreeMap::new();
        for version in self.versions.values().filter(|v| v.active) {
            if let Some(other) = seen.insert(version.family_id, version.id) {
                return Err(ProvError::IntegrityError {
                    message: format!(
                        "family {} has multiple active versions ({other}, {})",
                        version.family_id, version.id
                    ),
                });
            }
        }
        let indexed: BTreeMap<FamilyId, VersionId> =
            self.active.iter().map(|(f, v)| (*f, *v)).collect();
        if indexed != seen {
            return Err(ProvError::IntegrityError {
                message: "active version index disagrees with version flags".into(),
            });
        }
        Ok(())
    }
}
