use crate::directory::ActorId;
use crate::error::{ProvError, ResourceType};
use im::{HashMap, OrdMap};
use serde::{Deserialize, Serialize};

pub type FamilyId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionFamily {
    pub id: FamilyId,
    /// Unique short code, e.g. `network`.
    pub code: String,
    pub label: String,
    pub description: String,
    pub active: bool,
    pub created_at_micros: i64,
    pub created_by: ActorId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FamilyRegistry {
    families: OrdMap<FamilyId, VersionFamily>,
    by_code: HashMap<String, FamilyId>,
    next_id: FamilyId,
}

impl FamilyRegistry {
    pub fn create(
        &mut self,
        code: &str,
        label: &str,
        description: &str,
        created_by: ActorId,
        now_micros: i64,
    ) -> Result<FamilyId, ProvError> {
        validate_code(code)?;
        if label.trim().is_empty() {
            return Err(ProvError::Validation("family label must not be empty".into()));
        }
        if self.by_code.contains_key(code) {
            return Err(ProvError::already_exists(ResourceType::Family, code));
        }
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        self.families.insert(
            id,
            VersionFamily {
                id,
                code: code.to_string(),
                label: label.trim().to_string(),
                description: description.to_string(),
                active: true,
                created_at_micros: now_micros,
                created_by,
            },
        );
        self.by_code.insert(code.to_string(), id);
        Ok(id)
    }

    /// The only mutation a family supports besides deactivation.
    pub fn rename(
        &mut self,
        id: FamilyId,
        label: &str,
        description: Option<&str>,
    ) -> Result<(), ProvError> {
        if label.trim().is_empty() {
            return Err(ProvError::Validation("family label must not be empty".into()));
        }
        let family = self
            .families
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Family, id))?;
        family.label = label.trim().to_string();
        if let Some(description) = description {
            family.description = description.to_string();
        }
        Ok(())
    }

    pub fn deactivate(&mut self, id: FamilyId) -> Result<bool, ProvError> {
        let family = self
            .families
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Family, id))?;
        let changed = family.active;
        family.active = false;
        Ok(changed)
    }

    pub fn get(&self, id: FamilyId) -> Option<&VersionFamily> {
        self.families.get(&id)
    }

    pub fn require(&self, id: FamilyId) -> Result<&VersionFamily, ProvError> {
        self.families
            .get(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Family, id))
    }

    pub fn by_code(&self, code: &str) -> Option<&VersionFamily> {
        self.by_code.get(code).and_then(|id| self.families.get(id))
    }

    pub fn require_by_code(&self, code: &str) -> Result<&VersionFamily, ProvError> {
        self.by_code(code)
            .ok_or_else(|| ProvError::not_found(ResourceType::Family, code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionFamily> {
        self.families.values()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

fn validate_code(code: &str) -> Result<(), ProvError> {
    let valid = !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(ProvError::Validation(format!(
            "family code '{code}' must be 1-64 characters of [a-z0-9_]"
        )));
    }
    Ok(())
}
