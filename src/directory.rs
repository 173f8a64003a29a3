use crate::error::{ProvError, ResourceType};
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ActorId = u64;

/// The bootstrap actor present in every instance. It is the lowest-numbered
/// actor and cannot be deactivated.
pub const SYSTEM_ACTOR_ID: ActorId = 1;
pub const SYSTEM_ACTOR_EMAIL: &str = "system@provdb.local";
pub const SYSTEM_ACTOR_NAME: &str = "System";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorRole {
    Admin,
    Developer,
    System,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Developer => "developer",
            ActorRole::System => "system",
        }
    }

    /// Admin and system actors may run administrative operations.
    pub fn is_administrative(self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::System)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub email: String,
    pub display_name: String,
    pub role: ActorRole,
    /// External identities (SSO usernames, database principals) that resolve
    /// to this actor by exact match.
    pub aliases: BTreeSet<String>,
    pub active: bool,
    pub created_at_micros: i64,
    pub created_by: Option<ActorId>,
}

/// Registration request for a new actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActor {
    pub email: String,
    pub display_name: String,
    pub role: ActorRole,
    pub aliases: Vec<String>,
}

impl NewActor {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            role,
            aliases: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorDirectory {
    actors: OrdMap<ActorId, Actor>,
    next_id: ActorId,
}

impl Default for ActorDirectory {
    fn default() -> Self {
        let mut actors = OrdMap::new();
        actors.insert(
            SYSTEM_ACTOR_ID,
            Actor {
                id: SYSTEM_ACTOR_ID,
                email: SYSTEM_ACTOR_EMAIL.to_string(),
                display_name: SYSTEM_ACTOR_NAME.to_string(),
                role: ActorRole::System,
                aliases: BTreeSet::new(),
                active: true,
                created_at_micros: 0,
                created_by: None,
            },
        );
        Self {
            actors,
            next_id: SYSTEM_ACTOR_ID + 1,
        }
    }
}

impl ActorDirectory {
    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn require(&self, id: ActorId) -> Result<&Actor, ProvError> {
        self.actors
            .get(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Actor, id))
    }

    pub fn by_email(&self, email: &str) -> Option<&Actor> {
        self.actors
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
    }

    /// All actors in id order, active or not.
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values().filter(|a| a.active)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// The lowest-numbered active system actor.
    pub fn bootstrap_actor(&self) -> Option<&Actor> {
        self.iter_active().find(|a| a.role == ActorRole::System)
    }

    pub fn is_active(&self, id: ActorId) -> bool {
        self.actors.get(&id).map(|a| a.active).unwrap_or(false)
    }

    pub fn register(
        &mut self,
        new: NewActor,
        created_by: ActorId,
        now_micros: i64,
    ) -> Result<ActorId, ProvError> {
        let email = new.email.trim().to_string();
        let display_name = new.display_name.trim().to_string();
        if !email.contains('@') {
            return Err(ProvError::Validation(format!(
                "actor email '{email}' is not an email address"
            )));
        }
        if display_name.is_empty() {
            return Err(ProvError::Validation(
                "actor display name must not be empty".into(),
            ));
        }
        if self.by_email(&email).is_some() {
            return Err(ProvError::already_exists(ResourceType::Actor, email));
        }
        let mut aliases = BTreeSet::new();
        for alias in new.aliases {
            self.check_alias_free(&alias)?;
            aliases.insert(alias);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.actors.insert(
            id,
            Actor {
                id,
                email,
                display_name,
                role: new.role,
                aliases,
                active: true,
                created_at_micros: now_micros,
                created_by: Some(created_by),
            },
        );
        Ok(id)
    }

    pub fn add_alias(&mut self, id: ActorId, alias: impl Into<String>) -> Result<(), ProvError> {
        let alias = alias.into();
        self.check_alias_free(&alias)?;
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Actor, id))?;
        actor.aliases.insert(alias);
        Ok(())
    }

    pub fn remove_alias(&mut self, id: ActorId, alias: &str) -> Result<bool, ProvError> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Actor, id))?;
        Ok(actor.aliases.remove(alias))
    }

    /// Soft delete. Historical attribution keeps pointing at the actor.
    pub fn deactivate(&mut self, id: ActorId) -> Result<bool, ProvError> {
        if id == SYSTEM_ACTOR_ID {
            return Err(ProvError::Validation(
                "the bootstrap system actor cannot be deactivated".into(),
            ));
        }
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Actor, id))?;
        let changed = actor.active;
        actor.active = false;
        Ok(changed)
    }

    pub fn reactivate(&mut self, id: ActorId) -> Result<bool, ProvError> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or_else(|| ProvError::not_found(ResourceType::Actor, id))?;
        let changed = !actor.active;
        actor.active = true;
        Ok(changed)
    }

    fn check_alias_free(&self, alias: &str) -> Result<(), ProvError> {
        if alias.trim().is_empty() {
            return Err(ProvError::Validation("actor alias must not be empty".into()));
        }
        if let Some(owner) = self.actors.values().find(|a| a.aliases.contains(alias)) {
            return Err(ProvError::Validation(format!(
                "alias '{alias}' is already bound to actor {}",
                owner.id
            )));
        }
        Ok(())
    }
}
