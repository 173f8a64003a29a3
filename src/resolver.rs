//! Operator resolution: mapping an ambient identity to a registered actor.
//!
//! Candidates are active non-system actors only; system actors are reached
//! solely through the lenient bootstrap fallback. Strategies are tried in order and the
//! first match wins; within a strategy the lowest actor id wins.
//!
//! 1. exact alias match
//! 2. identity is a substring of the actor's email
//! 3. identity is a case-insensitive substring of the display name
//! 4. (lenient) superuser identity maps to the configured default admin
//! 5. (lenient) bootstrap system actor, logged at warn level
//!
//! Strict resolution stops after step 3 and fails with `UnresolvedActor`.

use crate::config::{ProvConfig, ResolutionMode};
use crate::directory::{ActorDirectory, ActorId, ActorRole};
use crate::error::ProvError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    Alias,
    Email,
    DisplayName,
    SuperuserFallback,
    BootstrapFallback,
    /// Internal system context; never produced from an identity string.
    Internal,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::Alias => "alias",
            ResolutionStrategy::Email => "email",
            ResolutionStrategy::DisplayName => "display_name",
            ResolutionStrategy::SuperuserFallback => "superuser_fallback",
            ResolutionStrategy::BootstrapFallback => "bootstrap_fallback",
            ResolutionStrategy::Internal => "internal",
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(
            self,
            ResolutionStrategy::SuperuserFallback | ResolutionStrategy::BootstrapFallback
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub actor_id: ActorId,
    pub strategy: ResolutionStrategy,
}

impl Resolution {
    /// Attribution landed on the bootstrap actor; worth surfacing to operators.
    pub fn is_degraded(&self) -> bool {
        self.strategy == ResolutionStrategy::BootstrapFallback
    }
}

pub fn resolve(
    directory: &ActorDirectory,
    identity: &str,
    mode: ResolutionMode,
    config: &ProvConfig,
) -> Result<Resolution, ProvError> {
    if let Some(resolution) = resolve_registered(directory, identity) {
        debug!(
            identity,
            actor_id = resolution.actor_id,
            strategy = resolution.strategy.as_str(),
            "resolved operator"
        );
        return Ok(resolution);
    }

    if mode == ResolutionMode::Strict {
        return Err(ProvError::UnresolvedActor {
            identity: identity.to_string(),
        });
    }

    if identity == config.superuser_identity {
        let admin = config
            .default_admin_email
            .as_deref()
            .and_then(|email| directory.by_email(email))
            .filter(|a| a.active);
        if let Some(admin) = admin {
            debug!(identity, actor_id = admin.id, "superuser resolved to default admin");
            return Ok(Resolution {
                actor_id: admin.id,
                strategy: ResolutionStrategy::SuperuserFallback,
            });
        }
    }

    let bootstrap = directory
        .bootstrap_actor()
        .ok_or_else(|| ProvError::IntegrityError {
            message: "no active bootstrap system actor".into(),
        })?;
    warn!(
        identity,
        actor_id = bootstrap.id,
        "operator identity unresolved; attributing to bootstrap system actor"
    );
    Ok(Resolution {
        actor_id: bootstrap.id,
        strategy: ResolutionStrategy::BootstrapFallback,
    })
}

fn resolve_registered(directory: &ActorDirectory, identity: &str) -> Option<Resolution> {
    if identity.is_empty() {
        return None;
    }
    let hit = |actor_id, strategy| Some(Resolution { actor_id, strategy });
    let candidates = || directory.iter_active().filter(|a| a.role != ActorRole::System);

    if let Some(actor) = candidates().find(|a| a.aliases.contains(identity))
    {
        return hit(actor.id, ResolutionStrategy::Alias);
    }
    if let Some(actor) = candidates().find(|a| a.email.contains(identity))
    {
        return hit(actor.id, ResolutionStrategy::Email);
    }
    let needle = identity.to_lowercase();
    if let Some(actor) = candidates().find(|a| a.display_name.to_lowercase().contains(&needle))
    {
        return hit(actor.id, ResolutionStrategy::DisplayName);
    }
    None
}
