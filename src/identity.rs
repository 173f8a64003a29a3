use crate::directory::{ActorId, SYSTEM_ACTOR_ID};
use crate::resolver::{Resolution, ResolutionStrategy};
use crate::versioning::ActiveVersionToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ambient identity presented at the edge (SSO username, database principal,
/// service account name). Resolved to an actor once via
/// `ProvDb::authenticate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerContext {
    pub identity: String,
    // Reserved internal flag: never deserialize from untrusted input.
    #[serde(default, skip_deserializing)]
    internal_system: bool,
}

impl CallerContext {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            internal_system: false,
        }
    }

    pub(crate) fn system_internal() -> Self {
        Self {
            identity: "system".to_string(),
            internal_system: true,
        }
    }

    pub(crate) fn is_internal_system(&self) -> bool {
        self.internal_system && self.identity == "system"
    }
}

/// A resolved actor carried explicitly through every write.
///
/// Optional version pins make an insert stamp a specific version of a family
/// instead of whatever is active when the write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContext {
    identity: String,
    resolution: Resolution,
    pins: BTreeMap<String, ActiveVersionToken>,
}

impl WriteContext {
    pub(crate) fn new(identity: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            identity: identity.into(),
            resolution,
            pins: BTreeMap::new(),
        }
    }

    pub(crate) fn system() -> Self {
        Self::new(
            "system",
            Resolution {
                actor_id: SYSTEM_ACTOR_ID,
                strategy: ResolutionStrategy::Internal,
            },
        )
    }

    pub fn actor_id(&self) -> ActorId {
        self.resolution.actor_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_degraded(&self) -> bool {
        self.resolution.is_degraded()
    }

    /// Pins inserts on columns defaulting to `token.family_code` to the token's
    /// version. A later pin for the same family replaces the earlier one.
    pub fn with_version_pin(mut self, token: ActiveVersionToken) -> Self {
        self.pins.insert(token.family_code.clone(), token);
        self
    }

    pub fn pin_for(&self, family_code: &str) -> Option<&ActiveVersionToken> {
        self.pins.get(family_code)
    }

    pub fn pins(&self) -> impl Iterator<Item = &ActiveVersionToken> {
        self.pins.values()
    }
}
