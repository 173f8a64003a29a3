pub mod defaults;
pub mod family;
pub mod store;

use serde::{Deserialize, Serialize};

pub use defaults::ActiveVersionDefaults;
pub use family::{FamilyId, FamilyRegistry, VersionFamily};
pub use store::{ActivationRecord, Manifest, Version, VersionId, VersionStore};

/// A value reference to the version that was active for a family at commit
/// sequence `seq`. Threaded through call sites that need a reproducible view
/// of "current" instead of re-reading live state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActiveVersionToken {
    pub family_id: FamilyId,
    pub family_code: String,
    pub version_id: VersionId,
    pub seq: u64,
}
