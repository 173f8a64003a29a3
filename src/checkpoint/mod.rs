pub mod loader;
pub mod writer;

pub use loader::{latest_checkpoint, load_checkpoint};
pub use writer::{CheckpointMeta, write_checkpoint};

/// Bumped whenever the encoded `DbState` layout changes incompatibly.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;
pub(crate) const CHECKPOINT_PREFIX: &str = "checkpoint_";
pub(crate) const CHECKPOINT_SUFFIX: &str = ".provdb.zst";
