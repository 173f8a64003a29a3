pub mod reader;

pub use reader::{ActiveVersionSummary, SnapshotReadView};
