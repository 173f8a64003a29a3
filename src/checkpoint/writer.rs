use crate::checkpoint::{CHECKPOINT_FORMAT_VERSION, CHECKPOINT_PREFIX, CHECKPOINT_SUFFIX};
use crate::commit::DbState;
use crate::error::ProvError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub filename: String,
    pub seq: u64,
    pub sha256_hex: String,
    pub created_at_micros: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CheckpointData {
    pub format_version: u32,
    pub seq: u64,
    pub state: DbState,
}

/// Writes `state` as `checkpoint_<seq>.provdb.zst` in `dir`: msgpack, zstd,
/// then a SHA-256 trailer over the compressed bytes. The file appears
/// atomically via rename.
pub fn write_checkpoint(state: &DbState, dir: &Path) -> Result<CheckpointMeta, ProvError> {
    fs::create_dir_all(dir)?;
    let checkpoint = CheckpointData {
        format_version: CHECKPOINT_FORMAT_VERSION,
        seq: state.seq,
        state: state.clone(),
    };
    let encoded = rmp_serde::to_vec(&checkpoint).map_err(|e| ProvError::Encode(e.to_string()))?;
    let mut payload = zstd::stream::encode_all(encoded.as_slice(), 3)
        .map_err(|e| ProvError::Io(std::io::Error::other(e.to_string())))?;
    let trailer = Sha256::digest(&payload);
    payload.extend_from_slice(&trailer);

    let hash = Sha256::digest(&payload);
    let filename = format!("{CHECKPOINT_PREFIX}{:016}{CHECKPOINT_SUFFIX}", state.seq);
    let final_path = dir.join(&filename);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&payload)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(&final_path).map_err(|e| ProvError::Io(e.error))?;

    Ok(CheckpointMeta {
        filename,
        seq: state.seq,
        sha256_hex: hex::encode(hash),
        created_at_micros: state.clock_micros,
    })
}
