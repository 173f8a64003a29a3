use crate::checkpoint::writer::CheckpointData;
use crate::checkpoint::{CHECKPOINT_FORMAT_VERSION, CHECKPOINT_PREFIX, CHECKPOINT_SUFFIX};
use crate::commit::DbState;
use crate::error::ProvError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Loads and verifies a checkpoint. The decoded state must pass
/// `DbState::check_invariants` (notably at most one active version per family).
pub fn load_checkpoint(path: &Path) -> Result<DbState, ProvError> {
    let state = decode_checkpoint(path)?;
    state.check_invariants()?;
    Ok(state)
}

/// Hash-verified decode without the state invariant check.
pub(crate) fn decode_checkpoint(path: &Path) -> Result<DbState, ProvError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 32 {
        return Err(ProvError::Decode("checkpoint too small".into()));
    }
    let (compressed, trailer_hash) = bytes.split_at(bytes.len() - 32);
    let actual = Sha256::digest(compressed);
    if actual.as_slice() != trailer_hash {
        return Err(ProvError::IntegrityError {
            message: format!("checkpoint hash mismatch: {}", path.display()),
        });
    }
    let decompressed = zstd::stream::decode_all(compressed)
        .map_err(|e| ProvError::Io(std::io::Error::other(e.to_string())))?;
    let data: CheckpointData =
        rmp_serde::from_slice(&decompressed).map_err(|e| ProvError::Decode(e.to_string()))?;
    if data.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(ProvError::Decode(format!(
            "unsupported checkpoint format {}",
            data.format_version
        )));
    }
    if data.seq != data.state.seq {
        return Err(ProvError::IntegrityError {
            message: format!(
                "checkpoint header seq {} disagrees with state seq {}",
                data.seq, data.state.seq
            ),
        });
    }
    Ok(data.state)
}

/// Highest-sequence checkpoint file in `dir`, if any.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>, ProvError> {
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(seq) = name
            .strip_prefix(CHECKPOINT_PREFIX)
            .and_then(|rest| rest.strip_suffix(CHECKPOINT_SUFFIX))
            .and_then(|digits| digits.parse::<u64>().ok())
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(best_seq, _)| seq > *best_seq) {
            best = Some((seq, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::{latest_checkpoint, load_checkpoint};
    use crate::checkpoint::writer::write_checkpoint;
    use crate::commit::DbState;
    use crate::error::ProvErrorCode;
    use crate::versioning::Manifest;
    use tempfile::tempdir;

    fn sample_state(seq: u64) -> DbState {
        let mut state = DbState::default();
        let family = state
            .families
            .create("network", "Network", "pipes", 1, 10)
            .expect("family");
        let version = state
            .versions
            .create(
                state.families.require(family).expect("family"),
                "1.0.0",
                Manifest::new(),
                "initial",
                1,
                11,
            )
            .expect("version");
        state.versions.activate(version, 1, 12, seq).expect("activate");
        state.seq = seq;
        state.clock_micros = 12;
        state
    }

    #[test]
    fn checkpoint_roundtrip_preserves_registries() {
        let dir = tempdir().expect("temp");
        let state = sample_state(42);
        let meta = write_checkpoint(&state, dir.path()).expect("checkpoint");
        assert_eq!(meta.seq, 42);
        let loaded = load_checkpoint(&dir.path().join(&meta.filename)).expect("load");
        assert_eq!(loaded.seq, 42);
        assert_eq!(loaded.families.len(), 1);
        let family = loaded.families.require_by_code("network").expect("family");
        assert!(loaded.versions.active_for(family.id).is_some());
        assert_eq!(loaded.directory.len(), state.directory.len());
    }

    #[test]
    fn checkpoint_loader_rejects_hash_mismatch() {
        let dir = tempdir().expect("temp");
        let meta = write_checkpoint(&DbState::default(), dir.path()).expect("write");
        let path = dir.path().join(meta.filename);
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[0] ^= 0xAA;
        std::fs::write(&path, bytes).expect("write");
        let err = load_checkpoint(&path).expect_err("corrupt");
        assert_eq!(err.code(), ProvErrorCode::IntegrityError);
    }

    #[test]
    fn latest_checkpoint_picks_highest_seq() {
        let dir = tempdir().expect("temp");
        assert!(latest_checkpoint(dir.path()).expect("scan").is_none());
        write_checkpoint(&sample_state(3), dir.path()).expect("write 3");
        write_checkpoint(&sample_state(17), dir.path()).expect("write 17");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("noise");
        let latest = latest_checkpoint(dir.path()).expect("scan").expect("some");
        assert!(latest.to_string_lossy().ends_with("checkpoint_0000000000000017.provdb.zst"));
    }
}
