//! Binary identity state format: header validation, read, and write.
//!
//! # File layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       4   Magic bytes: b"OVLK"
//!   4       1   Version: 0x01
//!   5     var   State body (bincode-serialized):
//!                 seed               : [u8; 32]
//!                 display_name       : String
//!                 status_message     : String
//!                 saved_peers        : Vec<SavedPeer>
//!                 next_peer_id       : u32
//!                 next_conference_id : u32
//!                 created_at         : Timestamp
//! ```
//!
//! Magic and version are verified **before** any deserialization to
//! prevent feeding malformed data to bincode.
//!
//! All writes are atomic: serialize → write tmp → fsync → rename. A crash
//! mid-write leaves at worst a stale temporary file; the state file itself
//! is always either the previous complete version or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use overlink_types::{OverlinkError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::identity::{IdentityState, SavedPeer};
use crate::keys::Keypair;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes identifying an Overlink identity state file.
pub const STATE_MAGIC: [u8; 4] = *b"OVLK";

/// Current state file format version.
pub const STATE_VERSION: u8 = 1;

/// Header size: magic (4) + version (1).
const HEADER_SIZE: usize = 4 + 1;

/// Minimum state body size in bytes.
///
/// The fixed fields of an empty-profile body (seed, length prefixes,
/// id counters, timestamp string) alone exceed this. A generous lower
/// bound to catch obviously truncated files before deserialization.
const MIN_BODY_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// StateBody
// ---------------------------------------------------------------------------

/// Internal bincode-serializable representation of the state body.
///
/// Carries the raw keypair seed, so instances are zeroized on drop.
#[derive(Serialize, Deserialize)]
struct StateBody {
    seed: [u8; 32],
    display_name: String,
    status_message: String,
    saved_peers: Vec<SavedPeer>,
    next_peer_id: u32,
    next_conference_id: u32,
    created_at: overlink_types::Timestamp,
}

impl StateBody {
    fn from_state(state: &IdentityState) -> Self {
        Self {
            seed: state.keypair().seed_bytes(),
            display_name: state.display_name().to_string(),
            status_message: state.status_message().to_string(),
            saved_peers: state.saved_peers().to_vec(),
            next_peer_id: state.next_peer_id(),
            next_conference_id: state.next_conference_id(),
            created_at: state.created_at().clone(),
        }
    }

    /// Rebuilds the in-memory state. The seed stays inside `self` and is
    /// wiped when the body is dropped.
    fn to_state(&self) -> IdentityState {
        IdentityState::from_parts(
            Keypair::from_seed(&self.seed),
            self.display_name.clone(),
            self.status_message.clone(),
            self.saved_peers.clone(),
            self.next_peer_id,
            self.next_conference_id,
            self.created_at.clone(),
        )
    }
}

impl Drop for StateBody {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

fn encode_state(state: &IdentityState) -> Result<Vec<u8>> {
    let body = StateBody::from_state(state);

    let body_bytes = bincode::serialize(&body).map_err(|e| OverlinkError::StorageError {
        reason: format!("failed to serialize identity state body: {e}"),
    })?;

    let mut data = Vec::with_capacity(HEADER_SIZE + body_bytes.len());
    data.extend_from_slice(&STATE_MAGIC);
    data.push(STATE_VERSION);
    data.extend_from_slice(&body_bytes);
    Ok(data)
}

/// Validates and decodes a state file image.
///
/// # Validation order
///
/// 1. File size ≥ header + minimum body.
/// 2. Magic bytes match `b"OVLK"`.
/// 3. Version byte matches current version (`0x01`).
/// 4. State body deserialized via `bincode`.
///
/// # Errors
///
/// Returns [`OverlinkError::IdentityCorrupt`] for any failure. Callers
/// must treat this as fatal: a half-parsed identity must never be used,
/// and silently regenerating keys would change the peer's address.
fn decode_state(data: &[u8]) -> Result<IdentityState> {
    // 1. Minimum size check.
    let min_file_size = HEADER_SIZE + MIN_BODY_SIZE;
    if data.len() < min_file_size {
        return Err(OverlinkError::IdentityCorrupt {
            reason: format!(
                "state file truncated: expected at least {min_file_size} bytes, got {}",
                data.len()
            ),
        });
    }

    // 2. Magic bytes.
    let magic = &data[0..4];
    if magic != STATE_MAGIC {
        return Err(OverlinkError::IdentityCorrupt {
            reason: format!(
                "state file magic mismatch: expected {:?}, got {:?}",
                &STATE_MAGIC, magic
            ),
        });
    }

    // 3. Version byte.
    let version = data[4];
    if version != STATE_VERSION {
        return Err(OverlinkError::IdentityCorrupt {
            reason: format!(
                "state file version mismatch: expected {STATE_VERSION}, got {version}"
            ),
        });
    }

    // 4. Deserialize state body.
    let body: StateBody =
        bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| OverlinkError::IdentityCorrupt {
            reason: format!("failed to deserialize identity state body: {e}"),
        })?;

    Ok(body.to_state())
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Reads and validates an identity state file from disk.
///
/// # Errors
///
/// - [`OverlinkError::StorageError`] if the file cannot be read.
/// - [`OverlinkError::IdentityCorrupt`] if the contents fail validation.
pub fn read_state_file(path: &Path) -> Result<IdentityState> {
    let data = std::fs::read(path).map_err(|e| OverlinkError::StorageError {
        reason: format!("failed to read identity state file: {e}"),
    })?;
    decode_state(&data)
}

/// Writes an identity state file to disk atomically.
///
/// # Atomic write flow
///
/// 1. Encode header + body.
/// 2. Determine temporary file path (same directory).
/// 3. Write to temporary file + fsync.
/// 4. Rename temporary file over the state file.
///
/// If any step fails, the original file is untouched.
pub fn write_state_file(path: &Path, state: &IdentityState) -> Result<()> {
    // 1. Encode.
    let data = encode_state(state)?;

    // 2. Temporary file path.
    let tmp_path = tmp_path(path)?;

    // 3. Write to temporary file + fsync.
    {
        let mut file =
            std::fs::File::create(&tmp_path).map_err(|e| OverlinkError::StorageError {
                reason: format!("failed to create temp state file: {e}"),
            })?;

        file.write_all(&data).map_err(|e| OverlinkError::StorageError {
            reason: format!("failed to write temp state file: {e}"),
        })?;

        file.sync_all().map_err(|e| OverlinkError::StorageError {
            reason: format!("failed to fsync temp state file: {e}"),
        })?;
    }

    // 4. Atomic rename.
    std::fs::rename(&tmp_path, path).map_err(|e| {
        // Best-effort cleanup of temp file.
        let _ = std::fs::remove_file(&tmp_path);
        OverlinkError::StorageError {
            reason: format!("failed to rename temp state file: {e}"),
        }
    })?;

    Ok(())
}

/// Generates a temporary file path in the same directory as `path`.
fn tmp_path(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| OverlinkError::StorageError {
        reason: "state file path has no parent directory".into(),
    })?;

    // Ensure parent directory exists.
    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| OverlinkError::StorageError {
            reason: format!("failed to create state file directory: {e}"),
        })?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("identity.dat");

    Ok(parent.join(format!(".{}.tmp", file_name)))
}

// ---------------------------------------------------------------------------
// IdentityStore
// ---------------------------------------------------------------------------

/// Handle to the identity state file.
///
/// Owns the path and nothing else; the engine holds the decoded
/// [`IdentityState`] and calls [`persist`](Self::persist) after mutations.
#[derive(Clone, Debug)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Creates a store handle for the given state file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the identity, or generates and persists a fresh one if the
    /// state file does not exist yet.
    ///
    /// A fresh identity is written to disk **before** this returns, so a
    /// crash immediately after startup cannot lose the new keys.
    ///
    /// # Errors
    ///
    /// - [`OverlinkError::IdentityCorrupt`] if an existing file fails
    ///   validation. This is fatal by contract; the caller must not
    ///   retry with a regenerated identity.
    /// - [`OverlinkError::StorageError`] for I/O failures.
    pub fn load_or_create(&self) -> Result<IdentityState> {
        match std::fs::read(&self.path) {
            Ok(data) => {
                let state = decode_state(&data)?;
                info!(
                    address = %state.address(),
                    peers = state.saved_peers().len(),
                    "loaded identity state"
                );
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let state = IdentityState::generate();
                write_state_file(&self.path, &state)?;
                info!(address = %state.address(), "created new identity");
                Ok(state)
            }
            Err(e) => Err(OverlinkError::StorageError {
                reason: format!("failed to read identity state file: {e}"),
            }),
        }
    }

    /// Persists the current state atomically.
    pub fn persist(&self, state: &IdentityState) -> Result<()> {
        write_state_file(&self.path, state)?;
        debug!(path = %self.path.display(), "persisted identity state");
        Ok(())
    }
}
