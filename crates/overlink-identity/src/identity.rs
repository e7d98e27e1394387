//! In-memory identity state: keys, profile, and session bookkeeping.
//!
//! [`IdentityState`] is the mutable, in-memory form of everything the
//! state file persists: the keypair, the display profile, the peers the
//! local identity has accepted, and the id allocators that keep peer and
//! conference ids stable across restarts.

use std::fmt;

use overlink_types::{ConferenceId, PeerId, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

use crate::address::PublicAddress;
use crate::keys::Keypair;

/// Display name assigned to freshly generated identities.
pub const DEFAULT_DISPLAY_NAME: &str = "overlink";

// ---------------------------------------------------------------------------
// SavedPeer
// ---------------------------------------------------------------------------

/// A peer the local identity has accepted, as persisted in the state file.
///
/// The pairing of [`PeerId`] and [`PublicKey`] is what keeps peer ids
/// stable across restarts: a reconnecting peer is recognised by key and
/// handed back the same id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SavedPeer {
    /// Engine-local id assigned when the peer was first accepted.
    pub peer: PeerId,
    /// The peer's long-term Ed25519 public key.
    pub public_key: PublicKey,
}

// ---------------------------------------------------------------------------
// IdentityState
// ---------------------------------------------------------------------------

/// The local peer's complete mutable identity.
///
/// Owns the [`Keypair`] and all state that must survive restarts. The
/// engine mutates this through the accessors below and asks
/// [`crate::store::IdentityStore`] to persist it after changes.
pub struct IdentityState {
    keypair: Keypair,
    display_name: String,
    status_message: String,
    saved_peers: Vec<SavedPeer>,
    next_peer_id: u32,
    next_conference_id: u32,
    created_at: Timestamp,
}

impl IdentityState {
    /// Generates a fresh identity with a random keypair and default profile.
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            status_message: String::new(),
            saved_peers: Vec::new(),
            next_peer_id: 0,
            next_conference_id: 0,
            created_at: Timestamp::now(),
        }
    }

    /// Reassembles an identity from its persisted parts.
    ///
    /// Used by the state store after decoding a state file, and by tests
    /// that need a deterministic identity.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        keypair: Keypair,
        display_name: String,
        status_message: String,
        saved_peers: Vec<SavedPeer>,
        next_peer_id: u32,
        next_conference_id: u32,
        created_at: Timestamp,
    ) -> Self {
        Self {
            keypair,
            display_name,
            status_message,
            saved_peers,
            next_peer_id,
            next_conference_id,
            created_at,
        }
    }

    /// Returns the identity keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Returns the long-term public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Derives the checksummed public address for this identity.
    ///
    /// Deterministic: the same keypair always yields the same address.
    pub fn address(&self) -> PublicAddress {
        PublicAddress::from_public_key(&self.keypair.public_key())
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Replaces the display name.
    pub fn set_display_name(&mut self, name: &str) {
        self.display_name = name.to_string();
    }

    /// Returns the status message.
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Replaces the status message.
    pub fn set_status_message(&mut self, text: &str) {
        self.status_message = text.to_string();
    }

    /// Returns the accepted peers in acceptance order.
    pub fn saved_peers(&self) -> &[SavedPeer] {
        &self.saved_peers
    }

    /// Looks up a saved peer by public key.
    pub fn find_saved_peer(&self, public_key: &PublicKey) -> Option<&SavedPeer> {
        self.saved_peers.iter().find(|p| p.public_key == *public_key)
    }

    /// Records an accepted peer. Idempotent: a key that is already saved
    /// keeps its original id and ordering.
    pub fn remember_peer(&mut self, peer: PeerId, public_key: PublicKey) {
        if self.find_saved_peer(&public_key).is_none() {
            self.saved_peers.push(SavedPeer { peer, public_key });
        }
    }

    /// Hands out the next peer id. Ids are never reused within the
    /// lifetime of an identity.
    pub fn allocate_peer_id(&mut self) -> PeerId {
        let id = PeerId::new(self.next_peer_id);
        self.next_peer_id += 1;
        id
    }

    /// Hands out the next conference id. Ids are never reused within the
    /// lifetime of an identity.
    pub fn allocate_conference_id(&mut self) -> ConferenceId {
        let id = ConferenceId::new(self.next_conference_id);
        self.next_conference_id += 1;
        id
    }

    /// Returns the next peer id that would be allocated.
    pub fn next_peer_id(&self) -> u32 {
        self.next_peer_id
    }

    /// Returns the next conference id that would be allocated.
    pub fn next_conference_id(&self) -> u32 {
        self.next_conference_id
    }

    /// Returns when this identity was first generated.
    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }
}

impl fmt::Debug for IdentityState {
    /// Redacted: prints the public address and profile, never key material.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityState")
            .field("address", &self.address().to_string())
            .field("display_name", &self.display_name)
            .field("status_message", &self.status_message)
            .field("saved_peers", &self.saved_peers.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
