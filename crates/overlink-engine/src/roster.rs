//! Peer, conference, and pending-call tables.
//!
//! The engine resolves overlay-level identifiers (public keys, group
//! keys) to compact engine-local ids at translation time; these tables
//! are the two-way maps behind that. Iteration order is id order, so
//! status listings are stable.

use std::collections::{BTreeMap, HashMap};

use overlink_types::{
    ConferenceId, ConferenceKind, ConferenceMember, Connectivity, GroupKey, MemberId, PeerId,
    PublicKey,
};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An accepted peer as the engine tracks it.
#[derive(Clone, Debug)]
pub struct Peer {
    /// Engine-local id, stable across restarts.
    pub id: PeerId,
    /// Long-term public key.
    pub public_key: PublicKey,
    /// Last reachability reported by the overlay.
    pub connectivity: Connectivity,
}

/// A joined conference.
#[derive(Clone, Debug)]
pub struct Conference {
    /// Engine-local id.
    pub id: ConferenceId,
    /// Text-only or audio/video.
    pub kind: ConferenceKind,
    /// Overlay-level group key.
    pub group: GroupKey,
    /// Current membership; empty until the first roster event arrives.
    pub members: Vec<ConferenceMember>,
}

impl Conference {
    /// The local identity's member slot, once the roster is known.
    pub fn self_member(&self) -> Option<MemberId> {
        self.members.iter().find(|m| m.is_self).map(|m| m.member)
    }
}

/// A call offer waiting for an answer.
#[derive(Clone, Copy, Debug)]
pub struct PendingCall {
    /// The calling peer.
    pub peer: PeerId,
    /// Caller wants to send audio.
    pub audio: bool,
    /// Caller wants to send video.
    pub video: bool,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Peer table indexed by id and by public key.
#[derive(Default)]
pub struct Roster {
    peers: BTreeMap<PeerId, Peer>,
    by_key: HashMap<PublicKey, PeerId>,
}

impl Roster {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a peer, keeping both indexes consistent.
    pub fn insert(&mut self, peer: Peer) {
        self.by_key.insert(peer.public_key, peer.id);
        self.peers.insert(peer.id, peer);
    }

    /// Looks a peer up by id.
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// Looks a peer up by public key.
    pub fn by_key(&self, key: &PublicKey) -> Option<&Peer> {
        self.by_key.get(key).and_then(|id| self.peers.get(id))
    }

    /// Mutable lookup by public key, for connectivity updates.
    pub fn by_key_mut(&mut self, key: &PublicKey) -> Option<&mut Peer> {
        match self.by_key.get(key) {
            Some(id) => self.peers.get_mut(id),
            None => None,
        }
    }

    /// Resolves a public key to its engine-local id.
    pub fn id_for_key(&self, key: &PublicKey) -> Option<PeerId> {
        self.by_key.get(key).copied()
    }

    /// All peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ConferenceTable
// ---------------------------------------------------------------------------

/// Conference table indexed by id and by group key.
#[derive(Default)]
pub struct ConferenceTable {
    conferences: BTreeMap<ConferenceId, Conference>,
    by_group: HashMap<GroupKey, ConferenceId>,
}

impl ConferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a conference, keeping both indexes consistent.
    pub fn insert(&mut self, conference: Conference) {
        self.by_group.insert(conference.group, conference.id);
        self.conferences.insert(conference.id, conference);
    }

    /// Looks a conference up by id.
    pub fn get(&self, id: ConferenceId) -> Option<&Conference> {
        self.conferences.get(&id)
    }

    /// Mutable lookup by group key, for roster updates.
    pub fn by_group_mut(&mut self, group: &GroupKey) -> Option<&mut Conference> {
        match self.by_group.get(group) {
            Some(id) => self.conferences.get_mut(id),
            None => None,
        }
    }

    /// Resolves a group key to its engine-local id.
    pub fn id_for_group(&self, group: &GroupKey) -> Option<ConferenceId> {
        self.by_group.get(group).copied()
    }

    /// All conferences in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Conference> {
        self.conferences.values()
    }

    /// Number of joined conferences.
    pub fn len(&self) -> usize {
        self.conferences.len()
    }

    /// True if no conference is tracked.
    pub fn is_empty(&self) -> bool {
        self.conferences.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
