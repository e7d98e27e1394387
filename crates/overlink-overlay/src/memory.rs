//! In-memory reference overlay.
//!
//! [`OverlayHub`] is an in-process switchboard. Every [`MemoryOverlay`]
//! endpoint created from the same hub shares its state, so an event one
//! endpoint produces lands in the recipient's queue immediately. The
//! echo daemon runs on this overlay (with its configured bootstrap keys
//! registered on the hub), and the engine and bot test suites drive
//! remote peers through it.
//!
//! Delivery guarantees: events from one endpoint arrive at another in
//! production order; events are only queued for attached endpoints;
//! nothing blocks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use overlink_identity::keys::Keypair;
use overlink_types::{
    BootstrapNode, ConferenceKind, ConferenceMember, Connectivity, GroupKey, MemberId,
    MessageKind, OverlinkError, PublicKey, Result,
};
use tracing::warn;

use crate::link::{LinkEvent, Overlay};

/// Delay recommended to idle callers between polls.
const IDLE_DELAY: Duration = Duration::from_millis(50);

/// Leading bytes of a conference invite cookie.
const COOKIE_TAG: [u8; 2] = [0x4F, 0x43];

/// Invite cookie length: tag (2) + group key (32).
const COOKIE_LEN: usize = 2 + GroupKey::LEN;

// ---------------------------------------------------------------------------
// Hub state
// ---------------------------------------------------------------------------

/// Per-endpoint state held by the hub.
struct EndpointState {
    attached: bool,
    display_name: String,
    status_message: String,
    connectivity: Connectivity,
    queue: VecDeque<LinkEvent>,
    peers: HashSet<PublicKey>,
}

impl EndpointState {
    fn new() -> Self {
        Self {
            attached: false,
            display_name: String::new(),
            status_message: String::new(),
            connectivity: Connectivity::Offline,
            queue: VecDeque::new(),
            peers: HashSet::new(),
        }
    }
}

/// A conference as the hub tracks it.
struct HubConference {
    kind: ConferenceKind,
    /// Members in join order. Slots are never reused.
    members: Vec<(MemberId, PublicKey)>,
    next_member: u32,
    audio_sinks: HashSet<PublicKey>,
}

#[derive(Default)]
struct HubState {
    endpoints: HashMap<PublicKey, EndpointState>,
    conferences: HashMap<GroupKey, HubConference>,
    bootstrap_keys: HashSet<PublicKey>,
}

impl HubState {
    /// Queues an event for an endpoint. Detached or unknown endpoints
    /// silently drop the event, like a network dropping frames to a
    /// host that went away.
    fn deliver(&mut self, to: &PublicKey, event: LinkEvent) {
        if let Some(ep) = self.endpoints.get_mut(to) {
            if ep.attached {
                ep.queue.push_back(event);
            }
        }
    }

    fn peers_of(&self, key: &PublicKey) -> Vec<PublicKey> {
        self.endpoints
            .get(key)
            .map(|ep| ep.peers.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_attached(&self, key: &PublicKey) -> bool {
        self.endpoints.get(key).map(|ep| ep.attached).unwrap_or(false)
    }
}

fn lock_state(state: &Mutex<HubState>) -> Result<MutexGuard<'_, HubState>> {
    state.lock().map_err(|e| OverlinkError::OverlayError {
        reason: format!("overlay hub lock poisoned: {e}"),
    })
}

// ---------------------------------------------------------------------------
// OverlayHub
// ---------------------------------------------------------------------------

/// Shared switchboard for [`MemoryOverlay`] endpoints.
///
/// Cloning the hub clones the handle, not the state; all clones and all
/// endpoints observe the same overlay.
#[derive(Clone, Default)]
pub struct OverlayHub {
    state: Arc<Mutex<HubState>>,
}

impl OverlayHub {
    /// Creates an empty hub with no endpoints and no bootstrap nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, unattached endpoint on this hub.
    pub fn endpoint(&self) -> MemoryOverlay {
        MemoryOverlay {
            state: Arc::clone(&self.state),
            key: None,
        }
    }

    /// Registers a key as reachable bootstrap infrastructure.
    /// [`Overlay::bootstrap`] succeeds only against registered keys.
    pub fn add_bootstrap_key(&self, public_key: PublicKey) -> Result<()> {
        lock_state(&self.state)?.bootstrap_keys.insert(public_key);
        Ok(())
    }

    /// Queues a raw link event for an endpoint, bypassing the normal
    /// producers. Lets tests exercise event shapes a well-behaved
    /// endpoint would not produce, such as loopbacks of an endpoint's
    /// own conference messages.
    pub fn inject_event(&self, to: &PublicKey, event: LinkEvent) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        if !state.endpoints.contains_key(to) {
            return Err(OverlinkError::OverlayError {
                reason: format!("no endpoint for key {to}"),
            });
        }
        state.deliver(to, event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryOverlay
// ---------------------------------------------------------------------------

/// One endpoint's view of an [`OverlayHub`].
///
/// Implements [`Overlay`] for the session engine, plus the remote-side
/// driver methods tests use to play the far end of a link (requesting
/// peers, creating conferences, offering calls).
pub struct MemoryOverlay {
    state: Arc<Mutex<HubState>>,
    key: Option<PublicKey>,
}

impl MemoryOverlay {
    /// Returns the key this endpoint is attached as, if any.
    pub fn local_key(&self) -> Option<PublicKey> {
        self.key
    }

    /// Asks another endpoint to become a peer. The request surfaces on
    /// the far side as [`LinkEvent::PeerRequest`].
    pub fn request_peer(&mut self, to: &PublicKey, greeting: &str) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;
        if !state.endpoints.contains_key(to) {
            return Err(OverlinkError::OverlayError {
                reason: format!("no endpoint for key {to}"),
            });
        }
        state.deliver(
            to,
            LinkEvent::PeerRequest {
                public_key: key,
                greeting: greeting.to_string(),
            },
        );
        Ok(())
    }

    /// Creates a conference with this endpoint as its first member and
    /// returns the group key.
    pub fn create_conference(&mut self, kind: ConferenceKind) -> Result<GroupKey> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let group = GroupKey::new(rand::random());
        state.conferences.insert(
            group,
            HubConference {
                kind,
                members: vec![(MemberId::new(0), key)],
                next_member: 1,
                audio_sinks: HashSet::new(),
            },
        );
        state.deliver(
            &key,
            LinkEvent::ConferenceRoster {
                group,
                members: vec![ConferenceMember {
                    member: MemberId::new(0),
                    public_key: key,
                    is_self: true,
                }],
            },
        );
        Ok(group)
    }

    /// Invites a linked peer into a conference this endpoint is a member
    /// of. The invite surfaces on the far side as
    /// [`LinkEvent::ConferenceInvite`] carrying the cookie to join with.
    pub fn invite_to_conference(&mut self, group: &GroupKey, to: &PublicKey) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let kind = {
            let conf = state.conferences.get(group).ok_or_else(|| {
                OverlinkError::OverlayError {
                    reason: format!("unknown conference group {group}"),
                }
            })?;
            if !conf.members.iter().any(|(_, k)| k == &key) {
                return Err(OverlinkError::OverlayError {
                    reason: format!("not a member of conference group {group}"),
                });
            }
            conf.kind
        };

        let linked = state
            .endpoints
            .get(&key)
            .map(|ep| ep.peers.contains(to))
            .unwrap_or(false);
        if !linked {
            return Err(OverlinkError::OverlayError {
                reason: format!("peer {to} is not linked"),
            });
        }

        state.deliver(
            to,
            LinkEvent::ConferenceInvite {
                public_key: key,
                kind,
                cookie: make_cookie(group),
            },
        );
        Ok(())
    }

    /// Starts a call to a linked peer. Surfaces on the far side as
    /// [`LinkEvent::CallOffer`].
    pub fn offer_call(&mut self, to: &PublicKey, audio: bool, video: bool) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let linked = state
            .endpoints
            .get(&key)
            .map(|ep| ep.peers.contains(to))
            .unwrap_or(false);
        if !linked {
            return Err(OverlinkError::OverlayError {
                reason: format!("peer {to} is not linked"),
            });
        }

        state.deliver(
            to,
            LinkEvent::CallOffer {
                public_key: key,
                audio,
                video,
            },
        );
        Ok(())
    }

    fn require_key(&self) -> Result<PublicKey> {
        self.key.ok_or_else(|| OverlinkError::OverlayError {
            reason: "overlay endpoint is not attached".to_string(),
        })
    }
}

impl Overlay for MemoryOverlay {
    fn attach(&mut self, keypair: &Keypair) -> Result<()> {
        let key = keypair.public_key();
        let mut state = lock_state(&self.state)?;

        state
            .endpoints
            .entry(key)
            .or_insert_with(EndpointState::new)
            .attached = true;
        self.key = Some(key);

        // A returning endpoint re-announces itself to previously linked
        // peers, and learns which of them are currently up.
        for peer in state.peers_of(&key) {
            if state.is_attached(&peer) {
                state.deliver(
                    &peer,
                    LinkEvent::PeerConnectivity {
                        public_key: key,
                        connectivity: Connectivity::Direct,
                    },
                );
                state.deliver(
                    &key,
                    LinkEvent::PeerConnectivity {
                        public_key: peer,
                        connectivity: Connectivity::Direct,
                    },
                );
            }
        }
        Ok(())
    }

    fn detach(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        match lock_state(&self.state) {
            Ok(mut state) => {
                if let Some(ep) = state.endpoints.get_mut(&key) {
                    ep.attached = false;
                    ep.connectivity = Connectivity::Offline;
                    ep.queue.clear();
                }
                for peer in state.peers_of(&key) {
                    state.deliver(
                        &peer,
                        LinkEvent::PeerConnectivity {
                            public_key: key,
                            connectivity: Connectivity::Offline,
                        },
                    );
                }
            }
            Err(e) => warn!("{e} (during detach)"),
        }
    }

    fn bootstrap(&mut self, node: &BootstrapNode) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        if !state.bootstrap_keys.contains(&node.public_key) {
            return Err(OverlinkError::BootstrapError {
                reason: format!("bootstrap node {node} is unreachable"),
            });
        }

        let previous = {
            let ep = state.endpoints.get_mut(&key).ok_or_else(|| {
                OverlinkError::OverlayError {
                    reason: format!("no endpoint for key {key}"),
                }
            })?;
            let previous = ep.connectivity;
            ep.connectivity = Connectivity::Direct;
            previous
        };
        if previous != Connectivity::Direct {
            state.deliver(
                &key,
                LinkEvent::SelfConnectivity {
                    connectivity: Connectivity::Direct,
                },
            );
        }
        Ok(())
    }

    fn poll(&mut self, max_events: usize) -> Vec<LinkEvent> {
        let Some(key) = self.key else {
            return Vec::new();
        };
        let mut state = match lock_state(&self.state) {
            Ok(state) => state,
            Err(e) => {
                warn!("{e} (during poll)");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if let Some(ep) = state.endpoints.get_mut(&key) {
            while events.len() < max_events {
                match ep.queue.pop_front() {
                    Some(event) => events.push(event),
                    None => break,
                }
            }
        }
        events
    }

    fn recommended_delay(&self) -> Duration {
        let Some(key) = self.key else {
            return IDLE_DELAY;
        };
        match lock_state(&self.state) {
            Ok(state) => {
                let pending = state
                    .endpoints
                    .get(&key)
                    .map(|ep| !ep.queue.is_empty())
                    .unwrap_or(false);
                if pending {
                    Duration::ZERO
                } else {
                    IDLE_DELAY
                }
            }
            Err(_) => IDLE_DELAY,
        }
    }

    fn add_peer(&mut self, public_key: &PublicKey) -> Result<()> {
        let key = self.require_key()?;
        if public_key == &key {
            return Err(OverlinkError::OverlayError {
                reason: "cannot add own key as peer".to_string(),
            });
        }
        let mut state = lock_state(&self.state)?;
        if !state.endpoints.contains_key(public_key) {
            return Err(OverlinkError::OverlayError {
                reason: format!("no endpoint for key {public_key}"),
            });
        }

        if let Some(ep) = state.endpoints.get_mut(&key) {
            ep.peers.insert(*public_key);
        }
        if let Some(ep) = state.endpoints.get_mut(public_key) {
            ep.peers.insert(key);
        }

        if state.is_attached(public_key) {
            state.deliver(
                public_key,
                LinkEvent::PeerConnectivity {
                    public_key: key,
                    connectivity: Connectivity::Direct,
                },
            );
            state.deliver(
                &key,
                LinkEvent::PeerConnectivity {
                    public_key: *public_key,
                    connectivity: Connectivity::Direct,
                },
            );
        }
        Ok(())
    }

    fn send_message(
        &mut self,
        public_key: &PublicKey,
        kind: MessageKind,
        text: &str,
    ) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let linked = state
            .endpoints
            .get(&key)
            .map(|ep| ep.peers.contains(public_key))
            .unwrap_or(false);
        if !linked {
            return Err(OverlinkError::OverlayError {
                reason: format!("peer {public_key} is not linked"),
            });
        }

        state.deliver(
            public_key,
            LinkEvent::PeerMessage {
                public_key: key,
                kind,
                text: text.to_string(),
            },
        );
        Ok(())
    }

    fn join_conference(&mut self, cookie: &[u8]) -> Result<GroupKey> {
        let key = self.require_key()?;

        // 1. Cookie length.
        if cookie.len() != COOKIE_LEN {
            return Err(OverlinkError::InvalidInvite {
                reason: format!(
                    "cookie length mismatch: expected {COOKIE_LEN} bytes, got {}",
                    cookie.len()
                ),
            });
        }

        // 2. Cookie tag.
        if cookie[..2] != COOKIE_TAG {
            return Err(OverlinkError::InvalidInvite {
                reason: "cookie tag mismatch".to_string(),
            });
        }

        // 3. The conference must still exist.
        let mut group_bytes = [0u8; 32];
        group_bytes.copy_from_slice(&cookie[2..]);
        let group = GroupKey::new(group_bytes);

        let mut state = lock_state(&self.state)?;
        let members = {
            let conf = state.conferences.get_mut(&group).ok_or_else(|| {
                OverlinkError::InvalidInvite {
                    reason: "cookie refers to an unknown conference".to_string(),
                }
            })?;

            // 4. Add as member; rejoining keeps the original slot.
            if !conf.members.iter().any(|(_, k)| k == &key) {
                let member = MemberId::new(conf.next_member);
                conf.next_member += 1;
                conf.members.push((member, key));
            }
            conf.members.clone()
        };

        // 5. Everyone sees the updated roster.
        for (_, member_key) in &members {
            let roster: Vec<ConferenceMember> = members
                .iter()
                .map(|(member, k)| ConferenceMember {
                    member: *member,
                    public_key: *k,
                    is_self: k == member_key,
                })
                .collect();
            state.deliver(
                member_key,
                LinkEvent::ConferenceRoster {
                    group,
                    members: roster,
                },
            );
        }

        Ok(group)
    }

    fn send_conference_message(
        &mut self,
        group: &GroupKey,
        kind: MessageKind,
        text: &str,
        exclude: &[MemberId],
    ) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let (origin, members) = {
            let conf = state.conferences.get(group).ok_or_else(|| {
                OverlinkError::OverlayError {
                    reason: format!("unknown conference group {group}"),
                }
            })?;
            let origin = conf
                .members
                .iter()
                .find(|(_, k)| k == &key)
                .map(|(member, _)| *member)
                .ok_or_else(|| OverlinkError::OverlayError {
                    reason: format!("not a member of conference group {group}"),
                })?;
            (origin, conf.members.clone())
        };

        for (member, member_key) in members {
            if exclude.contains(&member) {
                continue;
            }
            state.deliver(
                &member_key,
                LinkEvent::ConferenceMessage {
                    group: *group,
                    member: origin,
                    kind,
                    text: text.to_string(),
                    from_self: member_key == key,
                },
            );
        }
        Ok(())
    }

    fn attach_audio_sink(&mut self, group: &GroupKey) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let conf = state.conferences.get_mut(group).ok_or_else(|| {
            OverlinkError::OverlayError {
                reason: format!("unknown conference group {group}"),
            }
        })?;
        if conf.kind != ConferenceKind::AudioVideo {
            return Err(OverlinkError::OverlayError {
                reason: format!("conference group {group} has no audio channel"),
            });
        }
        if !conf.members.iter().any(|(_, k)| k == &key) {
            return Err(OverlinkError::OverlayError {
                reason: format!("not a member of conference group {group}"),
            });
        }
        conf.audio_sinks.insert(key);
        Ok(())
    }

    fn respond_call(&mut self, public_key: &PublicKey, accept: bool) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;

        let linked = state
            .endpoints
            .get(&key)
            .map(|ep| ep.peers.contains(public_key))
            .unwrap_or(false);
        if !linked {
            return Err(OverlinkError::OverlayError {
                reason: format!("peer {public_key} is not linked"),
            });
        }

        state.deliver(
            public_key,
            LinkEvent::CallAnswered {
                public_key: key,
                accept,
            },
        );
        Ok(())
    }

    fn set_profile(&mut self, name: &str, status: &str) -> Result<()> {
        let key = self.require_key()?;
        let mut state = lock_state(&self.state)?;
        let ep = state.endpoints.get_mut(&key).ok_or_else(|| {
            OverlinkError::OverlayError {
                reason: format!("no endpoint for key {key}"),
            }
        })?;
        ep.display_name = name.to_string();
        ep.status_message = status.to_string();
        Ok(())
    }
}

/// Builds the invite cookie for a conference group.
fn make_cookie(group: &GroupKey) -> Vec<u8> {
    let mut cookie = Vec::with_capacity(COOKIE_LEN);
    cookie.extend_from_slice(&COOKIE_TAG);
    cookie.extend_from_slice(group.as_bytes());
    cookie
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Attached endpoints for seeds 0x11 and 0x22.
    fn attached_pair() -> (OverlayHub, MemoryOverlay, PublicKey, MemoryOverlay, PublicKey) {
        let hub = OverlayHub::new();
        let kp_a = Keypair::from_seed(&[0x11; 32]);
        let kp_b = Keypair::from_seed(&[0x22; 32]);
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();
        a.attach(&kp_a).unwrap();
        b.attach(&kp_b).unwrap();
        (hub, a, kp_a.public_key(), b, kp_b.public_key())
    }

    /// Links two attached endpoints and drains the connectivity events.
    fn link(a: &mut MemoryOverlay, b_key: &PublicKey, b: &mut MemoryOverlay) {
        a.add_peer(b_key).unwrap();
        a.poll(16);
        b.poll(16);
    }

    #[test]
    fn peer_request_and_message_roundtrip() {
        let (_hub, mut a, key_a, mut b, key_b) = attached_pair();

        b.request_peer(&key_a, "hello there").unwrap();
        let events = a.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::PeerRequest { public_key, greeting }]
                if *public_key == key_b && greeting == "hello there"
        ));

        a.add_peer(&key_b).unwrap();
        // Both sides observe the link coming up.
        assert!(a.poll(16).iter().any(|e| matches!(
            e,
            LinkEvent::PeerConnectivity { public_key, connectivity: Connectivity::Direct }
                if *public_key == key_b
        )));
        assert!(b.poll(16).iter().any(|e| matches!(
            e,
            LinkEvent::PeerConnectivity { public_key, connectivity: Connectivity::Direct }
                if *public_key == key_a
        )));

        a.send_message(&key_b, MessageKind::Action, "waves").unwrap();
        let events = b.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::PeerMessage { public_key, kind: MessageKind::Action, text }]
                if *public_key == key_a && text == "waves"
        ));
    }

    #[test]
    fn send_to_unlinked_peer_fails() {
        let (_hub, mut a, _key_a, _b, key_b) = attached_pair();
        let result = a.send_message(&key_b, MessageKind::Normal, "hi");
        assert!(matches!(result, Err(OverlinkError::OverlayError { .. })));
    }

    #[test]
    fn unattached_endpoint_rejects_commands() {
        let hub = OverlayHub::new();
        let mut endpoint = hub.endpoint();
        assert!(matches!(
            endpoint.send_message(&PublicKey::new([1; 32]), MessageKind::Normal, "x"),
            Err(OverlinkError::OverlayError { .. })
        ));
        assert!(endpoint.poll(16).is_empty());
    }

    #[test]
    fn bootstrap_against_registered_key_comes_online() {
        let (hub, mut a, _key_a, _b, _key_b) = attached_pair();
        let node_key = PublicKey::new([0x77; 32]);
        hub.add_bootstrap_key(node_key).unwrap();

        let node = BootstrapNode {
            host: "node.overlink.example".to_string(),
            port: 33445,
            public_key: node_key,
        };
        a.bootstrap(&node).unwrap();

        let events = a.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::SelfConnectivity { connectivity: Connectivity::Direct }]
        ));

        // Idempotent: a second bootstrap produces no duplicate event.
        a.bootstrap(&node).unwrap();
        assert!(a.poll(16).is_empty());
    }

    #[test]
    fn bootstrap_against_unknown_key_fails() {
        let (_hub, mut a, _key_a, _b, _key_b) = attached_pair();
        let node = BootstrapNode {
            host: "nowhere.example".to_string(),
            port: 33445,
            public_key: PublicKey::new([0x99; 32]),
        };
        assert!(matches!(
            a.bootstrap(&node),
            Err(OverlinkError::BootstrapError { .. })
        ));
    }

    #[test]
    fn poll_respects_max_events_and_order() {
        let (_hub, mut a, _key_a, mut b, key_b) = attached_pair();
        link(&mut a, &key_b, &mut b);

        for i in 0..5 {
            a.send_message(&key_b, MessageKind::Normal, &format!("msg {i}"))
                .unwrap();
        }

        let first = b.poll(2);
        assert_eq!(first.len(), 2);
        let second = b.poll(16);
        assert_eq!(second.len(), 3);

        let texts: Vec<&str> = first
            .iter()
            .chain(second.iter())
            .filter_map(|e| match e {
                LinkEvent::PeerMessage { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn recommended_delay_tracks_queue() {
        let (_hub, mut a, _key_a, mut b, key_b) = attached_pair();
        link(&mut a, &key_b, &mut b);
        assert_eq!(b.recommended_delay(), IDLE_DELAY);

        a.send_message(&key_b, MessageKind::Normal, "wake up").unwrap();
        assert_eq!(b.recommended_delay(), Duration::ZERO);

        b.poll(16);
        assert_eq!(b.recommended_delay(), IDLE_DELAY);
    }

    #[test]
    fn conference_invite_join_and_roster() {
        let (_hub, mut a, key_a, mut b, key_b) = attached_pair();
        link(&mut a, &key_b, &mut b);

        let group = a.create_conference(ConferenceKind::Text).unwrap();
        a.poll(16);
        a.invite_to_conference(&group, &key_b).unwrap();

        let events = b.poll(16);
        let cookie = events
            .iter()
            .find_map(|e| match e {
                LinkEvent::ConferenceInvite {
                    public_key,
                    kind: ConferenceKind::Text,
                    cookie,
                } if *public_key == key_a => Some(cookie.clone()),
                _ => None,
            })
            .expect("invite not delivered");

        let joined = b.join_conference(&cookie).unwrap();
        assert_eq!(joined, group);

        // B's roster marks B as self; A's roster marks A as self.
        let roster_of = |events: &[LinkEvent]| -> Vec<ConferenceMember> {
            events
                .iter()
                .rev()
                .find_map(|e| match e {
                    LinkEvent::ConferenceRoster { members, .. } => Some(members.clone()),
                    _ => None,
                })
                .expect("roster not delivered")
        };
        let b_roster = roster_of(&b.poll(16));
        assert_eq!(b_roster.len(), 2);
        assert!(b_roster.iter().any(|m| m.public_key == key_b && m.is_self));
        assert!(b_roster.iter().any(|m| m.public_key == key_a && !m.is_self));

        let a_roster = roster_of(&a.poll(16));
        assert!(a_roster.iter().any(|m| m.public_key == key_a && m.is_self));

        // Rejoining keeps the original slot and does not duplicate.
        let again = b.join_conference(&cookie).unwrap();
        assert_eq!(again, group);
        assert_eq!(roster_of(&b.poll(16)).len(), 2);
    }

    #[test]
    fn malformed_cookies_are_invalid_invites() {
        let (_hub, mut a, _key_a, _b, _key_b) = attached_pair();

        // Wrong length.
        assert!(matches!(
            a.join_conference(&[0x4F, 0x43, 0x01]),
            Err(OverlinkError::InvalidInvite { .. })
        ));

        // Wrong tag.
        let mut bad_tag = vec![0xDE, 0xAD];
        bad_tag.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            a.join_conference(&bad_tag),
            Err(OverlinkError::InvalidInvite { .. })
        ));

        // Well-formed but referring to nothing.
        let unknown = make_cookie(&GroupKey::new([0xEE; 32]));
        assert!(matches!(
            a.join_conference(&unknown),
            Err(OverlinkError::InvalidInvite { .. })
        ));
    }

    #[test]
    fn conference_message_excludes_listed_members() {
        let hub = OverlayHub::new();
        let kp_a = Keypair::from_seed(&[0x11; 32]);
        let kp_b = Keypair::from_seed(&[0x22; 32]);
        let kp_c = Keypair::from_seed(&[0x33; 32]);
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();
        let mut c = hub.endpoint();
        a.attach(&kp_a).unwrap();
        b.attach(&kp_b).unwrap();
        c.attach(&kp_c).unwrap();
        link(&mut a, &kp_b.public_key(), &mut b);
        link(&mut a, &kp_c.public_key(), &mut c);

        let group = a.create_conference(ConferenceKind::Text).unwrap();
        a.invite_to_conference(&group, &kp_b.public_key()).unwrap();
        a.invite_to_conference(&group, &kp_c.public_key()).unwrap();
        let join = |ep: &mut MemoryOverlay| {
            let cookie = ep
                .poll(16)
                .into_iter()
                .find_map(|e| match e {
                    LinkEvent::ConferenceInvite { cookie, .. } => Some(cookie),
                    _ => None,
                })
                .expect("invite not delivered");
            ep.join_conference(&cookie).unwrap()
        };
        join(&mut b);
        join(&mut c);
        a.poll(16);
        b.poll(16);
        c.poll(16);

        // A is member 0, B member 1, C member 2. Excluding member 1
        // reaches A (from_self) and C, never B.
        a.send_conference_message(&group, MessageKind::Normal, "relay", &[MemberId::new(1)])
            .unwrap();

        let a_events = a.poll(16);
        assert!(a_events.iter().any(|e| matches!(
            e,
            LinkEvent::ConferenceMessage { from_self: true, text, .. } if text == "relay"
        )));
        assert!(b.poll(16).iter().all(|e| !matches!(
            e,
            LinkEvent::ConferenceMessage { .. }
        )));
        let c_events = c.poll(16);
        assert!(c_events.iter().any(|e| matches!(
            e,
            LinkEvent::ConferenceMessage { member, from_self: false, text, .. }
                if *member == MemberId::new(0) && text == "relay"
        )));
    }

    #[test]
    fn audio_sink_requires_audio_video_conference() {
        let (_hub, mut a, _key_a, _b, _key_b) = attached_pair();

        let text_group = a.create_conference(ConferenceKind::Text).unwrap();
        assert!(matches!(
            a.attach_audio_sink(&text_group),
            Err(OverlinkError::OverlayError { .. })
        ));

        let av_group = a.create_conference(ConferenceKind::AudioVideo).unwrap();
        a.attach_audio_sink(&av_group).unwrap();
    }

    #[test]
    fn call_offer_and_answer_roundtrip() {
        let (_hub, mut a, key_a, mut b, key_b) = attached_pair();
        link(&mut a, &key_b, &mut b);

        a.offer_call(&key_b, true, false).unwrap();
        let events = b.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::CallOffer { public_key, audio: true, video: false }]
                if *public_key == key_a
        ));

        b.respond_call(&key_a, false).unwrap();
        let events = a.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::CallAnswered { public_key, accept: false }]
                if *public_key == key_b
        ));
    }

    #[test]
    fn detach_notifies_linked_peers() {
        let (_hub, mut a, key_a, mut b, key_b) = attached_pair();
        link(&mut a, &key_b, &mut b);

        b.detach();
        let events = a.poll(16);
        assert!(events.iter().any(|e| matches!(
            e,
            LinkEvent::PeerConnectivity { public_key, connectivity: Connectivity::Offline }
                if *public_key == key_b
        )));

        // Undelivered events for B are gone; reattaching relinks.
        let kp_b = Keypair::from_seed(&[0x22; 32]);
        b.attach(&kp_b).unwrap();
        let events = a.poll(16);
        assert!(events.iter().any(|e| matches!(
            e,
            LinkEvent::PeerConnectivity { public_key, connectivity: Connectivity::Direct }
                if *public_key == key_b
        )));
        assert!(b.poll(16).iter().any(|e| matches!(
            e,
            LinkEvent::PeerConnectivity { public_key, connectivity: Connectivity::Direct }
                if *public_key == key_a
        )));
    }

    #[test]
    fn inject_event_reaches_endpoint_queue() {
        let (hub, mut a, key_a, _b, _key_b) = attached_pair();

        hub.inject_event(
            &key_a,
            LinkEvent::ConferenceMessage {
                group: GroupKey::new([0xAA; 32]),
                member: MemberId::new(7),
                kind: MessageKind::Normal,
                text: "loopback".to_string(),
                from_self: true,
            },
        )
        .unwrap();

        let events = a.poll(16);
        assert!(matches!(
            &events[..],
            [LinkEvent::ConferenceMessage { from_self: true, text, .. }] if text == "loopback"
        ));

        // Unknown endpoints are rejected.
        assert!(hub
            .inject_event(&PublicKey::new([0xFE; 32]), LinkEvent::SelfConnectivity {
                connectivity: Connectivity::Offline,
            })
            .is_err());
    }
}
