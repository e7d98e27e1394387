//! The session engine.
//!
//! [`SessionEngine`] owns everything a running Overlink peer is: its
//! identity, its peer roster, the conferences it has joined, and the
//! calls waiting for an answer. It is single-threaded by design — the
//! driving loop calls [`run_iteration`](SessionEngine::run_iteration)
//! and sleeps the returned delay; every state change happens inside
//! that call, so no internal locking is needed.
//!
//! Each iteration:
//!
//! 1. Applies deferred action batches that have come due.
//! 2. Retries bootstrap nodes if the engine has been offline a while.
//! 3. Polls the overlay and translates link events into engine events,
//!    updating the roster, conference, and call tables on the way.
//! 4. Dispatches each engine event and applies the actions handlers
//!    return.
//! 5. Persists identity state if anything changed it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use overlink_identity::address::PublicAddress;
use overlink_identity::identity::IdentityState;
use overlink_identity::store::IdentityStore;
use overlink_overlay::link::{LinkEvent, Overlay};
use overlink_types::{
    Action, ConferenceId, ConferenceKind, Connectivity, EngineEvent, MemberId, MessageKind,
    OverlinkError, PeerId, PublicKey, Result,
};
use tracing::{debug, info, trace, warn};

use crate::bootstrap::{connect_all, BootstrapList};
use crate::dispatcher::EventDispatcher;
use crate::roster::{Conference, ConferenceTable, Peer, PendingCall, Roster};
use crate::timer::{Clock, DeferredQueue, SystemClock};

/// Upper bound on link events translated per iteration. Keeps one
/// iteration short even when a burst arrives; the remainder is picked
/// up next time around (the overlay recommends a zero delay while its
/// queue is non-empty).
pub const MAX_EVENTS_PER_ITERATION: usize = 32;

/// How often bootstrap nodes are retried while the engine is offline.
pub const REBOOTSTRAP_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Single-threaded session engine driving one overlay endpoint.
pub struct SessionEngine<O: Overlay> {
    overlay: O,
    store: IdentityStore,
    state: IdentityState,
    dispatcher: EventDispatcher,
    bootstrap: BootstrapList,
    roster: Roster,
    conferences: ConferenceTable,
    pending_calls: BTreeMap<PeerId, PendingCall>,
    deferred: DeferredQueue,
    clock: Box<dyn Clock + Send>,
    /// Local overlay reachability, updated from link events.
    connectivity: Connectivity,
    /// Set when identity state changed and a persist is owed.
    dirty: bool,
    last_bootstrap: Option<Instant>,
}

impl<O: Overlay> SessionEngine<O> {
    /// Creates an engine on the process monotonic clock.
    pub fn new(
        store: IdentityStore,
        state: IdentityState,
        bootstrap: BootstrapList,
        overlay: O,
    ) -> Self {
        Self::with_clock(store, state, bootstrap, overlay, Box::new(SystemClock))
    }

    /// Creates an engine on a caller-supplied clock. Tests pass a
    /// [`crate::timer::ManualClock`] and advance it by hand.
    pub fn with_clock(
        store: IdentityStore,
        state: IdentityState,
        bootstrap: BootstrapList,
        overlay: O,
        clock: Box<dyn Clock + Send>,
    ) -> Self {
        Self {
            overlay,
            store,
            state,
            dispatcher: EventDispatcher::new(),
            bootstrap,
            roster: Roster::new(),
            conferences: ConferenceTable::new(),
            pending_calls: BTreeMap::new(),
            deferred: DeferredQueue::new(),
            clock,
            connectivity: Connectivity::Offline,
            dirty: false,
            last_bootstrap: None,
        }
    }

    /// The handler registry. Register behavior before calling
    /// [`start`](Self::start); events that arrive earlier simply queue
    /// in the overlay.
    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Brings the engine up: attaches to the overlay, publishes the
    /// profile, restores saved peers, and runs the first bootstrap
    /// round.
    ///
    /// Restored peers start [`Connectivity::Offline`] until the overlay
    /// reports otherwise. Zero reachable bootstrap nodes is not fatal;
    /// the engine retries every [`REBOOTSTRAP_INTERVAL`] while offline.
    pub fn start(&mut self) -> Result<()> {
        // 1. Attach the identity to the overlay.
        self.overlay.attach(self.state.keypair())?;
        info!(address = %self.state.address(), "attached to overlay");

        // 2. Publish the profile.
        self.overlay
            .set_profile(self.state.display_name(), self.state.status_message())?;

        // 3. Restore saved peers.
        for saved in self.state.saved_peers() {
            if let Err(e) = self.overlay.add_peer(&saved.public_key) {
                warn!(peer = %saved.peer, %e, "failed to restore peer link");
            }
            self.roster.insert(Peer {
                id: saved.peer,
                public_key: saved.public_key,
                connectivity: Connectivity::Offline,
            });
        }
        if !self.roster.is_empty() {
            info!(count = self.roster.len(), "restored saved peers");
        }

        // 4. First bootstrap round.
        let connected = connect_all(&mut self.overlay, &self.bootstrap);
        self.last_bootstrap = Some(self.clock.now());
        if connected == 0 {
            warn!("no bootstrap node reachable at startup; retrying in the background");
        }
        Ok(())
    }

    /// Runs one engine iteration and returns how long the caller may
    /// sleep before the next one.
    ///
    /// With no pending events and no imminent deferred batch this is a
    /// no-op that returns the overlay's idle delay; calling it in a
    /// quiet loop changes nothing.
    pub fn run_iteration(&mut self) -> Duration {
        let now = self.clock.now();

        // 1. Deferred batches that have come due.
        for batch in self.deferred.pop_due(now) {
            self.apply_actions(batch);
        }

        // 2. Offline recovery.
        self.maybe_rebootstrap(now);

        // 3 + 4. Poll, translate, dispatch, apply.
        for link_event in self.overlay.poll(MAX_EVENTS_PER_ITERATION) {
            if let Some(event) = self.translate(link_event) {
                let actions = self.dispatcher.dispatch(&event);
                self.apply_actions(actions);
            }
        }

        // 5. Persist if anything changed identity state.
        self.persist_if_dirty();

        self.next_delay()
    }

    /// Persists identity state and detaches from the overlay. Linked
    /// peers observe the endpoint going offline.
    pub fn shutdown(&mut self) -> Result<()> {
        self.store.persist(&self.state)?;
        self.dirty = false;
        self.overlay.detach();
        info!("session engine shut down");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Accepts a peer request. A key that was accepted in an earlier
    /// session gets its persisted id back; a new key is allocated the
    /// next id and saved. Idempotent for keys already in the roster.
    pub fn accept_peer_request(&mut self, public_key: &PublicKey) -> Result<PeerId> {
        if let Some(existing) = self.roster.id_for_key(public_key) {
            return Ok(existing);
        }

        self.overlay.add_peer(public_key)?;

        let id = match self.state.find_saved_peer(public_key) {
            Some(saved) => saved.peer,
            None => {
                let id = self.state.allocate_peer_id();
                self.state.remember_peer(id, *public_key);
                self.dirty = true;
                id
            }
        };
        self.roster.insert(Peer {
            id,
            public_key: *public_key,
            connectivity: Connectivity::Offline,
        });
        info!(peer = %id, key = %public_key, "accepted peer request");
        Ok(id)
    }

    /// Sends a direct message to a peer.
    ///
    /// # Errors
    ///
    /// - [`OverlinkError::PeerNotFound`] if `peer` is not in the roster.
    /// - [`OverlinkError::PeerOffline`] if the peer is not reachable.
    pub fn send_message(&mut self, peer: PeerId, kind: MessageKind, text: &str) -> Result<()> {
        let entry = self
            .roster
            .get(peer)
            .ok_or(OverlinkError::PeerNotFound { peer })?;
        if !entry.connectivity.is_online() {
            return Err(OverlinkError::PeerOffline { peer });
        }
        let key = entry.public_key;
        self.overlay.send_message(&key, kind, text)?;
        trace!(peer = %peer, chars = text.len(), "sent message");
        Ok(())
    }

    /// Joins a conference from an invite cookie and returns its
    /// engine-local id. Rejoining a conference the engine already
    /// tracks returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::InvalidInvite`] if the overlay rejects
    /// the cookie.
    pub fn join_conference(
        &mut self,
        inviter: PeerId,
        kind: ConferenceKind,
        cookie: &[u8],
    ) -> Result<ConferenceId> {
        let group = self.overlay.join_conference(cookie)?;

        if let Some(existing) = self.conferences.id_for_group(&group) {
            return Ok(existing);
        }
        let id = self.state.allocate_conference_id();
        self.dirty = true;
        self.conferences.insert(Conference {
            id,
            kind,
            group,
            members: Vec::new(),
        });
        info!(conference = %id, %kind, inviter = %inviter, "joined conference");
        Ok(id)
    }

    /// Sends a text message into a conference. The local member is
    /// excluded from delivery, so the engine never hears its own send.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::ConferenceNotFound`] if the id is not a
    /// joined conference.
    pub fn send_conference_message(&mut self, conference: ConferenceId, text: &str) -> Result<()> {
        let conf = self
            .conferences
            .get(conference)
            .ok_or(OverlinkError::ConferenceNotFound { conference })?;
        let group = conf.group;
        let exclude: Vec<MemberId> = conf.self_member().into_iter().collect();
        self.overlay
            .send_conference_message(&group, MessageKind::Normal, text, &exclude)?;
        trace!(conference = %conference, "sent conference message");
        Ok(())
    }

    /// Rebroadcasts a member's message to the rest of a conference:
    /// every member except the origin and the local member.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::ConferenceNotFound`] if the id is not a
    /// joined conference.
    pub fn relay_conference_message(
        &mut self,
        conference: ConferenceId,
        origin: MemberId,
        text: &str,
    ) -> Result<()> {
        let conf = self
            .conferences
            .get(conference)
            .ok_or(OverlinkError::ConferenceNotFound { conference })?;
        let group = conf.group;
        let mut exclude = vec![origin];
        if let Some(me) = conf.self_member() {
            if me != origin {
                exclude.push(me);
            }
        }
        self.overlay
            .send_conference_message(&group, MessageKind::Normal, text, &exclude)?;
        trace!(conference = %conference, origin = %origin, "relayed conference message");
        Ok(())
    }

    /// Answers the pending call from `peer`. The pending call is
    /// consumed by the answer, accepted or not.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::NoPendingCall`] if no unanswered call
    /// from that peer exists.
    pub fn respond_to_call(&mut self, peer: PeerId, accept: bool) -> Result<()> {
        let call = self
            .pending_calls
            .remove(&peer)
            .ok_or(OverlinkError::NoPendingCall { peer })?;
        let entry = self
            .roster
            .get(peer)
            .ok_or(OverlinkError::PeerNotFound { peer })?;
        let key = entry.public_key;
        self.overlay.respond_call(&key, accept)?;
        debug!(peer = %peer, accept, audio = call.audio, video = call.video, "answered call");
        Ok(())
    }

    /// Attaches a silent audio sink to an audio/video conference.
    pub fn attach_audio_sink(&mut self, conference: ConferenceId) -> Result<()> {
        let conf = self
            .conferences
            .get(conference)
            .ok_or(OverlinkError::ConferenceNotFound { conference })?;
        let group = conf.group;
        self.overlay.attach_audio_sink(&group)?;
        debug!(conference = %conference, "attached audio sink");
        Ok(())
    }

    /// Replaces the display name, publishes it, and marks state dirty.
    pub fn set_display_name(&mut self, name: &str) -> Result<()> {
        self.state.set_display_name(name);
        self.dirty = true;
        self.overlay
            .set_profile(self.state.display_name(), self.state.status_message())
    }

    /// Replaces the status message, publishes it, and marks state dirty.
    pub fn set_status_message(&mut self, text: &str) -> Result<()> {
        self.state.set_status_message(text);
        self.dirty = true;
        self.overlay
            .set_profile(self.state.display_name(), self.state.status_message())
    }

    /// Schedules actions to apply after `delay` on the engine clock.
    /// Never blocks; the batch runs in the first iteration at or after
    /// its due instant.
    pub fn schedule(&mut self, delay: Duration, actions: Vec<Action>) {
        trace!(?delay, count = actions.len(), "scheduled deferred actions");
        self.deferred.schedule(self.clock.now() + delay, actions);
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The checksummed public address of this identity.
    pub fn address(&self) -> PublicAddress {
        self.state.address()
    }

    /// The long-term public key of this identity.
    pub fn public_key(&self) -> PublicKey {
        self.state.public_key()
    }

    /// The current display name.
    pub fn display_name(&self) -> &str {
        self.state.display_name()
    }

    /// The current status message.
    pub fn status_message(&self) -> &str {
        self.state.status_message()
    }

    /// Local overlay reachability.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// The configured bootstrap nodes.
    pub fn bootstrap_nodes(&self) -> &BootstrapList {
        &self.bootstrap
    }

    /// Looks a peer up by id.
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.roster.get(id)
    }

    /// Looks a peer up by public key.
    pub fn peer_by_key(&self, key: &PublicKey) -> Option<&Peer> {
        self.roster.by_key(key)
    }

    /// Number of accepted peers.
    pub fn peer_count(&self) -> usize {
        self.roster.len()
    }

    /// Looks a joined conference up by id.
    pub fn conference(&self, id: ConferenceId) -> Option<&Conference> {
        self.conferences.get(id)
    }

    /// Number of joined conferences.
    pub fn conference_count(&self) -> usize {
        self.conferences.len()
    }

    /// The unanswered call from `peer`, if any.
    pub fn pending_call(&self, peer: PeerId) -> Option<&PendingCall> {
        self.pending_calls.get(&peer)
    }

    /// Number of unanswered calls.
    pub fn pending_call_count(&self) -> usize {
        self.pending_calls.len()
    }

    // -----------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------

    /// Retries bootstrap nodes when offline and the retry interval has
    /// elapsed.
    fn maybe_rebootstrap(&mut self, now: Instant) {
        if self.connectivity.is_online() {
            return;
        }
        let due = match self.last_bootstrap {
            Some(at) => now.saturating_duration_since(at) >= REBOOTSTRAP_INTERVAL,
            None => true,
        };
        if !due {
            return;
        }
        debug!("offline; retrying bootstrap nodes");
        connect_all(&mut self.overlay, &self.bootstrap);
        self.last_bootstrap = Some(now);
    }

    /// Applies a link event to the engine tables and translates it into
    /// the engine event handed to handlers. Returns `None` for events
    /// that are pure bookkeeping or refer to unknown senders.
    fn translate(&mut self, event: LinkEvent) -> Option<EngineEvent> {
        match event {
            LinkEvent::PeerRequest {
                public_key,
                greeting,
            } => Some(EngineEvent::PeerRequest {
                public_key,
                greeting,
            }),

            LinkEvent::PeerMessage {
                public_key,
                kind,
                text,
            } => match self.roster.id_for_key(&public_key) {
                Some(peer) => Some(EngineEvent::PeerMessage { peer, kind, text }),
                None => {
                    warn!(key = %public_key, "dropping message from unknown peer");
                    None
                }
            },

            LinkEvent::PeerConnectivity {
                public_key,
                connectivity,
            } => match self.roster.by_key_mut(&public_key) {
                Some(peer) => {
                    if peer.connectivity == connectivity {
                        return None;
                    }
                    peer.connectivity = connectivity;
                    let id = peer.id;
                    debug!(peer = %id, %connectivity, "peer connectivity changed");
                    Some(EngineEvent::ConnectivityChanged {
                        peer: Some(id),
                        connectivity,
                    })
                }
                None => {
                    trace!(key = %public_key, "connectivity for unknown peer ignored");
                    None
                }
            },

            LinkEvent::SelfConnectivity { connectivity } => {
                if self.connectivity == connectivity {
                    return None;
                }
                self.connectivity = connectivity;
                info!(%connectivity, "overlay connectivity changed");
                Some(EngineEvent::ConnectivityChanged {
                    peer: None,
                    connectivity,
                })
            }

            LinkEvent::ConferenceInvite {
                public_key,
                kind,
                cookie,
            } => match self.roster.id_for_key(&public_key) {
                Some(peer) => Some(EngineEvent::ConferenceInvite { peer, kind, cookie }),
                None => {
                    warn!(key = %public_key, "dropping conference invite from unknown peer");
                    None
                }
            },

            LinkEvent::ConferenceMessage {
                group,
                member,
                kind,
                text,
                from_self,
            } => match self.conferences.id_for_group(&group) {
                Some(conference) => Some(EngineEvent::ConferenceMessage {
                    conference,
                    member,
                    kind,
                    text,
                    from_self,
                }),
                None => {
                    trace!(%group, "dropping message for unknown conference");
                    None
                }
            },

            LinkEvent::ConferenceRoster { group, members } => {
                // Bookkeeping only; handlers see membership through the
                // engine accessors.
                if let Some(conf) = self.conferences.by_group_mut(&group) {
                    debug!(conference = %conf.id, members = members.len(), "conference roster updated");
                    conf.members = members;
                }
                None
            }

            LinkEvent::CallOffer {
                public_key,
                audio,
                video,
            } => match self.roster.id_for_key(&public_key) {
                Some(peer) => {
                    self.pending_calls
                        .insert(peer, PendingCall { peer, audio, video });
                    Some(EngineEvent::CallRequest { peer, audio, video })
                }
                None => {
                    warn!(key = %public_key, "dropping call offer from unknown peer");
                    None
                }
            },

            LinkEvent::CallAnswered { public_key, accept } => {
                debug!(key = %public_key, accept, "outgoing call answered");
                None
            }
        }
    }

    /// Applies handler-requested actions. Individual failures are
    /// logged and skipped so one bad action cannot stall the loop.
    fn apply_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            if let Err(e) = self.apply_action(action) {
                warn!(%e, "action failed");
            }
        }
    }

    fn apply_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::AcceptPeer { public_key } => {
                self.accept_peer_request(&public_key)?;
                Ok(())
            }
            Action::SendMessage { peer, kind, text } => self.send_message(peer, kind, &text),
            Action::JoinConference {
                peer,
                kind,
                cookie,
                attach_audio_sink,
            } => {
                let conference = self.join_conference(peer, kind, &cookie)?;
                if attach_audio_sink {
                    self.attach_audio_sink(conference)?;
                }
                Ok(())
            }
            Action::SendConferenceMessage { conference, text } => {
                self.send_conference_message(conference, &text)
            }
            Action::RelayConferenceMessage {
                conference,
                origin,
                text,
            } => self.relay_conference_message(conference, origin, &text),
            Action::RespondCall { peer, accept } => self.respond_to_call(peer, accept),
            Action::Defer { delay, actions } => {
                self.schedule(delay, actions);
                Ok(())
            }
        }
    }

    fn persist_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        match self.store.persist(&self.state) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                // Keep dirty so the next iteration retries.
                warn!(%e, "failed to persist identity state; will retry");
            }
        }
    }

    /// Recommended sleep: whatever the overlay suggests, capped by the
    /// next deferred batch so a due batch is never overslept.
    fn next_delay(&self) -> Duration {
        let overlay = self.overlay.recommended_delay();
        match self.deferred.next_due() {
            Some(due) => overlay.min(due.saturating_duration_since(self.clock.now())),
            None => overlay,
        }
    }
}
