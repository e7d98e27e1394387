//! Link events and the [`Overlay`] trait.
//!
//! [`LinkEvent`] is the unified event type the session engine receives
//! from whatever overlay it is attached to. All transport-specific
//! events are mapped into this enum before being delivered to higher
//! layers; nothing above this seam knows how bytes move.

use std::time::Duration;

use overlink_identity::keys::Keypair;
use overlink_types::{
    BootstrapNode, ConferenceKind, ConferenceMember, Connectivity, GroupKey, MemberId,
    MessageKind, PublicKey, Result,
};

// ---------------------------------------------------------------------------
// LinkEvent
// ---------------------------------------------------------------------------

/// Events surfaced by the overlay layer.
///
/// The session engine consumes these to maintain its peer roster,
/// conference tables, and pending-call set, then translates them into
/// the engine events handed to registered handlers.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// A remote identity asked to become a peer.
    PeerRequest {
        /// Long-term key of the requester.
        public_key: PublicKey,
        /// Free-form greeting supplied with the request.
        greeting: String,
    },

    /// A direct message arrived from a linked peer.
    PeerMessage {
        /// Long-term key of the sender.
        public_key: PublicKey,
        /// Normal text or an action ("/me") message.
        kind: MessageKind,
        /// Message body (UTF-8).
        text: String,
    },

    /// A linked peer's reachability changed.
    PeerConnectivity {
        /// Long-term key of the peer.
        public_key: PublicKey,
        /// New reachability.
        connectivity: Connectivity,
    },

    /// The local endpoint's own reachability changed.
    SelfConnectivity {
        /// New reachability.
        connectivity: Connectivity,
    },

    /// A linked peer invited the local endpoint into a conference.
    ConferenceInvite {
        /// Long-term key of the inviter.
        public_key: PublicKey,
        /// Text-only or audio/video conference.
        kind: ConferenceKind,
        /// Opaque invite cookie; pass to [`Overlay::join_conference`].
        cookie: Vec<u8>,
    },

    /// A message arrived in a joined conference.
    ConferenceMessage {
        /// Conference the message belongs to.
        group: GroupKey,
        /// Member that authored the message.
        member: MemberId,
        /// Normal text or an action message.
        kind: MessageKind,
        /// Message body (UTF-8).
        text: String,
        /// True when the author is the local endpoint. Overlays that
        /// loop an endpoint's own messages back must set this.
        from_self: bool,
    },

    /// The membership of a joined conference changed.
    ConferenceRoster {
        /// Conference whose roster changed.
        group: GroupKey,
        /// Complete current membership, `is_self` set per recipient.
        members: Vec<ConferenceMember>,
    },

    /// A linked peer started a call to the local endpoint.
    CallOffer {
        /// Long-term key of the caller.
        public_key: PublicKey,
        /// Caller wants to send audio.
        audio: bool,
        /// Caller wants to send video.
        video: bool,
    },

    /// A callee answered (or rejected) a call the local endpoint placed.
    CallAnswered {
        /// Long-term key of the callee.
        public_key: PublicKey,
        /// True if the call was accepted.
        accept: bool,
    },
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// Command surface of an overlay network, as seen by the session engine.
///
/// Implementations own all transport, routing, and cryptographic session
/// state. The engine calls these methods from a single task and between
/// calls to [`poll`](Self::poll); implementations may assume no
/// concurrent access through one endpoint.
pub trait Overlay {
    /// Binds the local endpoint to the given identity and brings the
    /// overlay up. Must be called before any other command.
    fn attach(&mut self, keypair: &Keypair) -> Result<()>;

    /// Tears the endpoint down. All linked peers observe the endpoint
    /// going offline. Safe to call more than once.
    fn detach(&mut self);

    /// Attempts to establish overlay presence through one bootstrap node.
    ///
    /// # Errors
    ///
    /// Returns [`overlink_types::OverlinkError::BootstrapError`] if the
    /// node is unreachable. Callers try each configured node in turn and
    /// tolerate individual failures.
    fn bootstrap(&mut self, node: &BootstrapNode) -> Result<()>;

    /// Drains up to `max_events` pending link events, oldest first.
    ///
    /// Never blocks. Events from one remote endpoint are delivered in
    /// the order that endpoint produced them.
    fn poll(&mut self, max_events: usize) -> Vec<LinkEvent>;

    /// How long the driving loop may sleep before the next
    /// [`poll`](Self::poll) without delaying overlay housekeeping.
    fn recommended_delay(&self) -> Duration;

    /// Accepts a peer link with the given identity.
    fn add_peer(&mut self, public_key: &PublicKey) -> Result<()>;

    /// Sends a direct message to a linked peer.
    fn send_message(&mut self, public_key: &PublicKey, kind: MessageKind, text: &str)
        -> Result<()>;

    /// Joins a conference from an invite cookie and returns its group key.
    ///
    /// The membership roster arrives asynchronously as a
    /// [`LinkEvent::ConferenceRoster`].
    ///
    /// # Errors
    ///
    /// Returns [`overlink_types::OverlinkError::InvalidInvite`] if the
    /// cookie is malformed or refers to a conference that no longer
    /// exists.
    fn join_conference(&mut self, cookie: &[u8]) -> Result<GroupKey>;

    /// Sends a message into a joined conference.
    ///
    /// Members listed in `exclude` do not receive the message. An empty
    /// `exclude` reaches every member, the sender included (tagged
    /// `from_self`).
    fn send_conference_message(
        &mut self,
        group: &GroupKey,
        kind: MessageKind,
        text: &str,
        exclude: &[MemberId],
    ) -> Result<()>;

    /// Attaches a do-nothing audio sink to an audio/video conference so
    /// the endpoint counts as media-capable without producing sound.
    fn attach_audio_sink(&mut self, group: &GroupKey) -> Result<()>;

    /// Answers (or rejects) a pending call from a linked peer.
    fn respond_call(&mut self, public_key: &PublicKey, accept: bool) -> Result<()>;

    /// Publishes the local display name and status message to the overlay.
    fn set_profile(&mut self, name: &str, status: &str) -> Result<()>;
}
