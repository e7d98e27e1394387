//! Core shared types for the Overlink session engine.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key identifying a remote endpoint on the overlay.
///
/// This is the wire-level identity: peer requests, bootstrap entries, and
/// overlay routing are all keyed by it. The engine maps public keys to
/// compact local [`PeerId`]s once a peer is accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// The fixed byte length of a public key.
    pub const LEN: usize = 32;

    /// Creates a new `PublicKey` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = OverlinkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| OverlinkError::InvalidKey {
            reason: "invalid hex encoding".into(),
        })?;
        if bytes.len() != 32 {
            return Err(OverlinkError::InvalidKey {
                reason: format!("expected 32 bytes, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// PeerId
// ---------------------------------------------------------------------------

/// Compact local handle for an accepted peer.
///
/// Assigned sequentially by the session engine when a peer request is
/// accepted, persisted alongside the identity, and stable for the
/// identity's lifetime — a peer keeps its id across restarts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(u32);

impl PeerId {
    /// Creates a `PeerId` from its raw value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConferenceId
// ---------------------------------------------------------------------------

/// Compact local handle for a joined conference.
///
/// Assigned sequentially by the session engine. The allocator persists
/// with the identity so ids stay unique for the identity's lifetime,
/// but conferences themselves are not restored across restarts — invite
/// cookies are ephemeral.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConferenceId(u32);

impl ConferenceId {
    /// Creates a `ConferenceId` from its raw value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// Member slot within a single conference.
///
/// Assigned by the overlay layer; only meaningful inside the conference
/// it belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(u32);

impl MemberId {
    /// Creates a `MemberId` from its raw value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GroupKey
// ---------------------------------------------------------------------------

/// Overlay-level identifier of a conference (32 bytes).
///
/// Extracted from the invite cookie when a conference is joined. Unlike
/// [`ConferenceId`] it is shared by all members and routable on the
/// overlay.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GroupKey([u8; 32]);

impl GroupKey {
    /// The fixed byte length of a group key.
    pub const LEN: usize = 32;

    /// Creates a new `GroupKey` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for GroupKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp in ISO 8601 format.
///
/// All timestamps in Overlink use UTC so persisted state is unambiguous
/// regardless of the host timezone.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the timestamp as an ISO 8601 string.
    pub fn as_str(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = OverlinkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| OverlinkError::ConfigError {
                reason: format!("invalid ISO 8601 timestamp: {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Reachability of an endpoint on the overlay.
///
/// Transitions are driven by the overlay layer and observed by the
/// engine only through dispatched events — the engine never blocks
/// waiting for a particular state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Connectivity {
    /// Not reachable.
    Offline,
    /// Reachable through a relay node.
    Relayed,
    /// Directly reachable.
    Direct,
}

impl Connectivity {
    /// Returns `true` for any reachable state.
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Relayed => write!(f, "relayed"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConferenceKind
// ---------------------------------------------------------------------------

/// Classifies a conference by the media it carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ConferenceKind {
    /// Text-only conference.
    Text,
    /// Conference that additionally carries audio/video frames.
    AudioVideo,
}

impl fmt::Display for ConferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::AudioVideo => write!(f, "audio-video"),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Classifies a text message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Ordinary chat message.
    Normal,
    /// Emote-style action message ("/me ...").
    Action,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Action => write!(f, "action"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConferenceMember
// ---------------------------------------------------------------------------

/// One entry of a conference roster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConferenceMember {
    /// Slot assigned by the overlay.
    pub member: MemberId,
    /// Public key of the member.
    pub public_key: PublicKey,
    /// Whether this slot is the local identity.
    pub is_self: bool,
}

// ---------------------------------------------------------------------------
// BootstrapNode
// ---------------------------------------------------------------------------

/// A well-known overlay entry point.
///
/// Parsed from a line of the bootstrap list: `<host> <port> <hex public
/// key>`. Immutable once loaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapNode {
    /// Hostname or IP address, opaque to the engine.
    pub host: String,
    /// TCP/UDP port, 1-65535.
    pub port: u16,
    /// Public key of the node.
    pub public_key: PublicKey,
}

impl fmt::Display for BootstrapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BootstrapNode {
    type Err = OverlinkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(OverlinkError::InvalidBootstrapEntry {
                reason: format!(
                    "expected '<host> <port> <public key>', got {} fields",
                    fields.len()
                ),
            });
        }

        let port: u16 = fields[1]
            .parse()
            .map_err(|_| OverlinkError::InvalidBootstrapEntry {
                reason: format!("invalid port '{}'", fields[1]),
            })?;
        if port == 0 {
            return Err(OverlinkError::InvalidBootstrapEntry {
                reason: "port must be in 1-65535".into(),
            });
        }

        let public_key: PublicKey =
            fields[2]
                .parse()
                .map_err(|e| OverlinkError::InvalidBootstrapEntry {
                    reason: format!("invalid public key: {e}"),
                })?;

        Ok(Self {
            host: fields[0].to_string(),
            port,
            public_key,
        })
    }
}

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Inbound events the session engine dispatches to registered handlers.
///
/// These are the local-id-keyed counterparts of the overlay's wire
/// events: the engine resolves public keys to [`PeerId`]s and group
/// keys to [`ConferenceId`]s during translation, before dispatch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineEvent {
    /// A remote identity asks to become a peer.
    PeerRequest {
        /// Public key of the requester (not yet a peer).
        public_key: PublicKey,
        /// Free-form greeting attached to the request.
        greeting: String,
    },
    /// A text message from an accepted peer.
    PeerMessage {
        /// Sending peer.
        peer: PeerId,
        /// Message classification.
        kind: MessageKind,
        /// Message payload.
        text: String,
    },
    /// Reachability of a peer — or of this identity — changed.
    ConnectivityChanged {
        /// Affected peer, or `None` for the local identity.
        peer: Option<PeerId>,
        /// New reachability state.
        connectivity: Connectivity,
    },
    /// A peer invites this identity into a conference.
    ConferenceInvite {
        /// Inviting peer.
        peer: PeerId,
        /// Conference media kind.
        kind: ConferenceKind,
        /// Opaque invite cookie, consumed by `join_conference`.
        cookie: Vec<u8>,
    },
    /// A message arrived in a joined conference.
    ConferenceMessage {
        /// Conference the message belongs to.
        conference: ConferenceId,
        /// Originating member slot.
        member: MemberId,
        /// Message classification.
        kind: MessageKind,
        /// Message payload.
        text: String,
        /// Whether the originating member is the local identity.
        from_self: bool,
    },
    /// A peer offers an audio/video call.
    CallRequest {
        /// Calling peer.
        peer: PeerId,
        /// Whether audio was requested.
        audio: bool,
        /// Whether video was requested.
        video: bool,
    },
}

impl EngineEvent {
    /// Returns the [`EventKind`] this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PeerRequest { .. } => EventKind::PeerRequest,
            Self::PeerMessage { .. } => EventKind::PeerMessage,
            Self::ConnectivityChanged { .. } => EventKind::ConnectivityChanged,
            Self::ConferenceInvite { .. } => EventKind::ConferenceInvite,
            Self::ConferenceMessage { .. } => EventKind::ConferenceMessage,
            Self::CallRequest { .. } => EventKind::CallRequest,
        }
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Dispatch key: the kind of an [`EngineEvent`].
///
/// The dispatcher holds at most one handler per kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// [`EngineEvent::PeerRequest`].
    PeerRequest,
    /// [`EngineEvent::PeerMessage`].
    PeerMessage,
    /// [`EngineEvent::ConnectivityChanged`].
    ConnectivityChanged,
    /// [`EngineEvent::ConferenceInvite`].
    ConferenceInvite,
    /// [`EngineEvent::ConferenceMessage`].
    ConferenceMessage,
    /// [`EngineEvent::CallRequest`].
    CallRequest,
}

impl EventKind {
    /// All dispatchable kinds, in a fixed order.
    pub const ALL: [EventKind; 6] = [
        EventKind::PeerRequest,
        EventKind::PeerMessage,
        EventKind::ConnectivityChanged,
        EventKind::ConferenceInvite,
        EventKind::ConferenceMessage,
        EventKind::CallRequest,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerRequest => write!(f, "peer-request"),
            Self::PeerMessage => write!(f, "peer-message"),
            Self::ConnectivityChanged => write!(f, "connectivity-changed"),
            Self::ConferenceInvite => write!(f, "conference-invite"),
            Self::ConferenceMessage => write!(f, "conference-message"),
            Self::CallRequest => write!(f, "call-request"),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Outbound actions returned by event handlers.
///
/// Handlers never touch the overlay directly; they describe what the
/// engine should do and the engine applies the actions after the
/// handler returns. Failures while applying are logged and skipped,
/// never fatal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Accept a pending peer request.
    AcceptPeer {
        /// Public key from the [`EngineEvent::PeerRequest`].
        public_key: PublicKey,
    },
    /// Send a text message to a peer.
    SendMessage {
        /// Destination peer.
        peer: PeerId,
        /// Message classification.
        kind: MessageKind,
        /// Message payload.
        text: String,
    },
    /// Accept a conference invite and join.
    JoinConference {
        /// Inviting peer.
        peer: PeerId,
        /// Conference media kind.
        kind: ConferenceKind,
        /// Invite cookie from the [`EngineEvent::ConferenceInvite`].
        cookie: Vec<u8>,
        /// Attach a no-op audio frame sink after joining.
        attach_audio_sink: bool,
    },
    /// Broadcast a text message to a conference, excluding self.
    SendConferenceMessage {
        /// Destination conference.
        conference: ConferenceId,
        /// Message payload.
        text: String,
    },
    /// Rebroadcast a conference message, excluding self and the origin.
    RelayConferenceMessage {
        /// Destination conference.
        conference: ConferenceId,
        /// Member slot the message originated from.
        origin: MemberId,
        /// Message payload.
        text: String,
    },
    /// Answer a pending call offer.
    RespondCall {
        /// Calling peer.
        peer: PeerId,
        /// `true` to accept, `false` to reject.
        accept: bool,
    },
    /// Execute `actions` after `delay` on the engine's iteration clock.
    Defer {
        /// Delay measured from the moment the action is applied.
        delay: Duration,
        /// Actions to apply once the delay elapses, in order.
        actions: Vec<Action>,
    },
}

// ---------------------------------------------------------------------------
// OverlinkError
// ---------------------------------------------------------------------------

/// Central error type for the Overlink system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum OverlinkError {
    /// A public address is malformed or fails checksum validation.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A public key is malformed.
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Human-readable description of why the key is invalid.
        reason: String,
    },

    /// A bootstrap list line does not match `<host> <port> <public key>`.
    #[error("invalid bootstrap entry: {reason}")]
    InvalidBootstrapEntry {
        /// Human-readable description of the malformed line.
        reason: String,
    },

    /// The bootstrap registry is unusable or a bootstrap attempt failed.
    #[error("bootstrap error: {reason}")]
    BootstrapError {
        /// Human-readable description of the bootstrap failure.
        reason: String,
    },

    /// The identity state file exists but cannot be trusted.
    ///
    /// Always fatal: operating under a regenerated identity would
    /// silently orphan every existing peer relationship.
    #[error("identity state corrupt: {reason}")]
    IdentityCorrupt {
        /// Human-readable description of the corruption.
        reason: String,
    },

    /// An identity state read or write failed at the I/O level.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// The referenced peer id is not registered.
    #[error("peer {peer} not found")]
    PeerNotFound {
        /// The unknown peer id.
        peer: PeerId,
    },

    /// The peer exists but is currently unreachable.
    #[error("peer {peer} is offline")]
    PeerOffline {
        /// The offline peer id.
        peer: PeerId,
    },

    /// The referenced conference id is not registered.
    #[error("conference {conference} not found")]
    ConferenceNotFound {
        /// The unknown conference id.
        conference: ConferenceId,
    },

    /// A conference invite cookie is malformed or stale.
    #[error("invalid invite: {reason}")]
    InvalidInvite {
        /// Human-readable description of the invite failure.
        reason: String,
    },

    /// No call offer is pending for the peer.
    #[error("no pending call from peer {peer}")]
    NoPendingCall {
        /// The peer without a ringing call.
        peer: PeerId,
    },

    /// The overlay layer rejected or failed an operation.
    #[error("overlay error: {reason}")]
    OverlayError {
        /// Human-readable description of the overlay failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`OverlinkError`].
pub type Result<T> = std::result::Result<T, OverlinkError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let bytes = [0xABu8; 32];
        let key = PublicKey::new(bytes);
        let hex_str = key.to_string();
        let parsed: PublicKey = hex_str.parse()?;
        assert_eq!(key, parsed);
        Ok(())
    }

    #[test]
    fn public_key_invalid_hex_length() {
        let result: std::result::Result<PublicKey, _> = "abcd".parse();
        assert!(result.is_err());
    }

    #[test]
    fn public_key_invalid_hex_chars() {
        let result: std::result::Result<PublicKey, _> = "zzzz".parse();
        assert!(result.is_err());
    }

    #[test]
    fn public_key_serde_json_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let key = PublicKey::new([0x11u8; 32]);
        let json = serde_json::to_string(&key)?;
        let parsed: PublicKey = serde_json::from_str(&json)?;
        assert_eq!(key, parsed);
        Ok(())
    }

    #[test]
    fn peer_id_display_and_raw() {
        let id = PeerId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(id.as_u32(), 7);
    }

    #[test]
    fn group_key_display_hex() {
        let gk = GroupKey::new([0x0Fu8; 32]);
        assert_eq!(gk.to_string(), "0f".repeat(32));
    }

    #[test]
    fn timestamp_now_parses_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let ts = Timestamp::now();
        let s = ts.as_str();
        let parsed: Timestamp = s.parse()?;
        assert_eq!(ts.as_datetime(), parsed.as_datetime());
        Ok(())
    }

    #[test]
    fn connectivity_display_and_online() {
        assert_eq!(Connectivity::Offline.to_string(), "offline");
        assert_eq!(Connectivity::Relayed.to_string(), "relayed");
        assert_eq!(Connectivity::Direct.to_string(), "direct");
        assert!(!Connectivity::Offline.is_online());
        assert!(Connectivity::Relayed.is_online());
        assert!(Connectivity::Direct.is_online());
    }

    #[test]
    fn message_kind_display() {
        assert_eq!(MessageKind::Normal.to_string(), "normal");
        assert_eq!(MessageKind::Action.to_string(), "action");
    }

    #[test]
    fn bootstrap_node_parses_valid_line() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let key_hex = "ab".repeat(32);
        let line = format!("node.example.org 33445 {key_hex}");
        let node: BootstrapNode = line.parse()?;
        assert_eq!(node.host, "node.example.org");
        assert_eq!(node.port, 33445);
        assert_eq!(node.public_key, PublicKey::new([0xAB; 32]));
        Ok(())
    }

    #[test]
    fn bootstrap_node_tolerates_extra_whitespace() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let line = format!("  10.0.0.1    443   {}  ", "00".repeat(32));
        let node: BootstrapNode = line.parse()?;
        assert_eq!(node.host, "10.0.0.1");
        assert_eq!(node.port, 443);
        Ok(())
    }

    #[test]
    fn bootstrap_node_wrong_field_count_rejected() {
        let result: std::result::Result<BootstrapNode, _> = "host 33445".parse();
        assert!(result.is_err());
        let result: std::result::Result<BootstrapNode, _> = "".parse();
        assert!(result.is_err());
    }

    #[test]
    fn bootstrap_node_bad_port_rejected() {
        let key_hex = "ab".repeat(32);
        for port in ["0", "65536", "-1", "http"] {
            let line = format!("host {port} {key_hex}");
            let result: std::result::Result<BootstrapNode, _> = line.parse();
            assert!(result.is_err(), "port '{port}' should be rejected");
        }
    }

    #[test]
    fn bootstrap_node_bad_key_rejected() {
        let result: std::result::Result<BootstrapNode, _> = "host 33445 nothex".parse();
        assert!(result.is_err());
    }

    #[test]
    fn event_kind_mapping_is_total() {
        let events = [
            EngineEvent::PeerRequest {
                public_key: PublicKey::new([0; 32]),
                greeting: String::new(),
            },
            EngineEvent::PeerMessage {
                peer: PeerId::new(0),
                kind: MessageKind::Normal,
                text: String::new(),
            },
            EngineEvent::ConnectivityChanged {
                peer: None,
                connectivity: Connectivity::Offline,
            },
            EngineEvent::ConferenceInvite {
                peer: PeerId::new(0),
                kind: ConferenceKind::Text,
                cookie: Vec::new(),
            },
            EngineEvent::ConferenceMessage {
                conference: ConferenceId::new(0),
                member: MemberId::new(0),
                kind: MessageKind::Normal,
                text: String::new(),
                from_self: false,
            },
            EngineEvent::CallRequest {
                peer: PeerId::new(0),
                audio: true,
                video: false,
            },
        ];

        for (event, expected) in events.iter().zip(EventKind::ALL) {
            assert_eq!(event.kind(), expected);
        }
    }

    #[test]
    fn error_display() {
        let err = OverlinkError::PeerNotFound {
            peer: PeerId::new(42),
        };
        assert_eq!(err.to_string(), "peer 42 not found");

        let err = OverlinkError::InvalidInvite {
            reason: "cookie too short".into(),
        };
        assert!(err.to_string().contains("cookie too short"));
    }
}
