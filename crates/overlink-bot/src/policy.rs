//! The echo behavior, expressed as engine event handlers.
//!
//! [`EchoPolicy::install`] registers one handler per event kind on a
//! [`EventDispatcher`]. The handlers are pure decisions: they look at
//! the event and return actions, and the engine applies those actions.
//! Nothing in here touches the overlay or blocks.

use std::time::Duration;

use overlink_engine::dispatcher::EventDispatcher;
use overlink_types::{
    Action, ConferenceKind, EngineEvent, EventKind, MessageKind, OverlinkError, Result,
};
use tracing::{debug, info};

/// Grace period before an incoming call is rejected, when the config
/// does not override it.
pub const DEFAULT_CALL_REJECT_DELAY: Duration = Duration::from_secs(3);

/// Rejection text for calls without video.
pub const DEFAULT_REJECT_AUDIO_TEXT: &str = "Sorry, I cannot take audio calls.";

/// Rejection text for calls with video.
pub const DEFAULT_REJECT_VIDEO_TEXT: &str = "Sorry, I cannot take video calls.";

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

/// Tunable knobs of the echo behavior.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// How long a call rings before it is rejected. The rejection is
    /// deferred on the engine clock, so other events keep flowing while
    /// the call waits.
    pub call_reject_delay: Duration,
    /// Message sent alongside the rejection of an audio-only call.
    pub reject_audio_text: String,
    /// Message sent alongside the rejection of a call with video.
    pub reject_video_text: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            call_reject_delay: DEFAULT_CALL_REJECT_DELAY,
            reject_audio_text: DEFAULT_REJECT_AUDIO_TEXT.to_string(),
            reject_video_text: DEFAULT_REJECT_VIDEO_TEXT.to_string(),
        }
    }
}

impl PolicyConfig {
    /// Checks the configuration for values the policy cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.call_reject_delay.is_zero() {
            return Err(OverlinkError::ConfigError {
                reason: "call reject delay must be greater than zero".to_string(),
            });
        }
        if self.reject_audio_text.is_empty() || self.reject_video_text.is_empty() {
            return Err(OverlinkError::ConfigError {
                reason: "call rejection texts must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EchoPolicy
// ---------------------------------------------------------------------------

/// The complete echo behavior.
///
/// - Peer requests are always accepted.
/// - Normal direct messages are echoed back verbatim; action messages
///   are ignored.
/// - Conference invites are followed, attaching a silent audio sink to
///   audio/video conferences.
/// - Normal conference messages from other members are rebroadcast to
///   the rest of the conference; the bot's own messages are never
///   relayed again.
/// - Calls ring for [`PolicyConfig::call_reject_delay`], then are
///   rejected together with a text whose wording depends on whether the
///   caller asked for video.
pub struct EchoPolicy {
    config: PolicyConfig,
}

impl EchoPolicy {
    /// Creates the policy after validating its configuration.
    pub fn new(config: PolicyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Registers a handler for every event kind on `dispatcher`,
    /// replacing whatever was registered before.
    pub fn install(self, dispatcher: &mut EventDispatcher) {
        dispatcher.register(EventKind::PeerRequest, |event| match event {
            EngineEvent::PeerRequest {
                public_key,
                greeting,
            } => {
                info!(key = %public_key, greeting, "accepting peer request");
                vec![Action::AcceptPeer {
                    public_key: *public_key,
                }]
            }
            _ => Vec::new(),
        });

        dispatcher.register(EventKind::PeerMessage, |event| match event {
            EngineEvent::PeerMessage {
                peer,
                kind: MessageKind::Normal,
                text,
            } => {
                debug!(peer = %peer, chars = text.len(), "echoing message");
                vec![Action::SendMessage {
                    peer: *peer,
                    kind: MessageKind::Normal,
                    text: text.clone(),
                }]
            }
            _ => Vec::new(),
        });

        dispatcher.register(EventKind::ConnectivityChanged, |event| {
            if let EngineEvent::ConnectivityChanged { peer, connectivity } = event {
                match peer {
                    Some(peer) => info!(peer = %peer, %connectivity, "peer connectivity"),
                    None => info!(%connectivity, "own connectivity"),
                }
            }
            Vec::new()
        });

        dispatcher.register(EventKind::ConferenceInvite, |event| match event {
            EngineEvent::ConferenceInvite { peer, kind, cookie } => {
                info!(peer = %peer, %kind, "following conference invite");
                vec![Action::JoinConference {
                    peer: *peer,
                    kind: *kind,
                    cookie: cookie.clone(),
                    attach_audio_sink: *kind == ConferenceKind::AudioVideo,
                }]
            }
            _ => Vec::new(),
        });

        dispatcher.register(EventKind::ConferenceMessage, |event| match event {
            EngineEvent::ConferenceMessage {
                conference,
                member,
                kind: MessageKind::Normal,
                text,
                from_self: false,
            } => {
                debug!(conference = %conference, member = %member, "relaying conference message");
                vec![Action::RelayConferenceMessage {
                    conference: *conference,
                    origin: *member,
                    text: text.clone(),
                }]
            }
            _ => Vec::new(),
        });

        let delay = self.config.call_reject_delay;
        let audio_text = self.config.reject_audio_text;
        let video_text = self.config.reject_video_text;
        dispatcher.register(EventKind::CallRequest, move |event| match event {
            EngineEvent::CallRequest { peer, audio, video } => {
                info!(peer = %peer, audio, video, "call ringing; will reject shortly");
                let text = if *video {
                    video_text.clone()
                } else {
                    audio_text.clone()
                };
                vec![Action::Defer {
                    delay,
                    actions: vec![
                        Action::RespondCall {
                            peer: *peer,
                            accept: false,
                        },
                        Action::SendMessage {
                            peer: *peer,
                            kind: MessageKind::Normal,
                            text,
                        },
                    ],
                }]
            }
            _ => Vec::new(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
