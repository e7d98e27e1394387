//! End-to-end tests of the echo behavior.
//!
//! Each test builds a real [`SessionEngine`] with the [`EchoPolicy`]
//! installed and plays remote peers against it over the in-memory
//! overlay. Call timing runs on a [`ManualClock`], so no test sleeps.

use std::time::Duration;

use overlink_bot::policy::{
    EchoPolicy, PolicyConfig, DEFAULT_REJECT_AUDIO_TEXT, DEFAULT_REJECT_VIDEO_TEXT,
};
use overlink_engine::bootstrap::BootstrapList;
use overlink_engine::engine::SessionEngine;
use overlink_engine::timer::ManualClock;
use overlink_identity::keys::Keypair;
use overlink_identity::store::IdentityStore;
use overlink_overlay::link::{LinkEvent, Overlay};
use overlink_overlay::memory::{MemoryOverlay, OverlayHub};
use overlink_types::{
    BootstrapNode, ConferenceId, ConferenceKind, Connectivity, MemberId, MessageKind, PublicKey,
};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Key the hub registers as reachable bootstrap infrastructure.
const BOOT_KEY: [u8; 32] = [0x77; 32];

/// Seed for the first remote endpoint.
const SEED_B: [u8; 32] = [0x5A; 32];

/// Seed for a second remote endpoint.
const SEED_C: [u8; 32] = [0x6B; 32];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// RAII guard that removes a temporary state file on drop.
struct TempFile(std::path::PathBuf);

impl TempFile {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "overlink_bot_test_{name}_{}.dat",
            std::process::id()
        ));
        Self(path)
    }

    fn path(&self) -> &std::path::Path {
        &self.0
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
        let name = self.0.file_name().and_then(|n| n.to_str()).unwrap_or("x");
        let _ = std::fs::remove_file(self.0.with_file_name(format!(".{name}.tmp")));
    }
}

/// Hub with one registered bootstrap key, plus a list pointing at it.
fn hub_with_bootstrap() -> (OverlayHub, BootstrapList) {
    let hub = OverlayHub::new();
    hub.add_bootstrap_key(PublicKey::new(BOOT_KEY))
        .expect("register bootstrap key");
    let list = BootstrapList::from_nodes(vec![BootstrapNode {
        host: "node.overlink.example".to_string(),
        port: 33445,
        public_key: PublicKey::new(BOOT_KEY),
    }])
    .expect("bootstrap list");
    (hub, list)
}

/// Engine with the echo policy installed, on the system clock.
fn echo_engine(
    hub: &OverlayHub,
    list: BootstrapList,
    file: &TempFile,
) -> SessionEngine<MemoryOverlay> {
    let store = IdentityStore::new(file.path());
    let state = store.load_or_create().expect("identity state");
    let mut engine = SessionEngine::new(store, state, list, hub.endpoint());
    EchoPolicy::new(PolicyConfig::default())
        .expect("policy")
        .install(engine.dispatcher_mut());
    engine
}

/// Engine with the echo policy installed, on a shared manual clock.
fn echo_engine_with_clock(
    hub: &OverlayHub,
    list: BootstrapList,
    file: &TempFile,
    clock: &ManualClock,
) -> SessionEngine<MemoryOverlay> {
    let store = IdentityStore::new(file.path());
    let state = store.load_or_create().expect("identity state");
    let mut engine =
        SessionEngine::with_clock(store, state, list, hub.endpoint(), Box::new(clock.clone()));
    EchoPolicy::new(PolicyConfig::default())
        .expect("policy")
        .install(engine.dispatcher_mut());
    engine
}

/// Attached remote endpoint for a deterministic seed.
fn attached_remote(hub: &OverlayHub, seed: [u8; 32]) -> (MemoryOverlay, PublicKey) {
    let keypair = Keypair::from_seed(&seed);
    let mut endpoint = hub.endpoint();
    endpoint.attach(&keypair).expect("attach remote");
    (endpoint, keypair.public_key())
}

/// Runs `n` engine iterations back to back.
fn pump(engine: &mut SessionEngine<MemoryOverlay>, n: usize) {
    for _ in 0..n {
        engine.run_iteration();
    }
}

/// Sends a peer request from `remote` and settles the resulting link.
fn befriend(
    engine: &mut SessionEngine<MemoryOverlay>,
    remote: &mut MemoryOverlay,
    greeting: &str,
) {
    remote
        .request_peer(&engine.public_key(), greeting)
        .expect("peer request");
    pump(engine, 2);
    remote.poll(16);
}

/// Conference messages seen by an endpoint, as (member, text, from_self).
fn heard(endpoint: &mut MemoryOverlay) -> Vec<(MemberId, String, bool)> {
    endpoint
        .poll(16)
        .into_iter()
        .filter_map(|e| match e {
            LinkEvent::ConferenceMessage {
                member,
                text,
                from_self,
                ..
            } => Some((member, text, from_self)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Echoing direct messages
// ---------------------------------------------------------------------------

#[test]
fn bot_accepts_requests_and_echoes_normal_messages() {
    let file = TempFile::new("echo");
    let (hub, list) = hub_with_bootstrap();
    let mut engine = echo_engine(&hub, list, &file);
    engine.start().expect("start");
    pump(&mut engine, 1);

    let (mut b, _key_b) = attached_remote(&hub, SEED_B);
    befriend(&mut engine, &mut b, "hello bot");
    assert_eq!(engine.peer_count(), 1);

    let bot_key = engine.public_key();
    b.send_message(&bot_key, MessageKind::Normal, "echo this")
        .expect("send");
    pump(&mut engine, 1);

    let events = b.poll(16);
    assert_eq!(events.len(), 1, "expected exactly the echo, got {events:?}");
    assert!(matches!(
        &events[0],
        LinkEvent::PeerMessage {
            public_key,
            kind: MessageKind::Normal,
            text,
        } if *public_key == bot_key && text == "echo this"
    ));

    // Action messages are not echoed.
    b.send_message(&bot_key, MessageKind::Action, "waves")
        .expect("send");
    pump(&mut engine, 1);
    assert!(b.poll(16).is_empty());
}

// ---------------------------------------------------------------------------
// 2. Conference relaying
// ---------------------------------------------------------------------------

#[test]
fn bot_follows_invites_and_relays_to_everyone_else() {
    let file = TempFile::new("relay");
    let (hub, list) = hub_with_bootstrap();
    let mut engine = echo_engine(&hub, list, &file);
    engine.start().expect("start");
    pump(&mut engine, 1);

    let (mut b, _key_b) = attached_remote(&hub, SEED_B);
    befriend(&mut engine, &mut b, "hi");

    // B creates the conference and invites the bot; the policy joins.
    // Join order: B slot 0, bot slot 1, C slot 2.
    let group = b.create_conference(ConferenceKind::Text).expect("create");
    b.invite_to_conference(&group, &engine.public_key())
        .expect("invite bot");
    pump(&mut engine, 2);
    assert_eq!(engine.conference_count(), 1);

    let (mut c, key_c) = attached_remote(&hub, SEED_C);
    b.add_peer(&key_c).expect("link B to C");
    b.invite_to_conference(&group, &key_c).expect("invite C");
    let c_cookie = c
        .poll(16)
        .into_iter()
        .find_map(|e| match e {
            LinkEvent::ConferenceInvite { cookie, .. } => Some(cookie),
            _ => None,
        })
        .expect("invite for C");
    c.join_conference(&c_cookie).expect("C joins");
    pump(&mut engine, 1);
    b.poll(16);
    c.poll(16);

    // C speaks. The bot hears it and mirrors it to B, never back to C
    // and never to itself.
    c.send_conference_message(&group, MessageKind::Normal, "mirror me", &[])
        .expect("C speaks");
    pump(&mut engine, 1);

    let b_heard = heard(&mut b);
    assert_eq!(
        b_heard,
        [
            (MemberId::new(2), "mirror me".to_string(), false),
            (MemberId::new(1), "mirror me".to_string(), false),
        ],
        "B should hear the original, then the bot's relay"
    );
    let c_heard = heard(&mut c);
    assert_eq!(c_heard, [(MemberId::new(2), "mirror me".to_string(), true)]);

    // Nothing keeps bouncing afterwards.
    pump(&mut engine, 3);
    assert!(heard(&mut b).is_empty());
    assert!(heard(&mut c).is_empty());

    // A loopback of the bot's own message is never relayed again.
    hub.inject_event(
        &engine.public_key(),
        LinkEvent::ConferenceMessage {
            group,
            member: MemberId::new(1),
            kind: MessageKind::Normal,
            text: "loop".to_string(),
            from_self: true,
        },
    )
    .expect("inject");
    pump(&mut engine, 2);
    assert!(heard(&mut b).is_empty());

    // Action messages pass through the conference but are not relayed.
    c.send_conference_message(&group, MessageKind::Action, "shrugs", &[])
        .expect("C emotes");
    pump(&mut engine, 2);
    let b_heard = heard(&mut b);
    assert_eq!(b_heard.len(), 1);
    assert_eq!(b_heard[0].0, MemberId::new(2));
}

#[test]
fn audio_video_invites_are_followed_too() {
    let file = TempFile::new("av_invite");
    let (hub, list) = hub_with_bootstrap();
    let mut engine = echo_engine(&hub, list, &file);
    engine.start().expect("start");
    pump(&mut engine, 1);

    let (mut b, _key_b) = attached_remote(&hub, SEED_B);
    befriend(&mut engine, &mut b, "hi");

    let group = b
        .create_conference(ConferenceKind::AudioVideo)
        .expect("create");
    b.invite_to_conference(&group, &engine.public_key())
        .expect("invite bot");
    pump(&mut engine, 2);

    let conference = engine
        .conference(ConferenceId::new(0))
        .expect("joined conference");
    assert_eq!(conference.kind, ConferenceKind::AudioVideo);
    assert_eq!(conference.members.len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Call rejection
// ---------------------------------------------------------------------------

#[test]
fn calls_ring_out_then_are_rejected_with_matching_text() {
    let file = TempFile::new("calls");
    let (hub, list) = hub_with_bootstrap();
    let clock = ManualClock::new();
    let mut engine = echo_engine_with_clock(&hub, list, &file, &clock);
    engine.start().expect("start");
    pump(&mut engine, 1);

    let (mut b, _key_b) = attached_remote(&hub, SEED_B);
    befriend(&mut engine, &mut b, "hi");
    let bot_key = engine.public_key();

    // Audio-only call: nothing happens while it rings.
    b.offer_call(&bot_key, true, false).expect("offer");
    pump(&mut engine, 1);
    assert_eq!(engine.pending_call_count(), 1);
    pump(&mut engine, 3);
    assert!(b.poll(16).is_empty(), "no answer before the grace period");

    clock.advance(Duration::from_secs(3));
    pump(&mut engine, 1);
    assert_eq!(engine.pending_call_count(), 0);

    let events = b.poll(16);
    assert_eq!(events.len(), 2, "expected answer then text, got {events:?}");
    assert!(matches!(
        events[0],
        LinkEvent::CallAnswered { accept: false, .. }
    ));
    assert!(matches!(
        &events[1],
        LinkEvent::PeerMessage { text, .. } if text == DEFAULT_REJECT_AUDIO_TEXT
    ));

    // A call with video gets the video wording.
    b.offer_call(&bot_key, true, true).expect("offer");
    pump(&mut engine, 1);
    clock.advance(Duration::from_secs(3));
    pump(&mut engine, 1);

    let events = b.poll(16);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        LinkEvent::CallAnswered { accept: false, .. }
    ));
    assert!(matches!(
        &events[1],
        LinkEvent::PeerMessage { text, .. } if text == DEFAULT_REJECT_VIDEO_TEXT
    ));
}

// ---------------------------------------------------------------------------
// 4. Idle behavior
// ---------------------------------------------------------------------------

#[test]
fn idle_bot_stays_quiet() {
    let file = TempFile::new("idle");
    let (hub, list) = hub_with_bootstrap();
    let mut engine = echo_engine(&hub, list, &file);
    engine.start().expect("start");
    pump(&mut engine, 1);

    let (mut b, _key_b) = attached_remote(&hub, SEED_B);
    befriend(&mut engine, &mut b, "hi");

    let delay = engine.run_iteration();
    assert!(delay > Duration::ZERO);
    pump(&mut engine, 5);

    assert!(b.poll(16).is_empty(), "an idle bot sends nothing");
    assert_eq!(engine.peer_count(), 1);
    assert_eq!(engine.conference_count(), 0);
    assert_eq!(engine.pending_call_count(), 0);
    assert_eq!(engine.connectivity(), Connectivity::Direct);
}
