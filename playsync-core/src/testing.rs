//! Test doubles shared by the unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::SyncConfig;
use crate::connection::{Inbound, MessageSink, Outbox, TransportError};
use crate::credentials::{CredentialEntry, CredentialStore, MemoryStore};
use crate::hub::Hub;
use crate::playback::{Authorizer, OAuthToken, PlaybackControl, PlaybackError, PlaybackState, Track};
use crate::protocol::{Message, Opcode};
use crate::user::User;

// === Transport ===

#[derive(Default)]
struct SinkState {
    sent: Vec<String>,
    closed: bool,
}

/// Sink that keeps every frame written to it
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
    fail: Arc<AtomicBool>,
}

/// Read side of a [`RecordingSink`]
#[derive(Clone)]
pub struct Recorder {
    state: Arc<Mutex<SinkState>>,
    fail: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> (Self, Recorder) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                state: state.clone(),
                fail: fail.clone(),
            },
            Recorder { state, fail },
        )
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Socket("broken pipe".into()));
        }
        self.state.lock().sent.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

impl Recorder {
    pub fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|text| Message::decode(text).unwrap())
            .collect()
    }

    /// Bodies of every message with opcode `op`
    pub fn bodies(&self, op: Opcode) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.op == op)
            .map(|m| m.body)
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.bodies(Opcode::Info)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Make every later write fail
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Wait (up to five seconds of test time) until `pred` holds
    pub async fn wait_for(&self, pred: impl Fn(&[Message]) -> bool) {
        for _ in 0..500 {
            if pred(&self.messages()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached; sent: {:?}", self.messages());
    }

    pub async fn wait_for_info(&self, text: &str) {
        self.wait_for(|msgs| msgs.iter().any(|m| m.op == Opcode::Info && m.body == text))
            .await
    }

    pub async fn wait_for_users(&self, expected: &[&str]) {
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        self.wait_for(|msgs| {
            msgs.iter()
                .rev()
                .find(|m| m.op == Opcode::Users)
                .map(|m| sorted_names(&m.body) == expected)
                .unwrap_or(false)
        })
        .await
    }
}

pub fn sorted_names(body: &str) -> Vec<String> {
    let mut names: Vec<String> = body
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Inbound stream fed by the test
pub fn inbound() -> (mpsc::UnboundedSender<Result<String, TransportError>>, Inbound) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, stream)
}

pub fn frame(op: Opcode, body: &str) -> Result<String, TransportError> {
    Ok(Message::new(op, body).encode().unwrap())
}

// === Playback ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    State,
    Pause,
    Seek(u64),
    Play(String, u64),
}

/// Scripted player that records every call
pub struct FakePlayer {
    state: Mutex<Option<PlaybackState>>,
    state_delay: Mutex<Duration>,
    fail_commands: AtomicBool,
    calls: Mutex<Vec<PlayerCall>>,
}

impl FakePlayer {
    /// Player with no active device
    pub fn new() -> Arc<Self> {
        Self::with_state(PlaybackState::no_device())
    }

    pub fn with_state(state: PlaybackState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Some(state)),
            state_delay: Mutex::new(Duration::ZERO),
            fail_commands: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_state(&self, state: PlaybackState) {
        *self.state.lock() = Some(state);
    }

    /// Make state fetches fail
    pub fn fail_state(&self) {
        *self.state.lock() = None;
    }

    pub fn fail_commands(&self) {
        self.fail_commands.store(true, Ordering::SeqCst);
    }

    /// Simulated round-trip time of a state fetch
    pub fn set_state_delay(&self, delay: Duration) {
        *self.state_delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls other than state fetches
    pub fn commands(&self) -> Vec<PlayerCall> {
        self.calls()
            .into_iter()
            .filter(|c| *c != PlayerCall::State)
            .collect()
    }

    fn command(&self, call: PlayerCall) -> Result<(), PlaybackError> {
        self.calls.lock().push(call);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(PlaybackError::Api("scripted failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackControl for FakePlayer {
    async fn state(&self) -> Result<PlaybackState, PlaybackError> {
        self.calls.lock().push(PlayerCall::State);
        let delay = *self.state_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().clone();
        state.ok_or(PlaybackError::Api("scripted failure".into()))
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.command(PlayerCall::Pause)
    }

    async fn seek(&self, position_ms: u64) -> Result<(), PlaybackError> {
        self.command(PlayerCall::Seek(position_ms))
    }

    async fn play(&self, uri: &str, position_ms: u64) -> Result<(), PlaybackError> {
        self.command(PlayerCall::Play(uri.to_string(), position_ms))
    }

    fn token(&self) -> Option<OAuthToken> {
        None
    }
}

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        uri: format!("spotify:track:{}", id),
        name: format!("Song {}", id),
    }
}

pub fn playing(id: &str, progress_ms: u64) -> PlaybackState {
    PlaybackState {
        has_device: true,
        is_playing: true,
        track: Some(track(id)),
        progress_ms,
    }
}

pub fn paused(id: &str, progress_ms: u64) -> PlaybackState {
    PlaybackState {
        is_playing: false,
        ..playing(id, progress_ms)
    }
}

pub fn token(access: &str) -> OAuthToken {
    OAuthToken {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: Some(format!("{}-refresh", access)),
        expiry: None,
    }
}

/// Authorizer that accepts any code and hands out fake players
#[derive(Default)]
pub struct FakeAuthorizer {
    pub clients: Mutex<Vec<OAuthToken>>,
}

#[async_trait]
impl Authorizer for FakeAuthorizer {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://auth.test/authorize?state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken, PlaybackError> {
        Ok(token(code))
    }

    async fn client(&self, token: OAuthToken) -> Result<Arc<dyn PlaybackControl>, PlaybackError> {
        self.clients.lock().push(token);
        Ok(FakePlayer::new())
    }
}

// === Users and hub ===

/// An admitted user wired to a recorder and a scripted player
pub fn user(name: &str) -> (Arc<User>, Recorder, Arc<FakePlayer>) {
    let (sink, recorder) = RecordingSink::new();
    let player = FakePlayer::new();
    let user = Arc::new(User::new(name, Outbox::new(sink), player.clone()));
    (user, recorder, player)
}

pub fn hub() -> Arc<Hub> {
    hub_with(Arc::new(MemoryStore::new()), Arc::new(FakeAuthorizer::default()))
}

pub fn hub_with(store: Arc<dyn CredentialStore>, authorizer: Arc<dyn Authorizer>) -> Arc<Hub> {
    Hub::new(store, authorizer, SyncConfig::default())
}

/// Account with a stored token, so admission skips the OAuth flow
pub async fn seed_account(store: &dyn CredentialStore, name: &str, password: &str) {
    let mut entry = CredentialEntry::new(name, password).unwrap();
    entry.token = Some(token(name));
    store.put(entry, false).await.unwrap();
}

/// A user admitted into `hub` directly, bypassing the handshake
pub fn connected(hub: &Hub, name: &str) -> (Arc<User>, Recorder, Arc<FakePlayer>) {
    let (user, recorder, player) = user(name);
    hub.register_connection(user.clone()).unwrap();
    (user, recorder, player)
}
