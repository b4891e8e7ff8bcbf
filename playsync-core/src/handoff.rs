//! Authorization Hand-off
//!
//! A handshake waiting on the out-of-band OAuth flow parks here under a
//! random state token. The HTTP callback finds it by that token and delivers
//! first the access token, then the constructed player client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::playback::{OAuthToken, PlaybackControl};

/// Characters used in state tokens (unambiguous, uppercase)
const ALPHABET: &[u8] = b"346789ABCDEFGHJKMNPQRTUVWXY";

const STATE_LENGTH: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Timed out waiting for authorization")]
    Timeout,

    #[error("Authorization was abandoned")]
    Abandoned,

    #[error("State mismatch")]
    UnknownState,
}

/// Correlation token carried through the OAuth redirect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthState(String);

impl AuthState {
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let state = (0..STATE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        AuthState(state)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AuthState {
    fn from(s: &str) -> Self {
        AuthState(s.to_string())
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Pending {
    username: String,
    token: Option<oneshot::Sender<OAuthToken>>,
    client: Option<oneshot::Sender<Arc<dyn PlaybackControl>>>,
}

/// Table of handshakes waiting on the OAuth callback
#[derive(Default)]
pub struct PendingAuthorizations {
    entries: Mutex<HashMap<AuthState, Pending>>,
}

impl PendingAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a handshake for `username`. The entry lives as long as the guard.
    pub fn open(&self, username: &str) -> Handoff<'_> {
        let (token_tx, token_rx) = oneshot::channel();
        let (client_tx, client_rx) = oneshot::channel();

        let mut entries = self.entries.lock();
        let mut state = AuthState::random();
        while entries.contains_key(&state) {
            state = AuthState::random();
        }
        entries.insert(
            state.clone(),
            Pending {
                username: username.to_string(),
                token: Some(token_tx),
                client: Some(client_tx),
            },
        );
        debug!(username, state = %state, "Authorization pending");

        Handoff {
            table: self,
            state,
            token: token_rx,
            client: client_rx,
        }
    }

    /// User waiting under `state`
    pub fn username(&self, state: &AuthState) -> Option<String> {
        self.entries.lock().get(state).map(|p| p.username.clone())
    }

    pub fn contains(&self, state: &AuthState) -> bool {
        self.entries.lock().contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deliver_token(&self, state: &AuthState, token: OAuthToken) -> Result<(), HandoffError> {
        let sender = self
            .entries
            .lock()
            .get_mut(state)
            .and_then(|p| p.token.take())
            .ok_or(HandoffError::UnknownState)?;
        sender.send(token).map_err(|_| HandoffError::Abandoned)
    }

    /// Deliver the player client; completes and removes the entry
    pub fn deliver_client(
        &self,
        state: &AuthState,
        client: Arc<dyn PlaybackControl>,
    ) -> Result<(), HandoffError> {
        let pending = self
            .entries
            .lock()
            .remove(state)
            .ok_or(HandoffError::UnknownState)?;
        pending
            .client
            .ok_or(HandoffError::UnknownState)?
            .send(client)
            .map_err(|_| HandoffError::Abandoned)
    }

    /// Drop every pending entry for `username`, waking its waiters
    pub fn cancel_user(&self, username: &str) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, p| p.username != username);
        if entries.len() != before {
            debug!(username, "Cancelled pending authorization");
        }
    }

    /// Drop every pending entry, waking all waiters. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let cancelled: Vec<Pending> = self.entries.lock().drain().map(|(_, p)| p).collect();
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "Cancelled pending authorizations");
        }
        cancelled.len()
    }

    fn remove(&self, state: &AuthState) {
        self.entries.lock().remove(state);
    }
}

/// A parked handshake. Dropping it removes the table entry.
pub struct Handoff<'a> {
    table: &'a PendingAuthorizations,
    state: AuthState,
    token: oneshot::Receiver<OAuthToken>,
    client: oneshot::Receiver<Arc<dyn PlaybackControl>>,
}

impl Handoff<'_> {
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub async fn token(&mut self, timeout: Duration) -> Result<OAuthToken, HandoffError> {
        match tokio::time::timeout(timeout, &mut self.token).await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(_)) => Err(HandoffError::Abandoned),
            Err(_) => Err(HandoffError::Timeout),
        }
    }

    pub async fn client(
        &mut self,
        timeout: Duration,
    ) -> Result<Arc<dyn PlaybackControl>, HandoffError> {
        match tokio::time::timeout(timeout, &mut self.client).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(_)) => Err(HandoffError::Abandoned),
            Err(_) => Err(HandoffError::Timeout),
        }
    }
}

impl Drop for Handoff<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.state);
    }
}
