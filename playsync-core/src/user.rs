//! Connected Users
//!
//! A [`User`] is one admitted connection: its name, its write path, its
//! player, and a non-owning handle to the session it is in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::{Outbox, TransportError};
use crate::hub::Hub;
use crate::playback::PlaybackControl;
use crate::protocol::Message;
use crate::session::Session;

pub struct User {
    name: String,
    outbox: Outbox,
    playback: Arc<dyn PlaybackControl>,
    /// Sessions own their members; this side only looks up
    session: Mutex<Option<Weak<Session>>>,
    disconnected: AtomicBool,
}

impl User {
    pub fn new(name: impl Into<String>, outbox: Outbox, playback: Arc<dyn PlaybackControl>) -> Self {
        Self {
            name: name.into(),
            outbox,
            playback,
            session: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn playback(&self) -> &dyn PlaybackControl {
        self.playback.as_ref()
    }

    /// Session this user currently belongs to, if it is still active
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|s| s.is_active())
    }

    pub fn in_session(&self) -> bool {
        self.session().is_some()
    }

    pub(crate) fn join_session(&self, session: &Arc<Session>) {
        *self.session.lock() = Some(Arc::downgrade(session));
    }

    /// Clear the back-reference, but only if it still points at `session`
    pub(crate) fn leave_session(&self, session: &Session) {
        let mut current = self.session.lock();
        let matches = current
            .as_ref()
            .map(|weak| std::ptr::eq(weak.as_ptr(), session))
            .unwrap_or(false);
        if matches {
            *current = None;
        }
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.outbox.send(message).await
    }

    pub async fn send_info(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.outbox.info(text).await
    }

    /// Tell the client it no longer sees any session members
    pub async fn clear_user_list(&self) -> Result<(), TransportError> {
        self.outbox.send(&Message::users::<&str>(&[])).await
    }

    /// Close the transport without any session or hub cleanup
    pub(crate) async fn close_transport(&self) {
        self.outbox.close().await;
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Tear the connection down. Safe to call any number of times; only the
    /// first call does anything.
    pub async fn disconnect(self: &Arc<Self>, hub: &Hub) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(username = %self.name, "Disconnecting user");

        hub.release_connection(self);
        hub.handoffs().cancel_user(&self.name);
        self.save_token(hub).await;

        if let Some(session) = self.session() {
            if session.is_host(self) {
                hub.sessions().close_session(&session);
            } else {
                if let Err(e) = session.unregister(self.clone()) {
                    debug!(username = %self.name, "Unregister skipped: {}", e);
                }
                self.leave_session(&session);
            }
        }

        if let Err(e) = self.send_info("Disconnection occurring").await {
            debug!(username = %self.name, "Could not send farewell: {}", e);
        }
        self.outbox.close().await;
    }

    /// Persist the player's current token, if it has one
    pub(crate) async fn save_token(&self, hub: &Hub) {
        let Some(token) = self.playback.token() else {
            return;
        };
        match hub.store().get(&self.name).await {
            Ok(Some(mut entry)) if entry.token.as_ref() != Some(&token) => {
                entry.token = Some(token);
                if let Err(e) = hub.store().put(entry, true).await {
                    warn!(username = %self.name, "Failed to save token: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(username = %self.name, "Failed to load account: {}", e),
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
