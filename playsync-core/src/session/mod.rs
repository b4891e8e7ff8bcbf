//! Session Engine
//!
//! A session is one host plus the followers mirroring the host's player.
//! Each session runs two tasks: a membership loop that owns every change to
//! the member set, and a sync loop that reconciles followers on a timer.

mod registry;
mod sync;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::protocol::Message;
use crate::user::User;

pub use registry::SessionRegistry;
pub use sync::{decide, progress_matches, reconcile, SyncAction, TickReport, PROGRESS_TOLERANCE_MS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,

    #[error("Already in a session")]
    AlreadyInSession,

    #[error("No session hosted by {0}")]
    NotFound(String),
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    /// Close requested; the membership loop is evicting members
    Closing,
    Closed,
}

/// Work for the membership loop
enum SessionEvent {
    Register(Arc<User>),
    Unregister(Arc<User>),
    Broadcast { sender: String, text: String },
}

pub struct Session {
    host: Arc<User>,
    /// Written only by the membership loop (and `start`)
    members: RwLock<HashMap<String, Arc<User>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    phase: watch::Sender<Phase>,
}

impl Session {
    /// Create a session hosted by `host` and spawn its loops
    pub fn start(host: Arc<User>, config: &SyncConfig) -> Arc<Session> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(Phase::Active);
        let (quit_tx, quit_rx) = oneshot::channel();

        let mut members = HashMap::new();
        members.insert(host.name().to_string(), host.clone());

        let session = Arc::new(Session {
            host,
            members: RwLock::new(members),
            events: events_tx,
            phase: phase_tx,
        });
        session.host.join_session(&session);

        info!(host = %session.host_name(), "Session created");

        tokio::spawn(session.clone().run_membership(events_rx, phase_rx, quit_tx));
        tokio::spawn(sync::run_sync(session.clone(), config.tick_period(), quit_rx));

        session
    }

    pub fn host(&self) -> &Arc<User> {
        &self.host
    }

    /// Sessions are named after their host
    pub fn host_name(&self) -> &str {
        self.host.name()
    }

    pub fn is_host(&self, user: &User) -> bool {
        std::ptr::eq(self.host.as_ref(), user)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.phase() == Phase::Active
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.read().contains_key(name)
    }

    /// Consistent snapshot of every member except the host
    pub fn followers(&self) -> Vec<Arc<User>> {
        self.members
            .read()
            .values()
            .filter(|u| !self.is_host(u))
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<User>> {
        self.members.read().values().cloned().collect()
    }

    fn submit(&self, event: SessionEvent) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::Closed);
        }
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    pub fn register(&self, user: Arc<User>) -> Result<(), SessionError> {
        self.submit(SessionEvent::Register(user))
    }

    pub fn unregister(&self, user: Arc<User>) -> Result<(), SessionError> {
        self.submit(SessionEvent::Unregister(user))
    }

    /// Relay a chat line from `sender` to every member
    pub fn broadcast(&self, sender: &str, text: &str) -> Result<(), SessionError> {
        self.submit(SessionEvent::Broadcast {
            sender: sender.to_string(),
            text: text.to_string(),
        })
    }

    /// Ask the session to shut down. Returns whether this call started it.
    pub fn close(&self) -> bool {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Active {
                *phase = Phase::Closing;
                true
            } else {
                false
            }
        });
        if started {
            info!(host = %self.host_name(), "Session closing");
        }
        started
    }

    /// Resolves once every member has been evicted
    pub async fn wait_closed(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == Phase::Closed).await;
    }

    /// Send the current member list to every member
    pub async fn announce_members(&self) {
        let users = Message::users(&self.member_names());
        for member in self.snapshot() {
            if let Err(e) = member.send(&users).await {
                debug!(username = %member.name(), "Member list not delivered: {}", e);
            }
        }
    }

    async fn run_membership(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut phase: watch::Receiver<Phase>,
        quit: oneshot::Sender<()>,
    ) {
        loop {
            if *phase.borrow_and_update() != Phase::Active {
                break;
            }
            tokio::select! {
                biased;
                changed = phase.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(event) = events.recv() => self.apply(event).await,
            }
        }

        self.shutdown(events, quit).await;
    }

    async fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::Register(user) => {
                debug!(host = %self.host_name(), username = %user.name(), "Member registered");
                self.members
                    .write()
                    .insert(user.name().to_string(), user);
                self.announce_members().await;
            }
            SessionEvent::Unregister(user) => {
                if !self.is_host(&user) {
                    let mut members = self.members.write();
                    let present = members
                        .get(user.name())
                        .map(|m| Arc::ptr_eq(m, &user))
                        .unwrap_or(false);
                    if present {
                        members.remove(user.name());
                        debug!(host = %self.host_name(), username = %user.name(), "Member unregistered");
                    }
                }
                self.announce_members().await;
            }
            SessionEvent::Broadcast { sender, text } => {
                let message = Message::chat(sender, text);
                for member in self.snapshot() {
                    if let Err(e) = member.send(&message).await {
                        warn!(username = %member.name(), "Broadcast not delivered: {}", e);
                    }
                }
            }
        }
    }

    async fn shutdown(
        &self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        quit: oneshot::Sender<()>,
    ) {
        // Nothing new gets in; registrations already queued are evicted too
        events.close();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Register(user) = event {
                self.members
                    .write()
                    .insert(user.name().to_string(), user);
            }
        }

        let _ = quit.send(());

        let evicted: Vec<Arc<User>> = self.members.write().drain().map(|(_, u)| u).collect();
        let notice = format!("Session ({}) closed", self.host_name());
        for member in &evicted {
            member.leave_session(self);
            if let Err(e) = member.send_info(notice.as_str()).await {
                debug!(username = %member.name(), "Close notice not delivered: {}", e);
            }
            let _ = member.clear_user_list().await;
        }

        info!(host = %self.host_name(), evicted = evicted.len(), "Session closed");
        self.phase.send_replace(Phase::Closed);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host_name())
            .field("phase", &self.phase())
            .field("members", &self.member_names())
            .finish()
    }
}
