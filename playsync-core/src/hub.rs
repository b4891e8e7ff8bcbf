//! Server Core
//!
//! [`Hub`] owns every piece of process-wide state: the session registry,
//! the set of connected users, and the pending authorizations. Front ends
//! hold an `Arc<Hub>` and hand it new connections.
//!
//! Locking: the connected map and the registry each sit behind their own
//! mutex, and every check-then-act on them (name not taken then insert,
//! no session then create) happens under that one lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::admission::{self, AdmissionError};
use crate::commands;
use crate::config::SyncConfig;
use crate::connection::{Inbound, Outbox};
use crate::credentials::CredentialStore;
use crate::handoff::{AuthState, HandoffError, PendingAuthorizations};
use crate::playback::{Authorizer, PlaybackError};
use crate::session::SessionRegistry;
use crate::user::User;

/// Errors completing an OAuth callback
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

pub struct Hub {
    sessions: SessionRegistry,
    connected: Mutex<HashMap<String, Arc<User>>>,
    handoffs: PendingAuthorizations,
    store: Arc<dyn CredentialStore>,
    authorizer: Arc<dyn Authorizer>,
    config: SyncConfig,
}

impl Hub {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authorizer: Arc<dyn Authorizer>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionRegistry::new(),
            connected: Mutex::new(HashMap::new()),
            handoffs: PendingAuthorizations::new(),
            store,
            authorizer,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn handoffs(&self) -> &PendingAuthorizations {
        &self.handoffs
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Drive one connection from handshake to disconnect
    pub async fn accept(self: Arc<Self>, outbox: Outbox, mut inbound: Inbound) {
        let user = match admission::admit(&self, outbox, &mut inbound).await {
            Ok(user) => user,
            Err(e) => {
                info!("Connection not admitted: {}", e);
                return;
            }
        };

        commands::serve(&self, &user, inbound).await;
    }

    /// Finish the OAuth flow parked under `state`
    #[instrument(skip(self, code))]
    pub async fn complete_authorization(&self, state: &AuthState, code: &str) -> Result<(), AuthorizationError> {
        let Some(username) = self.handoffs.username(state) else {
            return Err(HandoffError::UnknownState.into());
        };

        let token = self.authorizer.exchange_code(code).await?;
        self.handoffs.deliver_token(state, token.clone())?;

        let client = self.authorizer.client(token).await?;
        self.handoffs.deliver_client(state, client)?;

        info!(%username, "Authorization completed");
        Ok(())
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected.lock().contains_key(name)
    }

    /// Claim `user`'s name; fails if someone else already holds it
    pub fn register_connection(&self, user: Arc<User>) -> Result<(), AdmissionError> {
        let mut connected = self.connected.lock();
        if connected.contains_key(user.name()) {
            return Err(AdmissionError::AlreadyConnected);
        }
        connected.insert(user.name().to_string(), user);
        Ok(())
    }

    /// Release `user`'s name, if it is still theirs
    pub fn release_connection(&self, user: &Arc<User>) {
        let mut connected = self.connected.lock();
        let owned = connected
            .get(user.name())
            .map(|u| Arc::ptr_eq(u, user))
            .unwrap_or(false);
        if owned {
            connected.remove(user.name());
        }
    }

    pub fn connected_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connected.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every session and disconnect every user
    pub async fn shutdown(&self) {
        let cancelled = self.handoffs.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelled pending authorizations");
        }

        debug!(hosts = ?self.sessions.host_names(), "Closing sessions");
        let sessions = self.sessions.close_all();
        for session in &sessions {
            session.wait_closed().await;
        }

        let users: Vec<Arc<User>> = self.connected.lock().values().cloned().collect();
        for user in users {
            user.disconnect(self).await;
        }

        info!(sessions = sessions.len(), "Hub shut down");
    }
}
