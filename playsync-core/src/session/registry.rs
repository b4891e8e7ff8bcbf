//! Session Registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::SyncConfig;
use crate::user::User;

use super::{Session, SessionError};

/// Active sessions keyed by host name.
///
/// Create, join and close all run under one lock, so a member can never be
/// registered with a session that is concurrently being closed.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session hosted by `host`
    pub fn create(&self, host: &Arc<User>, config: &SyncConfig) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.lock();
        if host.in_session() || sessions.contains_key(host.name()) {
            return Err(SessionError::AlreadyInSession);
        }

        let session = Session::start(host.clone(), config);
        sessions.insert(host.name().to_string(), session.clone());
        Ok(session)
    }

    pub fn lookup(&self, host_name: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(host_name).cloned()
    }

    /// Register `user` with the session hosted by `host_name`
    pub fn join(&self, host_name: &str, user: &Arc<User>) -> Result<Arc<Session>, SessionError> {
        let sessions = self.sessions.lock();
        if user.in_session() {
            return Err(SessionError::AlreadyInSession);
        }

        let session = sessions
            .get(host_name)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(host_name.to_string()))?;
        session.register(user.clone())?;
        user.join_session(&session);

        info!(host = %host_name, username = %user.name(), "Joined session");
        Ok(session)
    }

    /// Close the session hosted by `host_name`. Idempotent.
    pub fn close(&self, host_name: &str) -> bool {
        let removed = self.sessions.lock().remove(host_name);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close `session`, removing it from the registry if it is still the
    /// entry for its host
    pub fn close_session(&self, session: &Arc<Session>) {
        let mut sessions = self.sessions.lock();
        let current = sessions
            .get(session.host_name())
            .map(|s| Arc::ptr_eq(s, session))
            .unwrap_or(false);
        if current {
            sessions.remove(session.host_name());
        }
        session.close();
    }

    /// Close everything; returns the sessions so callers can await them
    pub fn close_all(&self) -> Vec<Arc<Session>> {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close();
        }
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn host_names(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }
}
