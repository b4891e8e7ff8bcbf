//! Playback Control
//!
//! The external player each user drives. The session engine only sees the
//! [`PlaybackControl`] trait; [`SpotifyClient`] is the production backend.

mod auth;
mod client;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use auth::{AppCredentials, SpotifyAuthorizer};
pub use client::{PlaybackError, SpotifyClient};
pub use types::*;

/// Read and command one user's player
#[async_trait]
pub trait PlaybackControl: Send + Sync {
    async fn state(&self) -> Result<PlaybackState, PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn seek(&self, position_ms: u64) -> Result<(), PlaybackError>;

    /// Start `uri` at `position_ms`, replacing whatever is playing
    async fn play(&self, uri: &str, position_ms: u64) -> Result<(), PlaybackError>;

    /// Current token, for persisting after a refresh
    fn token(&self) -> Option<OAuthToken>;
}

/// Authorization-code flow against the playback service
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// URL the user visits to grant access; `state` comes back on the callback
    fn authorize_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken, PlaybackError>;

    /// Build a player client from a stored or freshly exchanged token
    async fn client(&self, token: OAuthToken) -> Result<Arc<dyn PlaybackControl>, PlaybackError>;
}
