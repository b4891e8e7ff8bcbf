//! Admission Handshake
//!
//! Every new connection is asked to log in, checked against the credential
//! store, and bound to a player client before it may send session commands.
//! Users without a stored token are sent through the OAuth flow first.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Inbound, Outbox, TransportError};
use crate::credentials::StoreError;
use crate::handoff::HandoffError;
use crate::hub::Hub;
use crate::playback::{PlaybackControl, PlaybackError};
use crate::protocol::Message;
use crate::user::User;

/// Sent once a connection is admitted
pub const ADMITTED_TEXT: &str = "Spotify client authorised, handshake successful!";

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("timeout: no login reply received")]
    LoginTimeout,

    #[error("No username or password")]
    MalformedLogin,

    #[error("Connection closed during handshake")]
    Closed,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User already connected")]
    AlreadyConnected,

    #[error("timeout: authorization was not completed")]
    AuthorizationTimeout,

    #[error("Authorization was abandoned")]
    AuthorizationAbandoned,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Playback client error: {0}")]
    Playback(#[from] PlaybackError),
}

impl From<HandoffError> for AdmissionError {
    fn from(e: HandoffError) -> Self {
        match e {
            HandoffError::Timeout => AdmissionError::AuthorizationTimeout,
            HandoffError::Abandoned | HandoffError::UnknownState => AdmissionError::AuthorizationAbandoned,
        }
    }
}

/// Run the handshake on a fresh connection.
///
/// On success the user is in the hub's connected set. On failure the
/// connection has been told why and closed.
pub async fn admit(hub: &Hub, outbox: Outbox, inbound: &mut Inbound) -> Result<Arc<User>, AdmissionError> {
    let (name, playback) = match handshake(hub, &outbox, inbound).await {
        Ok(admitted) => admitted,
        Err(e) => {
            reject(&outbox, &e).await;
            return Err(e);
        }
    };

    let user = Arc::new(User::new(name, outbox, playback));
    if let Err(e) = hub.register_connection(user.clone()) {
        let _ = user.send_info(format!("Handshake failed: {}", e)).await;
        user.close_transport().await;
        return Err(e);
    }

    info!(username = %user.name(), "User admitted");
    if let Err(e) = user.send_info(ADMITTED_TEXT).await {
        user.disconnect(hub).await;
        return Err(e.into());
    }

    Ok(user)
}

async fn reject(outbox: &Outbox, error: &AdmissionError) {
    warn!("Handshake rejected: {}", error);
    let _ = outbox.info(format!("Handshake failed: {}", error)).await;
    outbox.close().await;
}

#[instrument(skip_all)]
async fn handshake(
    hub: &Hub,
    outbox: &Outbox,
    inbound: &mut Inbound,
) -> Result<(String, Arc<dyn PlaybackControl>), AdmissionError> {
    outbox.send(&Message::login()).await?;

    let reply = match tokio::time::timeout(hub.config().login_timeout, inbound.next()).await {
        Err(_) => return Err(AdmissionError::LoginTimeout),
        Ok(None) => return Err(AdmissionError::Closed),
        Ok(Some(frame)) => frame?,
    };
    let (name, password) = parse_login(&reply)?;
    debug!(username = %name, "Login received");

    let entry = hub
        .store()
        .get(&name)
        .await?
        .ok_or(AdmissionError::InvalidCredentials)?;
    if !entry.verify(&password) {
        return Err(AdmissionError::InvalidCredentials);
    }

    if hub.is_connected(&name) {
        return Err(AdmissionError::AlreadyConnected);
    }

    if let Some(token) = entry.token.clone() {
        match hub.authorizer().client(token).await {
            Ok(client) => return Ok((name, client)),
            Err(e) => warn!(username = %name, "Stored token unusable, re-authorizing: {}", e),
        }
    }

    let mut handoff = hub.handoffs().open(&name);
    let url = hub.authorizer().authorize_url(handoff.state().as_str());
    outbox.send(&Message::auth(url)).await?;

    let token = handoff.token(hub.config().token_timeout).await?;
    let client = handoff.client(hub.config().client_timeout).await?;

    let mut entry = entry;
    entry.token = Some(token);
    hub.store().put(entry, true).await?;
    debug!(username = %name, "Authorization stored");

    Ok((name, client))
}

/// `name,password` from the body of a login reply
fn parse_login(frame: &str) -> Result<(String, String), AdmissionError> {
    let message = Message::decode(frame).map_err(|_| AdmissionError::MalformedLogin)?;
    let parts: Vec<&str> = message.body.split(',').collect();
    match parts.as_slice() {
        [name, password] if !name.is_empty() => Ok((name.to_string(), password.to_string())),
        _ => Err(AdmissionError::MalformedLogin),
    }
}
