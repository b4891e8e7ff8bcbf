//! Command Dispatch
//!
//! The read loop of an admitted connection and the handlers for each
//! end-user opcode.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Inbound, TransportError};
use crate::hub::Hub;
use crate::protocol::{Message, Opcode, ProtocolError};
use crate::session::SessionError;
use crate::user::User;

pub const HELP_TEXT: &str = "
###### HELP ######
CREATE = Create a session
JOIN = Join a session someone has created e.g. \"join,username\"
EXIT/QUIT = Disconnect from the server
DISCONNECT = Leave the session
ID = Displays the ID of the current session
MSG = Send a message to other users in the same session e.g. \"msg,change the song?\"";

/// What the read loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// Read and dispatch messages until the connection ends, then disconnect
pub async fn serve(hub: &Hub, user: &Arc<User>, mut inbound: Inbound) {
    loop {
        let frame = match inbound.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(username = %user.name(), "Read failed: {}", e);
                break;
            }
            None => break,
        };

        let message = match Message::decode(&frame) {
            Ok(message) => message,
            Err(ProtocolError::UnknownOpcode(op)) => {
                debug!(username = %user.name(), %op, "Unknown opcode");
                if let Err(e) = user.send_info("Opcode doesn't exist").await {
                    debug!(username = %user.name(), "Write failed: {}", e);
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(username = %user.name(), "Discarding message: {}", e);
                continue;
            }
        };

        match dispatch(hub, user, &message).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Disconnect) => break,
            Err(e) => {
                debug!(username = %user.name(), "Write failed: {}", e);
                break;
            }
        }
    }

    user.disconnect(hub).await;
}

/// Apply one message from `user`
#[instrument(skip_all, fields(username = %user.name(), op = %message.op))]
pub async fn dispatch(hub: &Hub, user: &Arc<User>, message: &Message) -> Result<Flow, TransportError> {
    if message.op.is_internal() {
        debug!("Ignoring server-only opcode from client");
        return Ok(Flow::Continue);
    }

    match message.op {
        Opcode::Create => create(hub, user).await?,
        Opcode::Join => join(hub, user, &message.body).await?,
        Opcode::Disconnect => leave(hub, user).await?,
        Opcode::Id => {
            let id = user.session().map(|s| s.host_name().to_string());
            user.send_info(format!("ID: {}", id.as_deref().unwrap_or("N/A")))
                .await?;
        }
        Opcode::Msg => match user.session() {
            Some(session) => {
                if session.broadcast(user.name(), &message.body).is_err() {
                    user.send_info("No session to send message to").await?;
                }
            }
            None => user.send_info("No session to send message to").await?,
        },
        Opcode::Help => user.send_info(HELP_TEXT).await?,
        Opcode::Exit | Opcode::Quit => return Ok(Flow::Disconnect),
        // Server-only, filtered above
        Opcode::Auth | Opcode::Info | Opcode::Login | Opcode::Users => {}
    }

    Ok(Flow::Continue)
}

async fn create(hub: &Hub, user: &Arc<User>) -> Result<(), TransportError> {
    match hub.sessions().create(user, hub.config()) {
        Ok(session) => {
            user.send_info(format!("Session created for: {}", user.name()))
                .await?;
            user.send(&Message::users(&session.member_names())).await?;
        }
        Err(_) => {
            user.send_info("Cannot create a session while you're already in one")
                .await?
        }
    }
    Ok(())
}

async fn join(hub: &Hub, user: &Arc<User>, body: &str) -> Result<(), TransportError> {
    let target = body.split(',').next().unwrap_or_default().trim();

    let text = match hub.sessions().join(target, user) {
        Ok(_) => format!("Session ({}) joined by: {}", target, user.name()),
        Err(SessionError::AlreadyInSession) => {
            "Cannot join a session while you're already in one".to_string()
        }
        Err(_) => format!("Cannot join session ({}) for: {}", target, user.name()),
    };
    info!("{}", text);

    user.send_info(text).await
}

async fn leave(hub: &Hub, user: &Arc<User>) -> Result<(), TransportError> {
    let Some(session) = user.session() else {
        return user.send_info("Not in a session").await;
    };

    let is_host = session.is_host(user);
    if is_host {
        hub.sessions().close_session(&session);
    } else {
        if let Err(e) = session.unregister(user.clone()) {
            debug!("Unregister skipped: {}", e);
        }
        user.leave_session(&session);
    }
    info!(is_host, "Left session");

    user.send_info(format!(
        "Session ({}) left for: {}",
        session.host_name(),
        user.name()
    ))
    .await?;
    user.clear_user_list().await
}
