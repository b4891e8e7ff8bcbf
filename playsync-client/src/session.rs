//! Interactive session over the server's WebSocket
//!
//! Server frames are printed line by line; stdin lines are parsed with the
//! shared command grammar and sent back.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use playsync_core::protocol::{parse_command, Message, Opcode, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No server address configured")]
    NoAddress,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub fn ws_url(address: &str, use_ssl: bool) -> String {
    let scheme = if use_ssl { "wss" } else { "ws" };
    format!("{}://{}/ws", scheme, address)
}

/// Reply to the server's `LOGIN` prompt
pub fn login_reply(config: &ClientConfig) -> Message {
    Message::new(Opcode::Login, format!("{},{}", config.username, config.password))
}

/// Printable line for a server message; `None` for messages with nothing to show
pub fn render(message: &Message) -> Option<String> {
    let line = match message.op {
        Opcode::Auth => format!(
            "[{}] <SERVER> Please authorise the client through: {}",
            message.timestamp, message.body
        ),
        Opcode::Info => format!("[{}] <SERVER> INFO: {}", message.timestamp, message.body),
        Opcode::Msg => format!(
            "[{}] <{}>: {}",
            message.timestamp,
            message.sender().unwrap_or("unknown"),
            message.body
        ),
        Opcode::Users if message.body.is_empty() => "USERS: (none)".to_string(),
        Opcode::Users => format!("USERS: {}", message.body.replace(',', ", ")),
        _ => return None,
    };
    Some(line)
}

async fn send(sink: &mut WsSink, message: &Message) -> Result<(), ClientError> {
    sink.send(WsMessage::Text(message.encode()?)).await?;
    Ok(())
}

async fn send_close(sink: &mut WsSink) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
        debug!("Couldn't send close frame: {}", e);
    }
}

/// Connect and run until the server closes, the user exits, or Ctrl-C
pub async fn run(config: &ClientConfig, use_ssl: bool) -> Result<(), ClientError> {
    if config.address.is_empty() {
        return Err(ClientError::NoAddress);
    }

    let url = ws_url(&config.address, use_ssl);
    info!(%url, "Dialing");
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                    Ok(message) if message.op == Opcode::Login => {
                        debug!("Answering login prompt");
                        send(&mut ws_tx, &login_reply(config)).await?;
                    }
                    Ok(message) => {
                        if let Some(line) = render(&message) {
                            println!("{}", line);
                        }
                    }
                    Err(e) => warn!("Discarding unreadable frame: {}", e),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("Connection closed");
                    break;
                }
            },

            line = lines.next_line() => match line? {
                Some(line) => match parse_command(&line) {
                    Ok(Some(command)) => {
                        send(&mut ws_tx, &command.message).await?;
                        if command.shutdown {
                            info!("Exiting");
                            send_close(&mut ws_tx).await;
                            break;
                        }
                    }
                    Ok(None) => debug!(%line, "Input ignored"),
                    Err(e) => println!("{}", e),
                },
                None => {
                    send_close(&mut ws_tx).await;
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing connection");
                send_close(&mut ws_tx).await;
                break;
            }
        }
    }

    Ok(())
}
