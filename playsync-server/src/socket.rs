//! WebSocket adapter
//!
//! Splits an upgraded axum socket into the outbox / inbound pair the hub
//! works with.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use playsync_core::{Inbound, MessageSink, Outbox, TransportError};

/// Write half of an upgraded socket
pub struct WsSink(SplitSink<WebSocket, WsMessage>);

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }
}

/// Text payload of a frame; `None` for frames that carry no message
fn frame_text(frame: WsMessage) -> Option<String> {
    match frame {
        WsMessage::Text(text) => Some(text),
        WsMessage::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) => None,
    }
}

/// Split `socket` into an outbox and a stream of text frames that ends at
/// the peer's close frame
pub fn split(socket: WebSocket) -> (Outbox, Inbound) {
    let (sink, stream) = socket.split();

    let inbound = stream
        .take_while(|frame| futures::future::ready(!matches!(frame, Ok(WsMessage::Close(_)))))
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame_text(frame).map(Ok),
                Err(e) => Some(Err(TransportError::Socket(e.to_string()))),
            }
        })
        .boxed();

    (Outbox::new(WsSink(sink)), inbound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_text() {
        assert_eq!(frame_text(WsMessage::Text("hi".into())), Some("hi".into()));
        assert_eq!(frame_text(WsMessage::Binary(b"hi".to_vec())), Some("hi".into()));
        assert_eq!(frame_text(WsMessage::Ping(vec![1])), None);
        assert_eq!(frame_text(WsMessage::Close(None)), None);
    }
}
