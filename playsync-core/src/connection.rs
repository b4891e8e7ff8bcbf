//! Connection Transport
//!
//! The duplex connection is split in two: an [`Outbox`] owning the write
//! half behind a lock, and an [`Inbound`] stream of text frames read by the
//! connection's own task.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::{Message, ProtocolError};

/// Errors on the transport itself
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Encoding error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Write half of a connection
#[async_trait]
pub trait MessageSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection: text frames until the peer goes away
pub type Inbound = BoxStream<'static, Result<String, TransportError>>;

/// Serialized write path for one connection.
///
/// The read loop, the session's membership loop and the sync loop all
/// write through here; the async lock keeps frames whole.
pub struct Outbox {
    sink: Mutex<Option<Box<dyn MessageSink>>>,
}

impl Outbox {
    pub fn new(sink: impl MessageSink + 'static) -> Self {
        Self {
            sink: Mutex::new(Some(Box::new(sink))),
        }
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let text = message.encode()?;
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send_text(text).await,
            None => Err(TransportError::Closed),
        }
    }

    pub async fn info(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(&Message::info(text)).await
    }

    /// Close the write half. Later calls and sends are no-ops / `Closed`.
    pub async fn close(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Error closing connection: {}", e);
            }
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use crate::testing::RecordingSink;

    #[tokio::test]
    async fn test_send_encodes_json() {
        let (sink, recorder) = RecordingSink::new();
        let outbox = Outbox::new(sink);

        outbox.info("hello").await.unwrap();

        let sent = recorder.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].op, Opcode::Info);
        assert_eq!(sent[0].body, "hello");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (sink, recorder) = RecordingSink::new();
        let outbox = Outbox::new(sink);

        outbox.close().await;
        outbox.close().await;

        assert!(outbox.is_closed().await);
        assert!(recorder.is_closed());
        assert!(matches!(
            outbox.info("late").await,
            Err(TransportError::Closed)
        ));
    }
}
