//! PlaySync - Core Library
//!
//! Keeps a group of listeners playing the same track at the same position
//! as one host: the session engine, the wire protocol, admission, and the
//! playback-service and credential collaborators it depends on.

pub mod admission;
pub mod commands;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod handoff;
pub mod hub;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod user;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::SyncConfig;
pub use connection::{Inbound, MessageSink, Outbox, TransportError};
pub use hub::Hub;
pub use protocol::{Message, Opcode};
pub use session::{Session, SessionRegistry};
pub use user::User;
