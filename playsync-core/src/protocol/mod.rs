//! Session Protocol
//!
//! The JSON message envelope exchanged over a connection, the fixed opcode
//! vocabulary, the textual command grammar typed by interactive senders, and
//! the account-management request bodies.

mod account;
mod command;
mod message;

pub use account::*;
pub use command::*;
pub use message::*;
