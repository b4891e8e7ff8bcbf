//! Wire Messages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding or validating a message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Opcode doesn't exist: {0}")]
    UnknownOpcode(String),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The fixed set of opcodes understood by server and client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Opcode {
    // === Internal / protocol ===
    /// Server asks the client to complete an authorization flow (body = URL)
    Auth,
    /// Human-readable notice from the server
    Info,
    /// Server asks for credentials; the client replies with `name,password`
    Login,
    /// Comma-joined member list of the current session (empty = clear)
    Users,

    // === End-user ===
    Create,
    Join,
    Disconnect,
    Id,
    Msg,
    Help,
    Exit,
    Quit,
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::Auth,
        Opcode::Info,
        Opcode::Login,
        Opcode::Users,
        Opcode::Create,
        Opcode::Join,
        Opcode::Disconnect,
        Opcode::Id,
        Opcode::Msg,
        Opcode::Help,
        Opcode::Exit,
        Opcode::Quit,
    ];

    /// Canonical (uppercase) wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Auth => "AUTH",
            Opcode::Info => "INFO",
            Opcode::Login => "LOGIN",
            Opcode::Users => "USERS",
            Opcode::Create => "CREATE",
            Opcode::Join => "JOIN",
            Opcode::Disconnect => "DISCONNECT",
            Opcode::Id => "ID",
            Opcode::Msg => "MSG",
            Opcode::Help => "HELP",
            Opcode::Exit => "EXIT",
            Opcode::Quit => "QUIT",
        }
    }

    /// Whether the opcode is only ever sent by the server
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Opcode::Auth | Opcode::Info | Opcode::Login | Opcode::Users
        )
    }
}

impl FromStr for Opcode {
    type Err = ProtocolError;

    /// Parses the canonical wire name. Matching is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownOpcode(s.to_string()))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub op: Opcode,
    pub args: Option<Vec<String>>,
    pub body: String,
    /// Local send time, `HH:MM:SS`
    pub timestamp: String,
}

/// Envelope as received, before the opcode is validated
#[derive(Debug, Deserialize)]
struct RawMessage {
    op: String,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    timestamp: String,
}

impl Message {
    pub fn new(op: Opcode, body: impl Into<String>) -> Self {
        Self {
            op,
            args: None,
            body: body.into(),
            timestamp: current_time(),
        }
    }

    /// Notice from the server
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Opcode::Info, text)
    }

    /// Credential prompt
    pub fn login() -> Self {
        Self::new(Opcode::Login, "")
    }

    /// Authorization prompt carrying the URL to visit
    pub fn auth(url: impl Into<String>) -> Self {
        Self::new(Opcode::Auth, url)
    }

    /// Member list update. An empty list tells the client to clear its display.
    pub fn users<S: AsRef<str>>(names: &[S]) -> Self {
        let body = names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        Self::new(Opcode::Users, body)
    }

    /// Chat message relayed from `sender`
    pub fn chat(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            args: Some(vec![sender.into()]),
            ..Self::new(Opcode::Msg, text)
        }
    }

    /// Name of the sender of a chat message, if present
    pub fn sender(&self) -> Option<&str> {
        self.args
            .as_ref()
            .and_then(|args| args.first())
            .map(String::as_str)
    }

    /// Decode a text frame, rejecting opcodes outside the fixed set
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(text)?;
        let op = raw.op.parse()?;

        Ok(Self {
            op,
            args: raw.args,
            body: raw.body,
            timestamp: raw.timestamp,
        })
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current local wall-clock time, second precision
pub fn current_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_parse_is_case_sensitive() {
        assert_eq!("JOIN".parse::<Opcode>().unwrap(), Opcode::Join);
        assert_eq!("DISCONNECT".parse::<Opcode>().unwrap(), Opcode::Disconnect);
        assert!("join".parse::<Opcode>().is_err());
        assert!("PLAY".parse::<Opcode>().is_err());
    }

    #[test]
    fn test_every_opcode_round_trips_its_name() {
        for op in Opcode::ALL {
            assert_eq!(op.as_str().parse::<Opcode>().unwrap(), op);
        }
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        let err = Message::decode(r#"{"op":"DANCE","args":null,"body":"","timestamp":""}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOpcode(op) if op == "DANCE"));

        let err = Message::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let msg = Message::decode(r#"{"op":"CREATE"}"#).unwrap();
        assert_eq!(msg.op, Opcode::Create);
        assert_eq!(msg.args, None);
        assert_eq!(msg.body, "");
    }

    #[test]
    fn test_encode_envelope_shape() {
        let msg = Message::info("hello");
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

        assert_eq!(value["op"], "INFO");
        assert!(value["args"].is_null());
        assert_eq!(value["body"], "hello");

        let chat = Message::chat("alice", "hi");
        let value: serde_json::Value = serde_json::from_str(&chat.encode().unwrap()).unwrap();
        assert_eq!(value["op"], "MSG");
        assert_eq!(value["args"][0], "alice");
        assert_eq!(chat.sender(), Some("alice"));
    }

    #[test]
    fn test_users_body_is_comma_joined() {
        assert_eq!(Message::users(&["a", "b"]).body, "a,b");
        assert_eq!(Message::users::<&str>(&[]).body, "");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_time();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[5], b':');
    }
}
