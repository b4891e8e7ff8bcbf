//! Command Line Grammar
//!
//! Turns a line typed by a user (`join,alice`) into a wire message.

use super::message::{Message, Opcode, ProtocolError};

/// A parsed command, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    pub message: Message,
    /// Set for `EXIT`/`QUIT`: the sender should shut down locally after sending
    pub shutdown: bool,
}

/// Parse one typed line.
///
/// Field 0 is the opcode (any case), the remaining comma-separated fields
/// are joined back together to form the body. Returns `Ok(None)` for lines
/// that should not be transmitted at all.
pub fn parse_command(line: &str) -> Result<Option<ClientCommand>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let normalized = if line.contains(',') {
        line.to_string()
    } else {
        format!("{},", line)
    };

    let fields: Vec<&str> = normalized.split(',').collect();
    if fields.len() < 2 {
        return Ok(None);
    }

    let op: Opcode = fields[0].trim().to_uppercase().parse()?;
    let body = fields[1..].join(",");

    Ok(Some(ClientCommand {
        message: Message::new(op, body),
        shutdown: matches!(op, Opcode::Exit | Opcode::Quit),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_opcode_has_empty_body() {
        let cmd = parse_command("create").unwrap().unwrap();
        assert_eq!(cmd.message.op, Opcode::Create);
        assert_eq!(cmd.message.body, "");
        assert!(!cmd.shutdown);
    }

    #[test]
    fn test_body_keeps_inner_commas() {
        let cmd = parse_command("Msg,hello, world,again").unwrap().unwrap();
        assert_eq!(cmd.message.op, Opcode::Msg);
        assert_eq!(cmd.message.body, "hello, world,again");
    }

    #[test]
    fn test_join_target() {
        let cmd = parse_command("JOIN,alice").unwrap().unwrap();
        assert_eq!(cmd.message.op, Opcode::Join);
        assert_eq!(cmd.message.body, "alice");
    }

    #[test]
    fn test_blank_line_is_not_sent() {
        assert!(parse_command("").unwrap().is_none());
        assert!(parse_command("   ").unwrap().is_none());
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        assert!(matches!(
            parse_command("dance,now"),
            Err(ProtocolError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn test_exit_and_quit_request_shutdown() {
        assert!(parse_command("exit").unwrap().unwrap().shutdown);
        assert!(parse_command("QUIT").unwrap().unwrap().shutdown);
        assert!(!parse_command("disconnect").unwrap().unwrap().shutdown);
    }
}
