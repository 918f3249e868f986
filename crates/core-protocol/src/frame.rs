//! Broadcast and reply framing.
//!
//! One frame per non-empty tick:
//!
//! ```text
//! VERSION <new_version>
//! EDIT <username> <command> <result>
//! …
//! END
//! ```
//!
//! Query replies echo the query name on its own line. The handshake reply is
//! role, version and byte length on their own lines followed by the raw
//! document bytes.

use crate::CommandResult;
use std::fmt::Write as _;

/// Outcome line for one queued command, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    pub username: String,
    pub command: String,
    pub result: CommandResult,
}

/// One batch broadcast: the newly committed version plus its outcome lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFrame {
    pub version: u64,
    pub entries: Vec<EditRecord>,
}

impl BroadcastFrame {
    pub fn render(&self) -> String {
        let mut out = format!("VERSION {}\n", self.version);
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "EDIT {} {} {}",
                entry.username, entry.command, entry.result
            );
        }
        out.push_str("END\n");
        out
    }
}

/// Handshake reply after a successful authentication.
pub fn hello_reply(role: &str, version: u64, doc: &[u8]) -> Vec<u8> {
    let mut out = format!("{role}\n{version}\n{}\n", doc.len()).into_bytes();
    out.extend_from_slice(doc);
    out
}

/// `DOC?` reply: the current flatten.
pub fn doc_reply(doc: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(doc.len() + 6);
    out.extend_from_slice(b"DOC?\n");
    out.extend_from_slice(doc);
    out.push(b'\n');
    out
}

/// `PERM?` reply: the session's role.
pub fn perm_reply(role: &str) -> String {
    format!("PERM?\n{role}\n")
}

/// `LOG?` reply: every broadcast frame so far, verbatim.
pub fn log_reply(log: &str) -> String {
    format!("LOG?\n{log}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_renders_in_application_order() {
        let frame = BroadcastFrame {
            version: 3,
            entries: vec![
                EditRecord {
                    username: "alice".to_string(),
                    command: "INSERT 0 Hi".to_string(),
                    result: CommandResult::Success,
                },
                EditRecord {
                    username: "bob".to_string(),
                    command: "BOLD 0 5".to_string(),
                    result: CommandResult::Unauthorised,
                },
            ],
        };
        assert_eq!(
            frame.render(),
            "VERSION 3\n\
             EDIT alice INSERT 0 Hi SUCCESS\n\
             EDIT bob BOLD 0 5 Reject UNAUTHORISED\n\
             END\n"
        );
    }

    #[test]
    fn empty_frame_still_brackets_version() {
        let frame = BroadcastFrame {
            version: 1,
            entries: Vec::new(),
        };
        assert_eq!(frame.render(), "VERSION 1\nEND\n");
    }

    #[test]
    fn hello_reply_carries_length_then_bytes() {
        assert_eq!(
            hello_reply("write", 4, b"Hello"),
            b"write\n4\n5\nHello".to_vec()
        );
        assert_eq!(hello_reply("read", 0, b""), b"read\n0\n0\n".to_vec());
    }

    #[test]
    fn query_replies_echo_their_names() {
        assert_eq!(doc_reply(b"body"), b"DOC?\nbody\n".to_vec());
        assert_eq!(perm_reply("read"), "PERM?\nread\n");
        assert_eq!(log_reply("VERSION 1\nEND\n"), "LOG?\nVERSION 1\nEND\n");
    }
}
