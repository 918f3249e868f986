//! Wire protocol shared by the server and its tests: the one-line command
//! grammar, the result vocabulary, and the broadcast/reply framing.
//!
//! Parsing is pure classification with no side effects and no document
//! access, so the session layer can route queries inline and the scheduler
//! can re-parse queued edit lines when the batch is applied.

pub mod command;
pub mod frame;

pub use command::{Command, EditCommand, ParseError, Query, is_edit_keyword};
pub use frame::{BroadcastFrame, EditRecord};

use std::fmt;

/// Ready line sent once a session slot is allocated.
pub const READY_LINE: &str = "READY\n";

/// Single byte written to a client when every session slot is busy.
pub const SESSION_REJECT_BYTE: u8 = 0x15;

/// Authentication rejection line.
pub const UNAUTHORISED_LINE: &str = "Reject UNAUTHORISED\n";

/// Wire result of one queued command. Exactly these five strings ever
/// appear in a broadcast line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    Unauthorised,
    InvalidPosition,
    DeletedPosition,
    OutdatedVersion,
}

impl CommandResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandResult::Success => "SUCCESS",
            CommandResult::Unauthorised => "Reject UNAUTHORISED",
            CommandResult::InvalidPosition => "Reject INVALID_POSITION",
            CommandResult::DeletedPosition => "Reject DELETED_POSITION",
            CommandResult::OutdatedVersion => "Reject OUTDATED_VERSION",
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_strings_are_literal() {
        assert_eq!(CommandResult::Success.to_string(), "SUCCESS");
        assert_eq!(
            CommandResult::Unauthorised.to_string(),
            "Reject UNAUTHORISED"
        );
        assert_eq!(
            CommandResult::InvalidPosition.to_string(),
            "Reject INVALID_POSITION"
        );
        assert_eq!(
            CommandResult::DeletedPosition.to_string(),
            "Reject DELETED_POSITION"
        );
        assert_eq!(
            CommandResult::OutdatedVersion.to_string(),
            "Reject OUTDATED_VERSION"
        );
    }
}
