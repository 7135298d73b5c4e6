//! Command model.
//!
//! A [`Command`] is one of the two protocol command sets. Each command knows
//! its wire form and the [`ResultShape`] the server answers with, which is all
//! the wire transform needs to record a pending result.

mod imap;
mod pop3;
mod serialize;
mod tag_generator;
mod types;

use crate::types::{CorrelationId, Protocol};

pub use imap::ImapCommand;
pub use pop3::Pop3Command;
pub use tag_generator::TagGenerator;
pub use types::{Peek, SearchCriteria, Secret, StoreAction};

/// Command issued on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// IMAP command.
    Imap(ImapCommand),
    /// POP3 command.
    Pop3(Pop3Command),
}

impl Command {
    /// Protocol the command belongs to.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Imap(_) => Protocol::Imap,
            Self::Pop3(_) => Protocol::Pop3,
        }
    }

    /// Command keyword, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Imap(cmd) => cmd.name(),
            Self::Pop3(cmd) => cmd.name(),
        }
    }

    /// Shape of the result the command produces.
    #[must_use]
    pub const fn expected_shape(&self) -> ResultShape {
        match self {
            Self::Imap(cmd) => cmd.expected_shape(),
            Self::Pop3(cmd) => cmd.expected_shape(),
        }
    }

    /// Serializes the command to wire bytes.
    ///
    /// IMAP commands are prefixed with the correlation id as their tag.
    #[must_use]
    pub fn serialize(&self, id: &CorrelationId) -> Vec<u8> {
        match self {
            Self::Imap(cmd) => cmd.serialize(id.as_str()),
            Self::Pop3(cmd) => cmd.serialize(),
        }
    }
}

impl From<ImapCommand> for Command {
    fn from(cmd: ImapCommand) -> Self {
        Self::Imap(cmd)
    }
}

impl From<Pop3Command> for Command {
    fn from(cmd: Pop3Command) -> Self {
        Self::Pop3(cmd)
    }
}

/// Structure a command's result is extracted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// IMAP result.
    Imap(ImapShape),
    /// POP3 result.
    Pop3(Pop3Shape),
}

/// IMAP result shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImapShape {
    /// Only the tagged status line matters.
    Status,
    /// `* CAPABILITY` atoms.
    Capabilities,
    /// `* LIST` entries.
    Mailboxes,
    /// SELECT/EXAMINE metadata.
    Selection,
    /// `* SEARCH` numbers.
    Search,
    /// `* n FETCH` entries carrying one peek each.
    Fetch(Peek),
}

/// POP3 result shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pop3Shape {
    /// Single status line.
    Status,
    /// `+OK count size`.
    Stat,
    /// `+OK msg size` for one message.
    Scan,
    /// Multi-line `msg size` listing.
    ScanListing,
    /// `+OK msg uid` for one message.
    Uid,
    /// Multi-line `msg uid` listing.
    UidListing,
    /// Multi-line message content (RETR/TOP).
    Content,
    /// Multi-line capability listing.
    Capabilities,
}

impl Pop3Shape {
    /// Returns true if a successful response continues past its status line.
    #[must_use]
    pub const fn is_multiline(self) -> bool {
        matches!(
            self,
            Self::ScanListing | Self::UidListing | Self::Content | Self::Capabilities
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pop3_serialization_ignores_correlation_id() {
        let cmd = Command::from(Pop3Command::Stat);
        assert_eq!(cmd.serialize(&CorrelationId::new("A0009")), b"STAT\r\n");
        assert_eq!(cmd.protocol(), Protocol::Pop3);
    }

    #[test]
    fn imap_serialization_uses_correlation_id_as_tag() {
        let cmd = Command::from(ImapCommand::Noop);
        assert_eq!(cmd.serialize(&CorrelationId::new("A0009")), b"A0009 NOOP\r\n");
        assert_eq!(cmd.name(), "NOOP");
        assert_eq!(cmd.expected_shape(), ResultShape::Imap(ImapShape::Status));
    }

    #[test]
    fn multiline_shapes() {
        assert!(Pop3Shape::UidListing.is_multiline());
        assert!(Pop3Shape::Content.is_multiline());
        assert!(!Pop3Shape::Uid.is_multiline());
        assert!(!Pop3Shape::Status.is_multiline());
    }
}
