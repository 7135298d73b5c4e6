//! Core protocol types shared by the IMAP and POP3 sides of the engine.

#![allow(clippy::missing_const_for_fn)]

mod flags;
mod identifiers;
mod mailbox;
mod sequence;

pub use flags::{Flag, Flags};
pub use identifiers::{CorrelationId, SeqNum, Uid, UidValidity};
pub use mailbox::{ListEntry, Mailbox, MailboxAttribute, MailboxStatus};
pub use sequence::{SequenceSet, UidSet};

/// Wire protocol spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// IMAP4rev1.
    Imap,
    /// POP3.
    Pop3,
}

impl Protocol {
    /// Default port for the protocol with or without implicit TLS.
    #[must_use]
    pub const fn default_port(self, tls: bool) -> u16 {
        match (self, tls) {
            (Self::Imap, true) => 993,
            (Self::Imap, false) => 143,
            (Self::Pop3, true) => 995,
            (Self::Pop3, false) => 110,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap => write!(f, "IMAP"),
            Self::Pop3 => write!(f, "POP3"),
        }
    }
}

/// Completion status of a command as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// IMAP `OK` or POP3 `+OK`.
    Ok,
    /// IMAP `NO`.
    No,
    /// IMAP `BAD`.
    Bad,
    /// POP3 `-ERR`.
    Err,
}

impl Status {
    /// Returns true for a successful completion.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Parses an IMAP status word.
    #[must_use]
    pub fn parse_imap(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("OK") {
            Some(Self::Ok)
        } else if word.eq_ignore_ascii_case("NO") {
            Some(Self::No)
        } else if word.eq_ignore_ascii_case("BAD") {
            Some(Self::Bad)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(Protocol::Imap.default_port(true), 993);
        assert_eq!(Protocol::Imap.default_port(false), 143);
        assert_eq!(Protocol::Pop3.default_port(true), 995);
        assert_eq!(Protocol::Pop3.default_port(false), 110);
    }

    #[test]
    fn imap_status_words() {
        assert_eq!(Status::parse_imap("ok"), Some(Status::Ok));
        assert_eq!(Status::parse_imap("NO"), Some(Status::No));
        assert_eq!(Status::parse_imap("BAD"), Some(Status::Bad));
        assert_eq!(Status::parse_imap("BYE"), None);
        assert!(!Status::No.is_ok());
    }
}
