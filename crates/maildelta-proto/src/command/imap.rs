//! IMAP commands.

use crate::types::{Mailbox, SequenceSet, UidSet};

use super::serialize::{write_astring, write_mailbox, write_search_criteria, write_store_action};
use super::types::{Peek, SearchCriteria, Secret, StoreAction};
use super::{ImapShape, ResultShape};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapCommand {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: Secret,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: Mailbox,
    },
    /// SEARCH command, answering with sequence numbers.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID SEARCH command, answering with UIDs.
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// FETCH command. The UID is always requested alongside the peek.
    Fetch {
        /// Messages to fetch.
        sequence: SequenceSet,
        /// Item to fetch.
        peek: Peek,
    },
    /// UID FETCH command.
    UidFetch {
        /// Messages to fetch.
        uids: UidSet,
        /// Item to fetch.
        peek: Peek,
    },
    /// UID STORE command.
    UidStore {
        /// Messages to update.
        uids: UidSet,
        /// Flag change to apply.
        action: StoreAction,
    },
}

impl ImapCommand {
    /// Convenience constructor for LOGIN.
    #[must_use]
    pub fn login(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self::Login {
            username: username.into(),
            password: password.into(),
        }
    }

    /// LIST of every mailbox under the empty reference.
    #[must_use]
    pub fn list_all() -> Self {
        Self::List {
            reference: String::new(),
            pattern: "*".to_string(),
        }
    }

    /// Command keyword, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::List { .. } => "LIST",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Search { .. } => "SEARCH",
            Self::UidSearch { .. } => "UID SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::UidStore { .. } => "UID STORE",
        }
    }

    /// Shape of the result the command produces.
    #[must_use]
    pub const fn expected_shape(&self) -> ResultShape {
        let shape = match self {
            Self::Noop | Self::Logout | Self::Login { .. } | Self::UidStore { .. } => {
                ImapShape::Status
            }
            Self::Capability => ImapShape::Capabilities,
            Self::List { .. } => ImapShape::Mailboxes,
            Self::Select { .. } | Self::Examine { .. } => ImapShape::Selection,
            Self::Search { .. } | Self::UidSearch { .. } => ImapShape::Search,
            Self::Fetch { peek, .. } | Self::UidFetch { peek, .. } => ImapShape::Fetch(*peek),
        };
        ResultShape::Imap(shape)
    }

    /// Serializes the command with the given tag, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password.expose());
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::Fetch { sequence, peek } => {
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.extend_from_slice(b" (UID ");
                buf.extend_from_slice(peek.as_str().as_bytes());
                buf.push(b')');
            }

            Self::UidFetch { uids, peek } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(peek.as_str().as_bytes());
            }

            Self::UidStore { uids, action } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::types::{Flag, Uid};

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn login_quotes_when_needed() {
        let cmd = ImapCommand::login("user@example.com", "pass word");
        assert_eq!(
            cmd.serialize("A0001"),
            b"A0001 LOGIN user@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn login_debug_hides_password() {
        let cmd = ImapCommand::login("user", "hunter2");
        assert!(!format!("{cmd:?}").contains("hunter2"));
    }

    #[test]
    fn list_all() {
        assert_eq!(
            ImapCommand::list_all().serialize("A0000"),
            b"A0000 LIST \"\" \"*\"\r\n"
        );
    }

    #[test]
    fn select_quoted_mailbox() {
        let cmd = ImapCommand::Select {
            mailbox: Mailbox::new("[Gmail]/All Mail"),
        };
        assert_eq!(cmd.serialize("A0002"), b"A0002 SELECT \"[Gmail]/All Mail\"\r\n");
    }

    #[test]
    fn uid_fetch_each_peek() {
        let uids = UidSet::range(uid(5), uid(9));
        let cases = [
            (Peek::Flags, "A0003 UID FETCH 5:9 FLAGS\r\n"),
            (Peek::InternalDate, "A0003 UID FETCH 5:9 INTERNALDATE\r\n"),
            (Peek::BodyStructure, "A0003 UID FETCH 5:9 BODYSTRUCTURE\r\n"),
            (Peek::Full, "A0003 UID FETCH 5:9 BODY.PEEK[]\r\n"),
            (Peek::Header, "A0003 UID FETCH 5:9 BODY.PEEK[HEADER]\r\n"),
        ];
        for (peek, expected) in cases {
            let cmd = ImapCommand::UidFetch {
                uids: uids.clone(),
                peek,
            };
            assert_eq!(String::from_utf8(cmd.serialize("A0003")).unwrap(), expected);
            assert_eq!(cmd.expected_shape(), ResultShape::Imap(ImapShape::Fetch(peek)));
        }
    }

    #[test]
    fn sequence_fetch_requests_uid() {
        let cmd = ImapCommand::Fetch {
            sequence: SequenceSet::range(1, 3).unwrap(),
            peek: Peek::Flags,
        };
        assert_eq!(cmd.serialize("A0004"), b"A0004 FETCH 1:3 (UID FLAGS)\r\n");
    }

    #[test]
    fn uid_search_and_store() {
        let search = ImapCommand::UidSearch {
            criteria: SearchCriteria::All,
        };
        assert_eq!(search.serialize("A0005"), b"A0005 UID SEARCH ALL\r\n");

        let store = ImapCommand::UidStore {
            uids: UidSet::single(uid(7)),
            action: StoreAction::AddFlags(vec![Flag::Seen]),
        };
        assert_eq!(
            store.serialize("A0006"),
            b"A0006 UID STORE 7 +FLAGS (\\Seen)\r\n"
        );
    }
}
