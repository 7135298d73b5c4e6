//! Parsed command results.

use crate::command::Command;
use crate::types::{CorrelationId, Flags, ListEntry, MailboxStatus, SeqNum, Uid};

/// Result of one command, as published by the receiver.
///
/// `error` is set for protocol rejections (`NO`, `BAD`, `-ERR`), for
/// responses that did not match the expected grammar, and for transport
/// failures observed while the command was outstanding. An errored result
/// never carries a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResult {
    /// Id of the command this result answers.
    pub correlation_id: CorrelationId,
    /// The command itself.
    pub command: Command,
    /// True if the command failed.
    pub error: bool,
    /// Extracted data, present only when `error` is false.
    pub payload: Option<Payload>,
}

impl ParsedResult {
    /// Builds a successful result.
    #[must_use]
    pub const fn success(correlation_id: CorrelationId, command: Command, payload: Payload) -> Self {
        Self {
            correlation_id,
            command,
            error: false,
            payload: Some(payload),
        }
    }

    /// Builds a failed result.
    #[must_use]
    pub const fn failure(correlation_id: CorrelationId, command: Command) -> Self {
        Self {
            correlation_id,
            command,
            error: true,
            payload: None,
        }
    }

    /// Returns the payload if the command succeeded.
    #[must_use]
    pub fn into_payload(self) -> Option<Payload> {
        if self.error { None } else { self.payload }
    }
}

/// Command-specific result data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text following a bare success status.
    Ack(String),
    /// Capability atoms (IMAP `CAPABILITY`, POP3 `CAPA`).
    Capabilities(Vec<String>),
    /// IMAP `LIST` entries.
    Mailboxes(Vec<ListEntry>),
    /// IMAP `SELECT`/`EXAMINE` metadata.
    Selection(MailboxStatus),
    /// IMAP `SEARCH` matches: sequence numbers or UIDs, as requested.
    SearchMatches(Vec<u32>),
    /// IMAP `FETCH` entries in server order.
    Fetch(Vec<FetchEntry>),
    /// POP3 `STAT`.
    Stat(MaildropStat),
    /// POP3 `LIST` entries.
    Scan(Vec<ScanEntry>),
    /// POP3 `UIDL` entries.
    UidListing(Vec<UidlEntry>),
    /// POP3 `RETR`/`TOP` content, dot-unstuffed, terminator removed.
    Content(Vec<u8>),
}

/// One `* n FETCH` response, paired with its UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEntry {
    /// Sequence number reported by the server.
    pub seq: SeqNum,
    /// UID reported in the same response.
    pub uid: Uid,
    /// The requested item.
    pub data: FetchData,
}

/// Data for one of the five peeks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchData {
    /// `FLAGS`.
    Flags(Flags),
    /// `INTERNALDATE`, as the server formatted it.
    InternalDate(String),
    /// `BODYSTRUCTURE`, the raw parenthesized structure.
    BodyStructure(String),
    /// `BODY[]`.
    Message(Vec<u8>),
    /// `BODY[HEADER]`.
    Header(Vec<u8>),
}

/// POP3 `STAT` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaildropStat {
    /// Number of messages.
    pub count: u32,
    /// Size of the maildrop in octets.
    pub size: u64,
}

/// One POP3 `LIST` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEntry {
    /// Message number.
    pub seq: u32,
    /// Size in octets.
    pub size: u64,
}

/// One POP3 `UIDL` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    /// Message number in the current session.
    pub seq: u32,
    /// Unique id, stable across sessions.
    pub uid: String,
}
