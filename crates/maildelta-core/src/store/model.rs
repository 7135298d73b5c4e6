//! Persisted sync state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known server-side identity of one message.
///
/// `sequence` is the IMAP sequence number or POP3 message number seen when
/// the entry was written. Only `uid` is stable; POP3 sequences are refreshed
/// on every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Account key.
    pub stream_id: String,
    /// Sequence or message number.
    pub sequence: u32,
    /// IMAP UID (decimal) or POP3 UIDL string.
    pub uid: String,
}

impl HistoryEntry {
    /// Creates a history entry.
    #[must_use]
    pub fn new(stream_id: impl Into<String>, sequence: u32, uid: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence,
            uid: uid.into(),
        }
    }
}

/// Sort key for [`MailStore::read_history`](super::MailStore::read_history).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryOrder {
    /// Ascending sequence number.
    #[default]
    Sequence,
    /// Ascending UID; numeric UIDs sort numerically.
    Uid,
}

/// Summary of one synchronized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRecord {
    /// Account key.
    pub stream_id: String,
    /// Same UID as the matching history entry.
    pub uid: String,
    /// Whether the message has been read.
    pub is_seen: bool,
    /// Internal date (IMAP) or `Date` header (POP3).
    pub date: Option<DateTime<Utc>>,
    /// Decoded `From` header.
    pub from_address: Option<String>,
    /// Decoded `Subject` header.
    pub subject: Option<String>,
}

/// Everything one sync cycle changes, applied as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncDelta {
    /// Account key.
    pub stream_id: String,
    /// Newly observed messages, in arrival order.
    pub added: Vec<(HistoryEntry, MailRecord)>,
    /// UIDs deleted on the server.
    pub removed: Vec<String>,
    /// UIDs that became read on the server.
    pub seen: Vec<String>,
    /// UIDs whose sequence number moved.
    pub resequenced: Vec<(String, u32)>,
}

impl SyncDelta {
    /// Creates an empty delta for an account.
    #[must_use]
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            ..Self::default()
        }
    }

    /// Returns true if applying the delta would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.seen.is_empty()
            && self.resequenced.is_empty()
    }
}
