//! Argument types carried by commands.

use crate::types::{Flag, SequenceSet, UidSet};

/// Secret command argument such as a password.
///
/// Serializes verbatim onto the wire but never shows up in `Debug` output,
/// so commands can be traced without leaking credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// IMAP FETCH item selector.
///
/// Every peek leaves the `\Seen` flag untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peek {
    /// `FLAGS`.
    Flags,
    /// `INTERNALDATE`.
    InternalDate,
    /// `BODYSTRUCTURE`.
    BodyStructure,
    /// `BODY.PEEK[]`, the complete message.
    Full,
    /// `BODY.PEEK[HEADER]`, the header block only.
    Header,
}

impl Peek {
    /// Returns the fetch item as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flags => "FLAGS",
            Self::InternalDate => "INTERNALDATE",
            Self::BodyStructure => "BODYSTRUCTURE",
            Self::Full => "BODY.PEEK[]",
            Self::Header => "BODY.PEEK[HEADER]",
        }
    }
}

impl std::fmt::Display for Peek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}

impl StoreAction {
    pub(crate) const fn prefix(&self) -> &'static str {
        match self {
            Self::SetFlags(_) => "FLAGS",
            Self::AddFlags(_) => "+FLAGS",
            Self::RemoveFlags(_) => "-FLAGS",
        }
    }

    pub(crate) fn flags(&self) -> &[Flag] {
        match self {
            Self::SetFlags(flags) | Self::AddFlags(flags) | Self::RemoveFlags(flags) => flags,
        }
    }
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with the `\Seen` flag.
    Seen,
    /// Messages without the `\Seen` flag.
    Unseen,
    /// Messages whose sequence number is in the set.
    SequenceSet(SequenceSet),
    /// Messages whose UID is in the set.
    UidSet(UidSet),
    /// Messages matching every criterion.
    And(Vec<Self>),
}

impl SearchCriteria {
    /// Messages with `\Seen` among the given UIDs.
    #[must_use]
    pub fn seen_within(uids: UidSet) -> Self {
        Self::And(vec![Self::Seen, Self::UidSet(uids)])
    }
}
