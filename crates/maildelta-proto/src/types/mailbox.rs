//! Mailbox types.

use super::{Flags, Uid, UidValidity};

/// Mailbox name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a new mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The INBOX mailbox (case-insensitive per RFC).
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Returns the mailbox name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox metadata reported by SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// UIDVALIDITY value, when advertised.
    pub uid_validity: Option<UidValidity>,
    /// Next UID to be assigned, when advertised.
    pub uid_next: Option<Uid>,
    /// Whether the server opened the mailbox read-only.
    pub read_only: bool,
}

/// One LIST response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter (`None` for a flat namespace).
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: Mailbox,
}

impl ListEntry {
    /// Returns true if the entry carries the given attribute.
    #[must_use]
    pub fn has_attribute(&self, attribute: &MailboxAttribute) -> bool {
        self.attributes.contains(attribute)
    }

    /// Returns the last hierarchy segment of the mailbox name.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        let name = self.mailbox.as_str();
        match self.delimiter {
            Some(delim) => name.rsplit(delim).next().unwrap_or(name),
            None => name,
        }
    }
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// All messages (RFC 6154 virtual mailbox).
    All,
    /// Mailbox is the archive folder.
    Archive,
    /// Mailbox is the sent folder.
    Sent,
    /// Mailbox is the trash folder.
    Trash,
    /// Mailbox is the junk/spam folder.
    Junk,
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            _ => Self::Unknown(s.to_string()),
        }
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

    #[test]
    fn attribute_parse() {
        assert_eq!(MailboxAttribute::parse("\\Noselect"), MailboxAttribute::NoSelect);
        assert_eq!(MailboxAttribute::parse("\\All"), MailboxAttribute::All);
        assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
        assert_eq!(
            MailboxAttribute::parse("\\X-Custom"),
            MailboxAttribute::Unknown("\\X-Custom".to_string())
        );
    }

    #[test]
    fn leaf_name_splits_on_delimiter() {
        let entry = ListEntry {
            attributes: vec![MailboxAttribute::HasNoChildren],
            delimiter: Some('/'),
            mailbox: Mailbox::new("[Gmail]/All Mail"),
        };
        assert_eq!(entry.leaf_name(), "All Mail");

        let flat = ListEntry {
            attributes: Vec::new(),
            delimiter: None,
            mailbox: Mailbox::new("Archive.2024"),
        };
        assert_eq!(flat.leaf_name(), "Archive.2024");
    }

    #[test]
    fn inbox_name() {
        assert_eq!(Mailbox::inbox().as_str(), "INBOX");
    }
}
