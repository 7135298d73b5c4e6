//! Command serialization helpers.

use crate::types::Mailbox;

use super::types::{SearchCriteria, StoreAction};

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes a mailbox name.
pub fn write_mailbox(buf: &mut Vec<u8>, mailbox: &Mailbox) {
    write_astring(buf, mailbox.as_str());
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// Writes a STORE action such as `+FLAGS (\Seen)`.
pub fn write_store_action(buf: &mut Vec<u8>, action: &StoreAction) {
    buf.extend_from_slice(action.prefix().as_bytes());
    buf.extend_from_slice(b" (");
    for (i, flag) in action.flags().iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(flag.as_str().as_bytes());
    }
    buf.push(b')');
}

/// Writes SEARCH criteria.
pub fn write_search_criteria(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::All => buf.extend_from_slice(b"ALL"),
        SearchCriteria::Seen => buf.extend_from_slice(b"SEEN"),
        SearchCriteria::Unseen => buf.extend_from_slice(b"UNSEEN"),
        SearchCriteria::SequenceSet(set) => {
            buf.extend_from_slice(set.to_string().as_bytes());
        }
        SearchCriteria::UidSet(set) => {
            buf.extend_from_slice(b"UID ");
            buf.extend_from_slice(set.to_string().as_bytes());
        }
        SearchCriteria::And(criteria) => {
            for (i, c) in criteria.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_search_criteria(buf, c);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Flag, Uid, UidSet};

    fn render(f: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut buf = Vec::new();
        f(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn astring_quotes_when_needed() {
        assert_eq!(render(|b| write_astring(b, "INBOX")), "INBOX");
        assert_eq!(render(|b| write_astring(b, "")), "\"\"");
        assert_eq!(render(|b| write_astring(b, "All Mail")), "\"All Mail\"");
        assert_eq!(render(|b| write_astring(b, "a\"b\\c")), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn seen_within_uid_set() {
        let uids = UidSet::from_uids([100, 101, 104].map(|v| Uid::new(v).unwrap())).unwrap();
        let criteria = SearchCriteria::seen_within(uids);
        assert_eq!(
            render(|b| write_search_criteria(b, &criteria)),
            "SEEN UID 100:101,104"
        );
    }

    #[test]
    fn store_action() {
        let action = StoreAction::AddFlags(vec![Flag::Seen]);
        assert_eq!(render(|b| write_store_action(b, &action)), "+FLAGS (\\Seen)");
    }
}
