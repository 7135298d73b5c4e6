//! IMAP delta sync.
//!
//! One cycle on an authenticated connection:
//!
//! 1. pick the "all mail" mailbox from `LIST` and `SELECT` it
//! 2. reconcile stored UIDs against the server (deletions, read state)
//! 3. fetch flags, internal date and header for UIDs above the highest
//!    one already stored
//!
//! Everything is collected into one [`SyncDelta`] and applied at the end.

use std::collections::{HashMap, HashSet};

use maildelta_mime::Headers;
use maildelta_proto::{
    CommandHandler, FetchData, FetchEntry, Flags, ImapCommand, ListEntry, Mailbox,
    MailboxAttribute, Payload, Peek, SearchCriteria, SeqNum, Uid, UidSet,
};
use tracing::{debug, warn};

use super::{SyncReport, parse_internal_date, record_from_headers, request, unexpected};
use crate::error::{Error, Result};
use crate::store::{HistoryEntry, HistoryOrder, MailStore, SyncDelta};

/// Mailbox names (lowercased) that hold every message of an account.
const ALL_MAIL_ALIASES: &[&str] = &[
    "[gmail]/all mail",
    "[google mail]/all mail",
    "all mail",
    "allmail",
    "all messages",
];

/// Picks the mailbox that holds every message.
///
/// A selectable mailbox flagged `\All` wins, then the first whose full or
/// leaf name matches a known alias. Falls back to `INBOX`.
#[must_use]
pub fn resolve_all_mail(entries: &[ListEntry]) -> Mailbox {
    let selectable = || {
        entries
            .iter()
            .filter(|e| !e.has_attribute(&MailboxAttribute::NoSelect))
    };
    let is_alias = |name: &str| {
        let name = name.to_lowercase();
        ALL_MAIL_ALIASES.contains(&name.as_str())
    };

    selectable()
        .find(|e| e.has_attribute(&MailboxAttribute::All))
        .or_else(|| {
            selectable().find(|e| is_alias(e.mailbox.as_str()) || is_alias(e.leaf_name()))
        })
        .map_or_else(Mailbox::inbox, |e| e.mailbox.clone())
}

/// Runs one IMAP cycle for `stream_id`.
///
/// A rejected `SELECT` ends the cycle with an empty report.
///
/// # Errors
///
/// `Error::SyncAborted` when a search or fetch fails or the three fetches
/// disagree; storage and connection errors as they occur.
pub async fn sync<S: MailStore>(
    handler: &CommandHandler,
    store: &S,
    stream_id: &str,
) -> Result<SyncReport> {
    let mailbox = match request(handler, ImapCommand::list_all()).await {
        Ok(Payload::Mailboxes(entries)) => resolve_all_mail(&entries),
        Ok(other) => return Err(unexpected(&other)),
        Err(Error::SyncAborted(reason)) => {
            debug!(stream_id, %reason, "LIST failed, using INBOX");
            Mailbox::inbox()
        }
        Err(e) => return Err(e),
    };

    let selected = handler
        .execute(ImapCommand::Select {
            mailbox: mailbox.clone(),
        })
        .await?;
    if selected.error {
        warn!(stream_id, mailbox = %mailbox, "SELECT rejected");
        return Ok(SyncReport::default());
    }

    let history = store.read_history(stream_id, HistoryOrder::Uid).await?;
    let mut delta = SyncDelta::new(stream_id);
    reconcile(handler, store, &history, &mut delta).await?;

    let last_known = history.iter().filter_map(|e| stored_uid(&e.uid)).max();
    if let Some(range) = missing_range(handler, last_known).await? {
        for message in fetch_new(handler, &range).await? {
            let headers = Headers::parse_bytes(&message.header);
            let uid = message.uid.to_string();
            let record = record_from_headers(
                stream_id,
                &uid,
                &headers,
                message.flags.is_seen(),
                parse_internal_date(&message.internal_date),
            );
            delta.added.push((
                HistoryEntry::new(stream_id, message.seq.get(), uid),
                record,
            ));
        }
    }

    if !delta.is_empty() {
        store.apply_delta(&delta).await?;
    }
    Ok(SyncReport::from_delta(&delta))
}

fn stored_uid(uid: &str) -> Option<Uid> {
    uid.parse().ok().and_then(Uid::new)
}

async fn search(handler: &CommandHandler, criteria: SearchCriteria) -> Result<Vec<u32>> {
    match request(handler, ImapCommand::UidSearch { criteria }).await? {
        Payload::SearchMatches(uids) => Ok(uids),
        other => Err(unexpected(&other)),
    }
}

/// Records stored UIDs the server no longer has, and stored unread UIDs the
/// server now has as `\Seen`.
async fn reconcile<S: MailStore>(
    handler: &CommandHandler,
    store: &S,
    history: &[HistoryEntry],
    delta: &mut SyncDelta,
) -> Result<()> {
    let local: Vec<Uid> = history.iter().filter_map(|e| stored_uid(&e.uid)).collect();
    let Some(set) = UidSet::from_uids(local.iter().copied()) else {
        return Ok(());
    };

    let present: HashSet<u32> = search(handler, SearchCriteria::UidSet(set))
        .await?
        .into_iter()
        .collect();
    delta.removed = local
        .iter()
        .filter(|uid| !present.contains(&uid.get()))
        .map(ToString::to_string)
        .collect();

    let unread: Vec<Uid> = store
        .read_mail(&delta.stream_id)
        .await?
        .iter()
        .filter(|record| !record.is_seen)
        .filter_map(|record| stored_uid(&record.uid))
        .filter(|uid| present.contains(&uid.get()))
        .collect();
    if let Some(set) = UidSet::from_uids(unread) {
        delta.seen = search(handler, SearchCriteria::seen_within(set))
            .await?
            .into_iter()
            .map(|uid| uid.to_string())
            .collect();
    }
    Ok(())
}

/// UIDs to fetch: everything above `last_known` up to the current highest,
/// or only the highest when nothing is stored yet.
async fn missing_range(handler: &CommandHandler, last_known: Option<Uid>) -> Result<Option<UidSet>> {
    let current = search(handler, SearchCriteria::All).await?;
    let Some(highest) = current.into_iter().max().and_then(Uid::new) else {
        return Ok(None);
    };
    Ok(match last_known {
        None => Some(UidSet::single(highest)),
        Some(last) if highest <= last => None,
        Some(last) => Uid::new(last.get().saturating_add(1)).map(|first| UidSet::range(first, highest)),
    })
}

/// One new message assembled from the three fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchedMessage {
    pub seq: SeqNum,
    pub uid: Uid,
    pub flags: Flags,
    pub internal_date: String,
    pub header: Vec<u8>,
}

async fn fetch(handler: &CommandHandler, uids: &UidSet, peek: Peek) -> Result<Vec<FetchEntry>> {
    let command = ImapCommand::UidFetch {
        uids: uids.clone(),
        peek,
    };
    match request(handler, command).await? {
        // servers may interleave unsolicited FETCH updates for other messages
        Payload::Fetch(entries) => Ok(entries.into_iter().filter(|e| uids.contains(e.uid)).collect()),
        other => Err(unexpected(&other)),
    }
}

async fn fetch_new(handler: &CommandHandler, uids: &UidSet) -> Result<Vec<FetchedMessage>> {
    let flags = fetch(handler, uids, Peek::Flags).await?;
    let dates = fetch(handler, uids, Peek::InternalDate).await?;
    let headers = fetch(handler, uids, Peek::Header).await?;
    zip_by_uid(flags, dates, headers)
}

/// Pairs the three fetch results by UID, ascending.
///
/// # Errors
///
/// `Error::SyncAborted` if the counts differ or a UID is missing from one
/// of the results.
pub(crate) fn zip_by_uid(
    flags: Vec<FetchEntry>,
    dates: Vec<FetchEntry>,
    headers: Vec<FetchEntry>,
) -> Result<Vec<FetchedMessage>> {
    if flags.len() != dates.len() || flags.len() != headers.len() {
        return Err(Error::SyncAborted(format!(
            "fetch results disagree: {} flags, {} dates, {} headers",
            flags.len(),
            dates.len(),
            headers.len()
        )));
    }

    let mut dates: HashMap<Uid, String> = dates
        .into_iter()
        .filter_map(|e| match e.data {
            FetchData::InternalDate(date) => Some((e.uid, date)),
            _ => None,
        })
        .collect();
    let mut headers: HashMap<Uid, Vec<u8>> = headers
        .into_iter()
        .filter_map(|e| match e.data {
            FetchData::Header(bytes) => Some((e.uid, bytes)),
            _ => None,
        })
        .collect();

    let mut messages = flags
        .into_iter()
        .map(|entry| {
            let missing = |what: &str| Error::SyncAborted(format!("no {what} for UID {}", entry.uid));
            let FetchData::Flags(flags) = entry.data else {
                return Err(missing("FLAGS"));
            };
            let internal_date = dates.remove(&entry.uid).ok_or_else(|| missing("INTERNALDATE"))?;
            let header = headers.remove(&entry.uid).ok_or_else(|| missing("header"))?;
            Ok(FetchedMessage {
                seq: entry.seq,
                uid: entry.uid,
                flags,
                internal_date,
                header,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    messages.sort_by_key(|m| m.uid);
    Ok(messages)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use maildelta_proto::Flag;

    fn entry(seq: u32, uid: u32, data: FetchData) -> FetchEntry {
        FetchEntry {
            seq: SeqNum::new(seq).unwrap(),
            uid: Uid::new(uid).unwrap(),
            data,
        }
    }

    fn list(name: &str, attributes: Vec<MailboxAttribute>) -> ListEntry {
        ListEntry {
            attributes,
            delimiter: Some('/'),
            mailbox: Mailbox::new(name),
        }
    }

    #[test]
    fn test_resolve_by_attribute() {
        let entries = vec![
            list("INBOX", vec![]),
            list("Everything", vec![MailboxAttribute::All]),
            list("[Gmail]/All Mail", vec![]),
        ];
        assert_eq!(resolve_all_mail(&entries), Mailbox::new("Everything"));
    }

    #[test]
    fn test_resolve_by_alias() {
        let entries = vec![
            list("INBOX", vec![]),
            list("[Gmail]", vec![MailboxAttribute::NoSelect]),
            list("[Gmail]/ALL MAIL", vec![]),
        ];
        assert_eq!(resolve_all_mail(&entries), Mailbox::new("[Gmail]/ALL MAIL"));

        let leaf = vec![list("Lists/All Mail", vec![])];
        assert_eq!(resolve_all_mail(&leaf), Mailbox::new("Lists/All Mail"));
    }

    #[test]
    fn test_resolve_defaults_to_inbox() {
        let entries = vec![list("Sent", vec![]), list("Drafts", vec![])];
        assert_eq!(resolve_all_mail(&entries), Mailbox::inbox());
        assert_eq!(resolve_all_mail(&[]), Mailbox::inbox());
    }

    #[test]
    fn test_zip_out_of_order() {
        let seen = Flags::from_vec(vec![Flag::Seen]);
        let flags = vec![
            entry(2, 11, FetchData::Flags(seen.clone())),
            entry(1, 10, FetchData::Flags(Flags::new())),
        ];
        let dates = vec![
            entry(1, 10, FetchData::InternalDate("a".into())),
            entry(2, 11, FetchData::InternalDate("b".into())),
        ];
        let headers = vec![
            entry(2, 11, FetchData::Header(b"B".to_vec())),
            entry(1, 10, FetchData::Header(b"A".to_vec())),
        ];

        let zipped = zip_by_uid(flags, dates, headers).unwrap();
        assert_eq!(zipped.len(), 2);
        assert_eq!(zipped[0].uid.get(), 10);
        assert_eq!(zipped[0].internal_date, "a");
        assert_eq!(zipped[0].header, b"A");
        assert!(!zipped[0].flags.is_seen());
        assert_eq!(zipped[1].seq.get(), 2);
        assert!(zipped[1].flags.is_seen());
        assert_eq!(zipped[1].header, b"B");
    }

    #[test]
    fn test_zip_count_mismatch() {
        let flags = vec![entry(1, 10, FetchData::Flags(Flags::new()))];
        let result = zip_by_uid(flags, vec![], vec![]);
        assert!(matches!(result, Err(Error::SyncAborted(m)) if m.contains("disagree")));
    }

    #[test]
    fn test_zip_uid_mismatch() {
        let flags = vec![entry(1, 10, FetchData::Flags(Flags::new()))];
        let dates = vec![entry(1, 12, FetchData::InternalDate("a".into()))];
        let headers = vec![entry(1, 10, FetchData::Header(Vec::new()))];
        let result = zip_by_uid(flags, dates, headers);
        assert!(matches!(result, Err(Error::SyncAborted(m)) if m.contains("INTERNALDATE")));
    }
}
