//! POP3 delta sync.
//!
//! POP3 message numbers change between sessions, so identity comes from
//! `UIDL`. A cycle lists the maildrop, retrieves what follows the newest
//! stored UID, and reconciles the stored history against the listing.

use std::collections::{HashMap, HashSet};

use maildelta_mime::{Headers, split_header};
use maildelta_proto::{CommandHandler, Payload, Pop3Command, UidlEntry};
use tracing::debug;

use super::{SyncReport, parse_date_header, record_from_headers, request, unexpected};
use crate::error::Result;
use crate::store::{HistoryEntry, HistoryOrder, MailRecord, MailStore, SyncDelta};

/// Runs one POP3 cycle for `stream_id` on an authenticated handler.
///
/// # Errors
///
/// `Error::SyncAborted` when `UIDL` or a `RETR` fails; storage and
/// connection errors as they occur.
pub async fn sync<S: MailStore>(
    handler: &CommandHandler,
    store: &S,
    stream_id: &str,
) -> Result<SyncReport> {
    let listing = match request(handler, Pop3Command::Uidl(None)).await? {
        Payload::UidListing(entries) => entries,
        other => return Err(unexpected(&other)),
    };
    let history = store.read_history(stream_id, HistoryOrder::Sequence).await?;

    let mut delta = SyncDelta::new(stream_id);
    reconcile(&listing, &history, &mut delta);

    let wanted = plan_retrieval(&listing, &history);
    debug!(stream_id, listed = listing.len(), wanted = wanted.len(), "UIDL listed");
    for entry in wanted {
        let raw = match request(handler, Pop3Command::Retr(entry.seq)).await? {
            Payload::Content(bytes) => bytes,
            other => return Err(unexpected(&other)),
        };
        delta.added.push((
            HistoryEntry::new(stream_id, entry.seq, entry.uid.as_str()),
            record_from_message(stream_id, &entry.uid, &raw),
        ));
    }

    if !delta.is_empty() {
        store.apply_delta(&delta).await?;
    }
    Ok(SyncReport::from_delta(&delta))
}

/// Entries of `listing` to retrieve, in listing order.
///
/// With no history only the newest entry is taken. Otherwise everything
/// after the last listed entry that is already stored; if none of the
/// stored UIDs is still listed, only the newest again.
pub(crate) fn plan_retrieval<'a>(
    listing: &'a [UidlEntry],
    history: &[HistoryEntry],
) -> Vec<&'a UidlEntry> {
    let known: HashSet<&str> = history.iter().map(|e| e.uid.as_str()).collect();
    let newest = || -> Vec<&'a UidlEntry> { listing.last().into_iter().collect() };
    if known.is_empty() {
        return newest();
    }
    match listing.iter().rposition(|e| known.contains(e.uid.as_str())) {
        Some(last) => listing[last + 1..].iter().collect(),
        None => newest(),
    }
}

/// Purges stored UIDs missing from `listing` and refreshes moved sequence
/// numbers.
pub(crate) fn reconcile(listing: &[UidlEntry], history: &[HistoryEntry], delta: &mut SyncDelta) {
    let current: HashMap<&str, u32> = listing.iter().map(|e| (e.uid.as_str(), e.seq)).collect();
    for entry in history {
        match current.get(entry.uid.as_str()) {
            None => delta.removed.push(entry.uid.clone()),
            Some(&seq) if seq != entry.sequence => delta.resequenced.push((entry.uid.clone(), seq)),
            Some(_) => {}
        }
    }
}

fn record_from_message(stream_id: &str, uid: &str, raw: &[u8]) -> MailRecord {
    let (header, _) = split_header(raw);
    let headers = Headers::parse_bytes(header);
    let date = headers.get("date").and_then(parse_date_header);
    record_from_headers(stream_id, uid, &headers, false, date)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn listing(entries: &[(u32, &str)]) -> Vec<UidlEntry> {
        entries
            .iter()
            .map(|&(seq, uid)| UidlEntry {
                seq,
                uid: uid.to_string(),
            })
            .collect()
    }

    fn history(entries: &[(u32, &str)]) -> Vec<HistoryEntry> {
        entries
            .iter()
            .map(|&(seq, uid)| HistoryEntry::new("s", seq, uid))
            .collect()
    }

    fn uids<'a>(entries: &[&'a UidlEntry]) -> Vec<&'a str> {
        entries.iter().map(|e| e.uid.as_str()).collect()
    }

    #[test]
    fn test_first_sync_takes_newest_only() {
        let listed = listing(&[(1, "a"), (2, "b"), (3, "c")]);
        let wanted = plan_retrieval(&listed, &[]);
        assert_eq!(uids(&wanted), ["c"]);
        assert_eq!(wanted[0].seq, 3);
        assert!(plan_retrieval(&[], &[]).is_empty());
    }

    #[test]
    fn test_incremental_takes_everything_after_last_known() {
        let listed = listing(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
        let wanted = plan_retrieval(&listed, &history(&[(2, "b")]));
        assert_eq!(uids(&wanted), ["c", "d"]);
    }

    #[test]
    fn test_nothing_new_when_last_known_is_last() {
        let listed = listing(&[(1, "a"), (2, "b")]);
        assert!(plan_retrieval(&listed, &history(&[(1, "a"), (2, "b")])).is_empty());
    }

    #[test]
    fn test_vanished_history_restarts_from_newest() {
        let listed = listing(&[(1, "x"), (2, "y")]);
        let wanted = plan_retrieval(&listed, &history(&[(5, "gone")]));
        assert_eq!(uids(&wanted), ["y"]);
    }

    #[test]
    fn test_reconcile_removes_and_resequences() {
        let listed = listing(&[(1, "b"), (2, "c")]);
        let mut delta = SyncDelta::new("s");
        reconcile(&listed, &history(&[(1, "a"), (2, "b"), (3, "c")]), &mut delta);
        assert_eq!(delta.removed, ["a"]);
        assert_eq!(
            delta.resequenced,
            vec![("b".to_string(), 1), ("c".to_string(), 2)]
        );
    }

    #[test]
    fn test_record_from_message() {
        let raw = b"From: =?utf-8?Q?J=C3=B6rg?= <j@example.com>\r\n\
Subject: Hi\r\nDate: Fri, 01 Mar 2024 12:30:00 +0000\r\n\r\nbody\r\n";
        let record = record_from_message("s", "u1", raw);
        assert_eq!(record.uid, "u1");
        assert_eq!(record.from_address.as_deref(), Some("Jörg <j@example.com>"));
        assert_eq!(record.subject.as_deref(), Some("Hi"));
        assert!(record.date.is_some());
        assert!(!record.is_seen);
    }
}
