//! Mailbox delta synchronization.
//!
//! A [`Synchronizer`] owns the account list and runs one cycle per call to
//! [`Synchronizer::run`]. A cycle computes a [`SyncDelta`] from the server
//! and the stored history, then hands it to the store in one piece. Any
//! failure before that point leaves the store untouched.
//!
//! IMAP connections stay open between cycles in a [`ConnectionRegistry`].
//! POP3 has no useful long-lived session, so every POP3 cycle connects,
//! logs in and quits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use maildelta_mime::Headers;
use maildelta_proto::{
    Command, CommandHandler, Connection, ConnectionRegistry, ConnectionStatus, Payload,
};
use tracing::{debug, info, warn};

use crate::account::{AccountConfig, AccountProtocol};
use crate::error::{Error, Result};
use crate::session::{Connector, MailSession, TcpConnector, end_session};
use crate::store::{MailRecord, MailStore, SyncDelta};

pub mod imap;
pub mod pop3;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Messages seen for the first time, in arrival order.
    pub new_messages: Vec<MailRecord>,
    /// Number of messages found deleted on the server.
    pub removed: usize,
    /// Number of messages that became read on the server.
    pub marked_seen: usize,
}

impl SyncReport {
    /// Number of new messages.
    #[must_use]
    pub fn new_message_count(&self) -> usize {
        self.new_messages.len()
    }

    pub(crate) fn from_delta(delta: &SyncDelta) -> Self {
        Self {
            new_messages: delta.added.iter().map(|(_, record)| record.clone()).collect(),
            removed: delta.removed.len(),
            marked_seen: delta.seen.len(),
        }
    }
}

/// Runs sync cycles for a fixed set of accounts.
#[derive(Debug)]
pub struct Synchronizer<S, C = TcpConnector> {
    store: Arc<S>,
    connector: C,
    accounts: HashMap<String, AccountConfig>,
    registry: ConnectionRegistry,
}

impl<S: MailStore, C: Connector> Synchronizer<S, C> {
    /// Creates a synchronizer for `accounts`, keyed by stream id.
    pub fn new(
        store: Arc<S>,
        connector: C,
        accounts: impl IntoIterator<Item = AccountConfig>,
    ) -> Self {
        Self {
            store,
            connector,
            accounts: accounts
                .into_iter()
                .map(|account| (account.stream_id.clone(), account))
                .collect(),
            registry: ConnectionRegistry::new(),
        }
    }

    /// Stream ids of every configured account.
    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one cycle for an account.
    ///
    /// # Errors
    ///
    /// `Error::AccountNotFound` for an unknown stream id. Any connect, login,
    /// protocol or storage failure aborts the cycle and is returned; nothing
    /// is persisted in that case.
    pub async fn run(&self, stream_id: &str) -> Result<SyncReport> {
        let account = self
            .accounts
            .get(stream_id)
            .ok_or_else(|| Error::AccountNotFound(stream_id.to_string()))?;

        let outcome = match account.protocol {
            AccountProtocol::Imap => self.run_imap(account).await,
            AccountProtocol::Pop3 => self.run_pop3(account).await,
        };

        match &outcome {
            Ok(report) => info!(
                stream_id,
                new = report.new_message_count(),
                removed = report.removed,
                seen = report.marked_seen,
                "sync cycle finished"
            ),
            Err(e) => warn!(stream_id, error = %e, "sync cycle aborted"),
        }
        outcome
    }

    async fn run_imap(&self, account: &AccountConfig) -> Result<SyncReport> {
        let handler = self.imap_handler(account).await?;
        let outcome = imap::sync(&handler, self.store.as_ref(), &account.stream_id).await;
        if outcome.is_err() && !handler.is_open() {
            self.registry.remove(&account.stream_id).await;
        }
        outcome
    }

    /// Reuses the account's open IMAP connection or opens a new one.
    async fn imap_handler(&self, account: &AccountConfig) -> Result<CommandHandler> {
        let stream_id = account.stream_id.as_str();
        if let Some(connection) = self.registry.get(stream_id).await
            && connection.status() == ConnectionStatus::Connected
            && let Ok(handler) = connection.handler().await
            && handler.is_open()
        {
            return Ok(handler);
        }

        self.registry.remove(stream_id).await;
        let connection = self
            .registry
            .create(stream_id, account.connection_config())
            .await;
        match MailSession::open(&self.connector, connection, account).await {
            Ok(session) => {
                debug!(stream_id, "IMAP session opened");
                Ok(session.handler().clone())
            }
            Err(e) => {
                self.registry.remove(stream_id).await;
                Err(e)
            }
        }
    }

    async fn run_pop3(&self, account: &AccountConfig) -> Result<SyncReport> {
        let connection = Arc::new(Connection::new(account.connection_config()));
        let session = MailSession::open(&self.connector, connection, account).await?;
        let outcome = pop3::sync(session.handler(), self.store.as_ref(), &account.stream_id).await;
        session.close().await;
        outcome
    }

    /// Logs out of every open IMAP connection and forgets them.
    pub async fn shutdown(&self) {
        for stream_id in self.accounts.keys() {
            let Some(connection) = self.registry.get(stream_id).await else {
                continue;
            };
            if let Ok(handler) = connection.handler().await {
                end_session(&connection, &handler, AccountProtocol::Imap).await;
            }
        }
        let dropped = self.registry.drain().await;
        debug!(dropped, "connection registry drained");
    }
}

/// Executes `command` and returns its payload.
///
/// # Errors
///
/// `Error::SyncAborted` if the server rejected the command or the response
/// did not parse; `Error::Proto` if the connection is gone.
pub(crate) async fn request(
    handler: &CommandHandler,
    command: impl Into<Command>,
) -> Result<Payload> {
    let result = handler.execute(command).await?;
    let name = result.command.name();
    result
        .into_payload()
        .ok_or_else(|| Error::SyncAborted(format!("{name} failed")))
}

pub(crate) fn unexpected(payload: &Payload) -> Error {
    Error::SyncAborted(format!("unexpected payload {payload:?}"))
}

/// Parses an IMAP `INTERNALDATE` such as `17-Jul-1996 02:44:25 -0700`.
#[must_use]
pub fn parse_internal_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Parses an RFC 2822 `Date` header, tolerating a trailing comment and a
/// missing zone.
#[must_use]
pub fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = value
        .find('(')
        .map_or(value, |comment| value[..comment].trim_end());
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    let without_day = value.split_once(',').map_or(value, |(_, rest)| rest.trim());
    NaiveDateTime::parse_from_str(without_day, "%d %b %Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Builds a mail record from a raw header block.
pub(crate) fn record_from_headers(
    stream_id: &str,
    uid: &str,
    headers: &Headers,
    is_seen: bool,
    date: Option<DateTime<Utc>>,
) -> MailRecord {
    MailRecord {
        stream_id: stream_id.to_string(),
        uid: uid.to_string(),
        is_seen,
        date,
        from_address: headers.decoded("from"),
        subject: headers.decoded("subject"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_internal_date() {
        let date = parse_internal_date("17-Jul-1996 02:44:25 -0700").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(1996, 7, 17, 9, 44, 25).unwrap());
        assert!(parse_internal_date(" 7-Jul-1996 02:44:25 +0000").is_some());
        assert_eq!(parse_internal_date("yesterday"), None);
    }

    #[test]
    fn test_date_header() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            parse_date_header("Fri, 01 Mar 2024 13:30:00 +0100"),
            Some(expected)
        );
        assert_eq!(
            parse_date_header("Fri, 1 Mar 2024 12:30:00 +0000 (UTC)"),
            Some(expected)
        );
        assert_eq!(parse_date_header("1 Mar 2024 12:30:00"), Some(expected));
        assert_eq!(parse_date_header("not a date"), None);
    }

    #[test]
    fn test_report_from_delta() {
        let mut delta = SyncDelta::new("s");
        delta.removed = vec!["1".into(), "2".into()];
        delta.seen = vec!["3".into()];
        let report = SyncReport::from_delta(&delta);
        assert_eq!(report.new_message_count(), 0);
        assert_eq!(report.removed, 2);
        assert_eq!(report.marked_seen, 1);
    }
}
