//! Sync cycles against scripted IMAP and POP3 servers on in-memory streams.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use maildelta_core::{
    AccountConfig, AccountProtocol, Connector, Error, HistoryEntry, HistoryOrder, MailRecord,
    MailStore, Scheduler, SqliteMailStore, Synchronizer,
};
use maildelta_proto::Connection;

// ---------------------------------------------------------------------------
// Scripted servers
// ---------------------------------------------------------------------------

/// Produces the reply to one command line.
trait Script: Send + Sync + 'static {
    fn greeting(&self) -> &'static str;
    fn respond(&self, line: &str) -> String;
}

/// Hands every new connection a fresh duplex stream served by `S`.
struct ScriptedConnector<S> {
    script: Arc<S>,
    connects: Arc<AtomicUsize>,
}

impl<S: Script> ScriptedConnector<S> {
    fn new(script: Arc<S>) -> Self {
        Self {
            script,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<S: Script> Connector for ScriptedConnector<S> {
    async fn establish(
        &self,
        _account: &AccountConfig,
        connection: &Connection,
    ) -> maildelta_proto::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, Arc::clone(&self.script)));
        connection.attach(client).await
    }
}

async fn serve<S: Script>(stream: DuplexStream, script: Arc<S>) {
    let (read, mut write) = tokio::io::split(stream);
    if write.write_all(script.greeting().as_bytes()).await.is_err() {
        return;
    }
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = script.respond(&line);
        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// True if `uid` is in an IMAP set such as `3,5:7`.
fn in_set(set: &str, uid: u32) -> bool {
    set.split(',').any(|part| match part.split_once(':') {
        Some((a, b)) => {
            let (a, b): (u32, u32) = (a.parse().unwrap(), b.parse().unwrap());
            a.min(b) <= uid && uid <= a.max(b)
        }
        None => part.parse::<u32>().unwrap() == uid,
    })
}

#[derive(Clone)]
struct ImapMessage {
    uid: u32,
    seen: bool,
    header: String,
}

fn imap_message(uid: u32, seen: bool, subject: &str) -> ImapMessage {
    ImapMessage {
        uid,
        seen,
        header: format!("From: Sender {uid} <s{uid}@example.com>\r\nSubject: {subject}\r\n\r\n"),
    }
}

#[derive(Default)]
struct ImapState {
    messages: Vec<ImapMessage>,
    reject_select: bool,
    skip_date_for: Option<u32>,
    commands: Vec<String>,
}

#[derive(Default)]
struct FakeImap(Mutex<ImapState>);

impl FakeImap {
    fn with(messages: Vec<ImapMessage>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(ImapState {
            messages,
            ..ImapState::default()
        })))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ImapState> {
        self.0.lock().unwrap()
    }
}

impl Script for FakeImap {
    fn greeting(&self) -> &'static str {
        "* OK IMAP4rev1 ready\r\n"
    }

    fn respond(&self, line: &str) -> String {
        let mut state = self.state();
        let (tag, command) = line.split_once(' ').unwrap();
        state.commands.push(command.to_string());
        let ok = |what: &str| format!("{tag} OK {what} completed\r\n");

        if command.starts_with("LOGIN") {
            return ok("LOGIN");
        }
        if command.starts_with("LIST") {
            return format!(
                "* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
* LIST (\\Noselect \\HasChildren) \"/\" \"[Gmail]\"\r\n\
* LIST (\\HasNoChildren) \"/\" \"[Gmail]/All Mail\"\r\n{}",
                ok("LIST")
            );
        }
        if command.starts_with("SELECT") {
            assert_eq!(command, "SELECT \"[Gmail]/All Mail\"");
            if state.reject_select {
                return format!("{tag} NO no such mailbox\r\n");
            }
            return format!(
                "* {} EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] SELECT completed\r\n",
                state.messages.len()
            );
        }
        if let Some(criteria) = command.strip_prefix("UID SEARCH ") {
            let (seen_only, criteria) = criteria
                .strip_prefix("SEEN ")
                .map_or((false, criteria), |rest| (true, rest));
            let matches: Vec<String> = state
                .messages
                .iter()
                .filter(|m| match criteria.strip_prefix("UID ") {
                    Some(set) => in_set(set, m.uid),
                    None => criteria == "ALL",
                })
                .filter(|m| !seen_only || m.seen)
                .map(|m| m.uid.to_string())
                .collect();
            let data = if matches.is_empty() {
                String::new()
            } else {
                format!(" {}", matches.join(" "))
            };
            return format!("* SEARCH{data}\r\n{}", ok("SEARCH"));
        }
        if let Some(rest) = command.strip_prefix("UID FETCH ") {
            let (set, item) = rest.split_once(' ').unwrap();
            let mut out = String::new();
            for (i, m) in state.messages.iter().enumerate() {
                if !in_set(set, m.uid) {
                    continue;
                }
                let seq = i + 1;
                let uid = m.uid;
                match item {
                    "FLAGS" => {
                        let flags = if m.seen { "\\Seen" } else { "" };
                        out.push_str(&format!("* {seq} FETCH (UID {uid} FLAGS ({flags}))\r\n"));
                    }
                    "INTERNALDATE" if state.skip_date_for == Some(uid) => {}
                    "INTERNALDATE" => out.push_str(&format!(
                        "* {seq} FETCH (UID {uid} INTERNALDATE \"01-Mar-2024 12:{:02}:00 +0000\")\r\n",
                        uid % 60
                    )),
                    "BODY.PEEK[HEADER]" => out.push_str(&format!(
                        "* {seq} FETCH (UID {uid} BODY[HEADER] {{{}}}\r\n{})\r\n",
                        m.header.len(),
                        m.header
                    )),
                    other => panic!("unexpected fetch item {other}"),
                }
            }
            return out + &ok("FETCH");
        }
        if command == "LOGOUT" {
            return format!("* BYE logging out\r\n{}", ok("LOGOUT"));
        }
        format!("{tag} BAD unexpected command\r\n")
    }
}

#[derive(Default)]
struct Pop3State {
    messages: Vec<(String, String)>,
    reject_pass: bool,
    retrieved: Vec<u32>,
}

#[derive(Default)]
struct FakePop3(Mutex<Pop3State>);

impl FakePop3 {
    fn with(uids: &[&str]) -> Arc<Self> {
        let messages = uids
            .iter()
            .map(|uid| {
                let raw = format!(
                    "From: {uid}@example.com\r\nSubject: message {uid}\r\n\
Date: Fri, 01 Mar 2024 12:30:00 +0000\r\n\r\nbody of {uid}\r\n.dot line\r\n"
                );
                ((*uid).to_string(), raw)
            })
            .collect();
        Arc::new(Self(Mutex::new(Pop3State {
            messages,
            ..Pop3State::default()
        })))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, Pop3State> {
        self.0.lock().unwrap()
    }
}

impl Script for FakePop3 {
    fn greeting(&self) -> &'static str {
        "+OK POP3 ready\r\n"
    }

    fn respond(&self, line: &str) -> String {
        let mut state = self.state();
        let mut words = line.split(' ');
        match words.next().unwrap() {
            "USER" => "+OK\r\n".to_string(),
            "PASS" if state.reject_pass => "-ERR authentication failed\r\n".to_string(),
            "PASS" => "+OK logged in\r\n".to_string(),
            "UIDL" => {
                let mut out = String::from("+OK\r\n");
                for (i, (uid, _)) in state.messages.iter().enumerate() {
                    out.push_str(&format!("{} {uid}\r\n", i + 1));
                }
                out + ".\r\n"
            }
            "RETR" => {
                let n: u32 = words.next().unwrap().parse().unwrap();
                state.retrieved.push(n);
                let raw = state.messages[n as usize - 1].1.replace("\r\n.", "\r\n..");
                format!("+OK message follows\r\n{raw}.\r\n")
            }
            "QUIT" => "+OK bye\r\n".to_string(),
            _ => "-ERR unknown command\r\n".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn account(stream_id: &str, protocol: AccountProtocol) -> AccountConfig {
    AccountConfig::new(stream_id, protocol, "mail.example.com", "me", "secret")
}

async fn synchronizer<S: Script>(
    script: &Arc<S>,
    accounts: Vec<AccountConfig>,
) -> (
    Arc<Synchronizer<SqliteMailStore, ScriptedConnector<S>>>,
    Arc<AtomicUsize>,
) {
    let store = Arc::new(SqliteMailStore::in_memory().await.unwrap());
    let connector = ScriptedConnector::new(Arc::clone(script));
    let connects = Arc::clone(&connector.connects);
    (
        Arc::new(Synchronizer::new(store, connector, accounts)),
        connects,
    )
}

async fn history_uids<S: MailStore>(store: &S, stream_id: &str) -> Vec<String> {
    store
        .read_history(stream_id, HistoryOrder::Uid)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.uid)
        .collect()
}

async fn seed<S: MailStore>(store: &S, stream_id: &str, uids: &[u32]) {
    for (i, uid) in uids.iter().enumerate() {
        let seq = u32::try_from(i).unwrap() + 1;
        store
            .write_history(&HistoryEntry::new(stream_id, seq, uid.to_string()))
            .await
            .unwrap();
        store
            .write_mail(&MailRecord {
                stream_id: stream_id.to_string(),
                uid: uid.to_string(),
                is_seen: false,
                date: None,
                from_address: None,
                subject: None,
            })
            .await
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// IMAP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imap_first_sync_then_idempotent_then_incremental() {
    let server = FakeImap::with(vec![
        imap_message(100, true, "old"),
        imap_message(101, true, "older"),
        imap_message(102, false, "=?utf-8?Q?Caf=C3=A9?="),
    ]);
    let (sync, connects) = synchronizer(&server, vec![account("gmail", AccountProtocol::Imap)]).await;

    let first = sync.run("gmail").await.unwrap();
    assert_eq!(first.new_message_count(), 1);
    let record = &first.new_messages[0];
    assert_eq!(record.uid, "102");
    assert_eq!(record.subject.as_deref(), Some("Café"));
    assert_eq!(record.from_address.as_deref(), Some("Sender 102 <s102@example.com>"));
    assert!(!record.is_seen);
    assert!(record.date.is_some());

    let second = sync.run("gmail").await.unwrap();
    assert_eq!(second.new_message_count(), 0);
    assert_eq!(second.removed, 0);

    server.state().messages.push(imap_message(103, false, "c"));
    server.state().messages.push(imap_message(104, true, "d"));
    let third = sync.run("gmail").await.unwrap();
    let uids: Vec<&str> = third.new_messages.iter().map(|m| m.uid.as_str()).collect();
    assert_eq!(uids, ["103", "104"]);
    assert!(third.new_messages[1].is_seen);

    assert_eq!(history_uids(sync.store(), "gmail").await, ["102", "103", "104"]);
    let history = sync
        .store()
        .read_history("gmail", HistoryOrder::Sequence)
        .await
        .unwrap();
    assert_eq!(history.last().unwrap().sequence, 5);
    assert!(server.state().commands.contains(&"UID FETCH 103:104 FLAGS".to_string()));
    assert_eq!(connects.load(Ordering::SeqCst), 1, "IMAP session is reused");
}

#[tokio::test]
async fn imap_reconciliation_deletes_only_missing_uids() {
    let server = FakeImap::with(vec![
        imap_message(100, true, "kept and read"),
        imap_message(102, false, "kept"),
    ]);
    let (sync, _) = synchronizer(&server, vec![account("work", AccountProtocol::Imap)]).await;
    seed(sync.store(), "work", &[100, 101, 102]).await;

    let report = sync.run("work").await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.marked_seen, 1);
    assert_eq!(report.new_message_count(), 0);

    assert_eq!(history_uids(sync.store(), "work").await, ["100", "102"]);
    let mail = sync.store().read_mail("work").await.unwrap();
    let state: Vec<(&str, bool)> = mail.iter().map(|m| (m.uid.as_str(), m.is_seen)).collect();
    assert_eq!(state, [("100", true), ("102", false)]);

    let commands = server.state().commands.clone();
    assert!(commands.contains(&"UID SEARCH UID 100:102".to_string()));
    assert!(commands.contains(&"UID SEARCH SEEN UID 100,102".to_string()));
}

#[tokio::test]
async fn imap_fetch_disagreement_leaves_store_untouched() {
    let server = FakeImap::with(vec![
        imap_message(100, false, "a"),
        imap_message(102, false, "b"),
        imap_message(103, false, "c"),
    ]);
    server.state().skip_date_for = Some(103);
    let (sync, _) = synchronizer(&server, vec![account("work", AccountProtocol::Imap)]).await;
    seed(sync.store(), "work", &[100, 101]).await;

    let result = sync.run("work").await;
    assert!(matches!(result, Err(Error::SyncAborted(_))));
    assert_eq!(history_uids(sync.store(), "work").await, ["100", "101"]);
}

#[tokio::test]
async fn imap_rejected_select_ends_cycle_quietly() {
    let server = FakeImap::with(vec![imap_message(1, false, "a")]);
    server.state().reject_select = true;
    let (sync, _) = synchronizer(&server, vec![account("work", AccountProtocol::Imap)]).await;

    let report = sync.run("work").await.unwrap();
    assert_eq!(report.new_message_count(), 0);
    assert!(history_uids(sync.store(), "work").await.is_empty());
    assert!(!server.state().commands.iter().any(|c| c.starts_with("UID")));
}

// ---------------------------------------------------------------------------
// POP3
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pop3_first_sync_retrieves_only_newest() {
    let server = FakePop3::with(&["a", "b", "c"]);
    let (sync, _) = synchronizer(&server, vec![account("home", AccountProtocol::Pop3)]).await;

    let report = sync.run("home").await.unwrap();
    assert_eq!(report.new_message_count(), 1);
    assert_eq!(report.new_messages[0].uid, "c");
    assert_eq!(report.new_messages[0].subject.as_deref(), Some("message c"));
    assert_eq!(server.state().retrieved, [3]);

    let history = sync
        .store()
        .read_history("home", HistoryOrder::Sequence)
        .await
        .unwrap();
    assert_eq!(history, vec![HistoryEntry::new("home", 3, "c")]);
}

#[tokio::test]
async fn pop3_incremental_retrieves_in_listing_order() {
    let server = FakePop3::with(&["a", "b", "c", "d"]);
    let (sync, connects) = synchronizer(&server, vec![account("home", AccountProtocol::Pop3)]).await;
    sync.store()
        .write_history(&HistoryEntry::new("home", 2, "b"))
        .await
        .unwrap();

    let report = sync.run("home").await.unwrap();
    let uids: Vec<&str> = report.new_messages.iter().map(|m| m.uid.as_str()).collect();
    assert_eq!(uids, ["c", "d"]);
    assert_eq!(server.state().retrieved, [3, 4]);

    let again = sync.run("home").await.unwrap();
    assert_eq!(again.new_message_count(), 0);
    assert_eq!(connects.load(Ordering::SeqCst), 2, "POP3 reconnects every cycle");
}

#[tokio::test]
async fn pop3_deletion_and_renumbering() {
    let server = FakePop3::with(&["a", "b", "c"]);
    let (sync, _) = synchronizer(&server, vec![account("home", AccountProtocol::Pop3)]).await;
    for (seq, uid) in [(1, "a"), (2, "b"), (3, "c")] {
        sync.store()
            .write_history(&HistoryEntry::new("home", seq, uid))
            .await
            .unwrap();
    }
    server.state().messages.remove(0);

    let report = sync.run("home").await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.new_message_count(), 0);
    let history = sync
        .store()
        .read_history("home", HistoryOrder::Sequence)
        .await
        .unwrap();
    assert_eq!(
        history,
        vec![HistoryEntry::new("home", 1, "b"), HistoryEntry::new("home", 2, "c")]
    );
}

#[tokio::test]
async fn pop3_rejected_login_is_reported() {
    let server = FakePop3::with(&["a"]);
    server.state().reject_pass = true;
    let (sync, _) = synchronizer(&server, vec![account("home", AccountProtocol::Pop3)]).await;

    let result = sync.run("home").await;
    assert!(matches!(result, Err(Error::LoginFailed(_))));
    assert!(server.state().retrieved.is_empty());
}

#[tokio::test]
async fn unknown_account_is_an_error() {
    let server = FakePop3::with(&[]);
    let (sync, _) = synchronizer(&server, Vec::new()).await;
    assert!(matches!(
        sync.run("nobody").await,
        Err(Error::AccountNotFound(id)) if id == "nobody"
    ));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduler_ticks_until_shutdown() {
    let server = FakePop3::with(&["a", "b"]);
    let (sync, connects) = synchronizer(&server, vec![account("home", AccountProtocol::Pop3)]).await;

    let scheduler = Scheduler::new(Arc::clone(&sync), Duration::from_millis(20));
    scheduler
        .run_until(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert!(connects.load(Ordering::SeqCst) >= 2);
    assert_eq!(history_uids(sync.store(), "home").await, ["b"]);
    assert_eq!(server.state().retrieved, [2]);
}
