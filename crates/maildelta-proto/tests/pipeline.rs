//! End-to-end tests of the command pipeline against scripted servers.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};

use maildelta_proto::{
    Connection, ConnectionConfig, ConnectionStatus, ImapCommand, Mailbox, Payload, Peek,
    Pop3Command, Protocol, Security, Uid, UidSet,
};

/// Replies to each received line with whatever `respond` returns.
async fn serve<F>(stream: DuplexStream, greeting: &'static [u8], mut respond: F)
where
    F: FnMut(&str) -> Vec<u8> + Send + 'static,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    write.write_all(greeting).await.unwrap();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = respond(&line);
        if write.write_all(&reply).await.is_err() {
            break;
        }
    }
}

async fn connected<S>(protocol: Protocol, stream: S) -> Connection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let connection = Connection::new(
        ConnectionConfig::builder("localhost", protocol)
            .security(Security::None)
            .build(),
    );
    connection.attach(stream).await.unwrap();
    connection
}

#[tokio::test]
async fn concurrent_callers_each_get_their_own_result() {
    let (client, server) = tokio::io::duplex(4096);
    let mut expected_tag = 0u32;
    tokio::spawn(serve(server, b"* OK IMAP4rev1 ready\r\n", move |line| {
        let (tag, rest) = line.split_once(' ').unwrap();
        assert_eq!(tag, format!("A{expected_tag:04}"));
        expected_tag += 1;
        let n: u32 = rest.trim_start_matches("SELECT box").parse().unwrap();
        format!("* {n} EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] done\r\n").into_bytes()
    }));

    let connection = connected(Protocol::Imap, client).await;
    let handler = connection.handler().await.unwrap();

    let calls: Vec<_> = (0..8u32)
        .map(|i| {
            let handler = handler.clone();
            tokio::spawn(async move {
                let result = handler
                    .execute(ImapCommand::Select {
                        mailbox: Mailbox::new(format!("box{i}")),
                    })
                    .await
                    .unwrap();
                (i, result)
            })
        })
        .collect();

    for call in calls {
        let (i, result) = call.await.unwrap();
        assert!(!result.error);
        let Some(Payload::Selection(status)) = result.payload else {
            panic!("expected selection for box{i}");
        };
        assert_eq!(status.exists, i);
    }
}

#[tokio::test]
async fn results_arrive_in_issue_order_from_one_caller() {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(serve(server, b"* OK ready\r\n", |line| {
        let tag = line.split(' ').next().unwrap().to_string();
        format!("{tag} OK noop {tag}\r\n").into_bytes()
    }));

    let connection = connected(Protocol::Imap, client).await;
    let handler = connection.handler().await.unwrap();

    for n in 0..20u32 {
        let result = handler.execute(ImapCommand::Noop).await.unwrap();
        let id = format!("A{n:04}");
        assert_eq!(result.correlation_id.as_str(), id);
        assert_eq!(result.payload, Some(Payload::Ack(format!("noop {id}"))));
    }
}

#[tokio::test]
async fn rejection_leaves_connection_usable() {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(serve(server, b"* OK ready\r\n", |line| {
        let (tag, rest) = line.split_once(' ').unwrap();
        if rest.starts_with("LOGIN") {
            format!("{tag} NO [AUTHENTICATIONFAILED] bad credentials\r\n").into_bytes()
        } else {
            format!("* CAPABILITY IMAP4rev1 IDLE\r\n{tag} OK done\r\n").into_bytes()
        }
    }));

    let connection = connected(Protocol::Imap, client).await;
    let handler = connection.handler().await.unwrap();

    let login = handler
        .execute(ImapCommand::login("user", "wrong"))
        .await
        .unwrap();
    assert!(login.error);
    assert!(login.payload.is_none());

    let caps = handler.execute(ImapCommand::Capability).await.unwrap();
    assert_eq!(
        caps.into_payload(),
        Some(Payload::Capabilities(vec!["IMAP4rev1".into(), "IDLE".into()]))
    );
    assert_eq!(connection.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn header_literal_containing_a_tag_line() {
    let header = b"Subject: A0000 OK fake\r\n\r\n";
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(serve(server, b"* OK ready\r\n", move |line| {
        let tag = line.split(' ').next().unwrap();
        let mut reply = format!("* 1 FETCH (UID 42 BODY[HEADER] {{{}}}\r\n", header.len()).into_bytes();
        reply.extend_from_slice(header);
        reply.extend_from_slice(format!(")\r\n{tag} OK fetched\r\n").as_bytes());
        reply
    }));

    let connection = connected(Protocol::Imap, client).await;
    let handler = connection.handler().await.unwrap();
    let result = handler
        .execute(ImapCommand::UidFetch {
            uids: UidSet::single(Uid::new(42).unwrap()),
            peek: Peek::Header,
        })
        .await
        .unwrap();

    let Some(Payload::Fetch(entries)) = result.into_payload() else {
        panic!("expected fetch payload");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].uid.get(), 42);
}

#[tokio::test]
async fn pop3_retrieve_completed_by_octets_then_next_command() {
    let (client, mut server) = tokio::io::duplex(4096);
    let connection = connected(Protocol::Pop3, client).await;
    let handler = connection.handler().await.unwrap();

    let script = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(&mut server);
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"+OK POP3 ready\r\n").await.unwrap();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "RETR 1");
        write.write_all(b"+OK 7 octets\r\nhello\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        write.write_all(b".\r\n").await.unwrap();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "STAT");
        write.write_all(b"+OK 2 320\r\n").await.unwrap();
    });

    let retr = handler.execute(Pop3Command::Retr(1)).await.unwrap();
    assert_eq!(retr.into_payload(), Some(Payload::Content(b"hello\r\n".to_vec())));

    let stat = handler.execute(Pop3Command::Stat).await.unwrap();
    let Some(Payload::Stat(stat)) = stat.into_payload() else {
        panic!("expected STAT payload");
    };
    assert_eq!((stat.count, stat.size), (2, 320));
    script.await.unwrap();
}

#[tokio::test]
async fn scripted_mock_capability_exchange() {
    let mock = tokio_test::io::Builder::new()
        .read(b"+OK ready\r\n")
        .write(b"CAPA\r\n")
        .read(b"+OK capability list follows\r\nUSER\r\nUIDL\r\nTOP\r\n.\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK bye\r\n")
        .build();

    let connection = connected(Protocol::Pop3, mock).await;
    let handler = connection.handler().await.unwrap();

    let capa = handler.execute(Pop3Command::Capa).await.unwrap();
    assert_eq!(
        capa.into_payload(),
        Some(Payload::Capabilities(vec![
            "USER".into(),
            "UIDL".into(),
            "TOP".into()
        ]))
    );
    let quit = handler.execute(Pop3Command::Quit).await.unwrap();
    assert!(!quit.error);
}

#[tokio::test]
async fn graceful_disconnect() {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(serve(server, b"* OK ready\r\n", |line| {
        let tag = line.split(' ').next().unwrap();
        format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n").into_bytes()
    }));

    let connection = connected(Protocol::Imap, client).await;
    let handler = connection.handler().await.unwrap();
    let logout = handler.execute(ImapCommand::Logout).await.unwrap();
    assert!(!logout.error);

    connection.disconnect().await.unwrap();
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert!(connection.handler().await.is_err());
    assert!(connection.disconnect().await.is_err());
}
