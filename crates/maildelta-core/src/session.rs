//! Connecting and logging in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use maildelta_proto::{
    Command, CommandHandler, Connection, ImapCommand, ParsedResult, Pop3Command, Secret,
};
use tracing::{debug, info, warn};

use crate::account::{AccountConfig, AccountProtocol};
use crate::error::{Error, Result};

const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Brings a [`Connection`] to the connected state.
///
/// The daemon uses [`TcpConnector`]; tests substitute in-memory streams.
pub trait Connector: Send + Sync {
    /// Opens the transport for `account` and wires it into `connection`.
    fn establish(
        &self,
        account: &AccountConfig,
        connection: &Connection,
    ) -> impl Future<Output = maildelta_proto::Result<()>> + Send;
}

/// Connects over TCP, with TLS when the account asks for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn establish(
        &self,
        _account: &AccountConfig,
        connection: &Connection,
    ) -> maildelta_proto::Result<()> {
        connection.connect().await
    }
}

/// Authenticates on a freshly connected handler.
///
/// IMAP sends `LOGIN`; POP3 sends `USER` then `PASS`. Each command gets the
/// account's login timeout.
///
/// # Errors
///
/// `Error::LoginFailed` if the server rejects a command or does not answer
/// in time; `Error::Proto` if the handler is gone.
pub async fn login(handler: &CommandHandler, account: &AccountConfig) -> Result<()> {
    let limit = account.login_timeout();
    match account.protocol {
        AccountProtocol::Imap => {
            let login = ImapCommand::login(account.username.clone(), account.password.clone());
            accepted(handler.execute_with_timeout(login, limit).await)?;
        }
        AccountProtocol::Pop3 => {
            let user = Pop3Command::User(account.username.clone());
            accepted(handler.execute_with_timeout(user, limit).await)?;
            let pass = Pop3Command::Pass(Secret::from(account.password.clone()));
            accepted(handler.execute_with_timeout(pass, limit).await)?;
        }
    }
    info!(stream_id = %account.stream_id, "logged in");
    Ok(())
}

fn accepted(outcome: maildelta_proto::Result<ParsedResult>) -> Result<()> {
    match outcome {
        Ok(result) if !result.error => Ok(()),
        Ok(result) => Err(Error::LoginFailed(format!(
            "{} rejected",
            result.command.name()
        ))),
        Err(maildelta_proto::Error::Timeout(limit)) => {
            Err(Error::LoginFailed(format!("no answer within {limit:?}")))
        }
        Err(e) => Err(e.into()),
    }
}

/// A connected, authenticated connection.
#[derive(Debug)]
pub struct MailSession {
    connection: Arc<Connection>,
    handler: CommandHandler,
    protocol: AccountProtocol,
}

impl MailSession {
    /// Connects `connection` through `connector` and logs in.
    ///
    /// On a failed login the connection is torn down before returning.
    ///
    /// # Errors
    ///
    /// Returns the connect or login failure.
    pub async fn open<C: Connector>(
        connector: &C,
        connection: Arc<Connection>,
        account: &AccountConfig,
    ) -> Result<Self> {
        connector.establish(account, &connection).await?;
        let handler = connection.handler().await?;
        if let Err(e) = login(&handler, account).await {
            warn!(stream_id = %account.stream_id, error = %e, "login failed");
            connection.hard_disconnect().await;
            return Err(e);
        }
        Ok(Self {
            connection,
            handler,
            protocol: account.protocol,
        })
    }

    /// Handler for issuing commands.
    #[must_use]
    pub const fn handler(&self) -> &CommandHandler {
        &self.handler
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Sends `LOGOUT`/`QUIT` and closes the connection.
    ///
    /// Failures are logged; the connection ends up disconnected either way.
    pub async fn close(self) {
        end_session(&self.connection, &self.handler, self.protocol).await;
    }
}

/// Says goodbye on `handler` and disconnects.
pub(crate) async fn end_session(
    connection: &Connection,
    handler: &CommandHandler,
    protocol: AccountProtocol,
) {
    let goodbye: Command = match protocol {
        AccountProtocol::Imap => ImapCommand::Logout.into(),
        AccountProtocol::Pop3 => Pop3Command::Quit.into(),
    };
    if let Err(e) = handler.execute_with_timeout(goodbye, LOGOUT_TIMEOUT).await {
        debug!(error = %e, "no answer to logout");
    }
    if connection.disconnect().await.is_err() {
        connection.hard_disconnect().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use maildelta_proto::ConnectionStatus;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Scripted(tokio::sync::Mutex<Option<DuplexStream>>);

    impl Scripted {
        fn new(stream: DuplexStream) -> Self {
            Self(tokio::sync::Mutex::new(Some(stream)))
        }
    }

    impl Connector for Scripted {
        async fn establish(
            &self,
            _account: &AccountConfig,
            connection: &Connection,
        ) -> maildelta_proto::Result<()> {
            let stream = self.0.lock().await.take().ok_or(maildelta_proto::Error::ConnectionClosed)?;
            connection.attach(stream).await
        }
    }

    /// Answers each line with the reply the closure picks.
    fn serve(stream: DuplexStream, greeting: &'static str, reply: fn(&str) -> Option<String>) {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(stream);
            write.write_all(greeting.as_bytes()).await.unwrap();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(answer) = reply(&line) {
                    write.write_all(answer.as_bytes()).await.unwrap();
                }
            }
        });
    }

    fn account(protocol: AccountProtocol) -> AccountConfig {
        AccountConfig::new("acct", protocol, "mail.example.com", "me", "pw")
    }

    fn new_connection(account: &AccountConfig) -> Arc<Connection> {
        Arc::new(Connection::new(account.connection_config()))
    }

    #[tokio::test]
    async fn test_imap_login_and_logout() {
        let (client, server) = tokio::io::duplex(4096);
        serve(server, "* OK ready\r\n", |line| {
            let (tag, rest) = line.split_once(' ').unwrap();
            Some(if rest.starts_with("LOGIN") {
                format!("{tag} OK LOGIN completed\r\n")
            } else {
                format!("* BYE\r\n{tag} OK LOGOUT completed\r\n")
            })
        });

        let account = account(AccountProtocol::Imap);
        let session = MailSession::open(&Scripted::new(client), new_connection(&account), &account)
            .await
            .unwrap();
        let connection = Arc::clone(session.connection());
        assert_eq!(connection.status(), ConnectionStatus::Connected);
        session.close().await;
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_pop3_rejected_password() {
        let (client, server) = tokio::io::duplex(4096);
        serve(server, "+OK POP3 ready\r\n", |line| {
            Some(if line.starts_with("PASS") {
                "-ERR invalid password\r\n".to_string()
            } else {
                "+OK\r\n".to_string()
            })
        });

        let account = account(AccountProtocol::Pop3);
        let connection = new_connection(&account);
        let result = MailSession::open(&Scripted::new(client), Arc::clone(&connection), &account).await;
        assert!(matches!(result, Err(Error::LoginFailed(m)) if m.contains("PASS")));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout() {
        let (client, server) = tokio::io::duplex(4096);
        serve(server, "* OK ready\r\n", |_| None);

        let mut account = account(AccountProtocol::Imap);
        account.login_timeout_ms = 250;
        let result = MailSession::open(&Scripted::new(client), new_connection(&account), &account).await;
        assert!(matches!(result, Err(Error::LoginFailed(m)) if m.contains("250ms")));
    }
}
