//! A single mail server connection and its status machine.
//!
//! `connect` opens the socket and wires it into the pipeline: the command
//! handler's worker owns the write half, a reader task pumps the read half
//! into a [`Receiver`]. Results travel from the receiver back to the
//! handler over a per-connection channel.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::config::{ConnectionConfig, Security};
use super::stream::{MailStream, connect_plain, connect_tls};
use crate::handler::CommandHandler;
use crate::receiver::Receiver;
use crate::transform::WireTransform;
use crate::{Error, Result};

const READ_BUFFER: usize = 8192;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Socket is being opened.
    Connecting,
    /// Socket is open and commands may be issued.
    Connected,
    /// No socket.
    #[default]
    Disconnected,
    /// The socket failed to open or broke.
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

struct Link {
    handler: CommandHandler,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// One connection to a mail server.
pub struct Connection {
    config: ConnectionConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    link: Mutex<Option<Link>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("protocol", &self.config.protocol)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a disconnected connection.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config,
            status: Arc::new(status),
            link: Mutex::new(None),
        }
    }

    /// The configuration this connection was created with.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Opens the socket and starts the pipeline.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` if already connecting or connected. Socket,
    /// TLS and timeout failures are returned after moving to
    /// [`ConnectionStatus::Error`].
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.begin(&mut link)?;

        let opened = tokio::time::timeout(self.config.connect_timeout, self.open())
            .await
            .unwrap_or(Err(Error::Timeout(self.config.connect_timeout)));

        match opened {
            Ok(stream) => {
                *link = Some(self.wire(stream));
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.config.host, port = self.config.port, error = %e, "Connect failed");
                self.set_status(ConnectionStatus::Error);
                Err(e)
            }
        }
    }

    /// Starts the pipeline over an already open stream.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` if already connecting or connected.
    pub async fn attach<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut link = self.link.lock().await;
        self.begin(&mut link)?;
        *link = Some(self.wire(stream));
        Ok(())
    }

    /// Returns the command handler of a connected connection.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless the status is `Connected`.
    pub async fn handler(&self) -> Result<CommandHandler> {
        let link = self.link.lock().await;
        match (&*link, self.status()) {
            (Some(link), ConnectionStatus::Connected) => Ok(link.handler.clone()),
            (_, status) => Err(Error::InvalidState(format!(
                "no command handler while {status}"
            ))),
        }
    }

    /// Half-closes the socket after queued commands have finished.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless connected; the shutdown's own failure
    /// otherwise.
    pub async fn disconnect(&self) -> Result<()> {
        let link = self.link.lock().await;
        let Some(link) = link.as_ref().filter(|_| self.status() == ConnectionStatus::Connected)
        else {
            return Err(Error::InvalidState(format!(
                "cannot disconnect while {}",
                self.status()
            )));
        };
        let outcome = link.handler.shutdown().await;
        self.set_status(ConnectionStatus::Disconnected);
        info!(host = %self.config.host, "Disconnected");
        outcome
    }

    /// Tears the pipeline down immediately.
    ///
    /// Commands still waiting fail with `Error::ConnectionClosed`.
    pub async fn hard_disconnect(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.abort();
            debug!(host = %self.config.host, "Pipeline destroyed");
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn begin(&self, link: &mut Option<Link>) -> Result<()> {
        match self.status() {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
            status => {
                return Err(Error::InvalidState(format!("cannot connect while {status}")));
            }
        }
        if let Some(old) = link.take() {
            old.abort();
        }
        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    async fn open(&self) -> Result<MailStream> {
        let ConnectionConfig { host, port, .. } = &self.config;
        debug!(%host, port, security = ?self.config.security, "Opening socket");
        match self.config.security {
            Security::Implicit => connect_tls(host, *port).await,
            Security::None => connect_plain(host, *port).await,
        }
    }

    fn wire<S>(&self, stream: S) -> Link
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (transform, pending) = WireTransform::new(self.config.protocol);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let receiver = Receiver::new(pending, results_tx);

        self.set_status(ConnectionStatus::Connected);
        info!(
            host = %self.config.host,
            port = self.config.port,
            protocol = %self.config.protocol,
            "Connected"
        );

        let (handler, writer) = CommandHandler::spawn(write_half, transform, results_rx);
        let reader = tokio::spawn(read_loop(read_half, receiver, Arc::clone(&self.status)));
        Link {
            handler,
            reader,
            writer,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            trace!(from = %previous, to = %status, "Connection status");
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut receiver: Receiver,
    status: Arc<watch::Sender<ConnectionStatus>>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    let outcome = loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => break ConnectionStatus::Disconnected,
            Ok(n) => {
                trace!(bytes = n, "Received");
                receiver.receive(&buf);
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                break ConnectionStatus::Error;
            }
        }
    };

    receiver.fail_outstanding();
    status.send_if_modified(|current| {
        let live = *current == ConnectionStatus::Connected;
        if live {
            *current = outcome;
        }
        live
    });
    info!(status = %outcome, "Reader stopped");
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
    use crate::command::ImapCommand;
    use crate::types::Protocol;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn imap() -> Connection {
        Connection::new(
            ConnectionConfig::builder("localhost", Protocol::Imap)
                .security(Security::None)
                .build(),
        )
    }

    #[tokio::test]
    async fn handler_requires_connected() {
        let connection = imap();
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            connection.handler().await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            connection.disconnect().await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn attach_moves_through_connecting() {
        let connection = imap();
        let mut watcher = connection.subscribe();
        let (client, _server) = tokio::io::duplex(1024);

        connection.attach(client).await.unwrap();
        assert_eq!(connection.status(), ConnectionStatus::Connected);
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), ConnectionStatus::Connected);

        let (again, _other) = tokio::io::duplex(16);
        assert!(matches!(
            connection.attach(again).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn remote_close_fails_pending_and_disconnects() {
        let connection = imap();
        let (client, mut server) = tokio::io::duplex(1024);
        connection.attach(client).await.unwrap();
        let handler = connection.handler().await.unwrap();

        let call = tokio::spawn(async move { handler.execute(ImapCommand::Noop).await });
        server.write_all(b"* OK ready\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(server);

        let result = call.await.unwrap().unwrap();
        assert!(result.error);

        let mut watcher = connection.subscribe();
        watcher
            .wait_for(|s| *s == ConnectionStatus::Disconnected)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refused_connect_moves_to_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = Connection::new(
            ConnectionConfig::builder("127.0.0.1", Protocol::Pop3)
                .security(Security::None)
                .port(port)
                .build(),
        );
        assert!(connection.connect().await.is_err());
        assert_eq!(connection.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn hard_disconnect_destroys_pipeline() {
        let connection = imap();
        let (client, _server) = tokio::io::duplex(1024);
        connection.attach(client).await.unwrap();
        let handler = connection.handler().await.unwrap();

        connection.hard_disconnect().await;
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        tokio::task::yield_now().await;
        assert!(matches!(
            handler.execute(ImapCommand::Noop).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
