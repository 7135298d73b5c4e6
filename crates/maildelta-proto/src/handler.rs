//! Command handler: one command in flight per connection.
//!
//! Callers talk to a worker task over a channel. The worker owns the write
//! half of the socket and the wire transform, so concurrent callers are
//! serialized in arrival order and each waits for the result carrying its
//! own correlation id.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::result::ParsedResult;
use crate::transform::WireTransform;
use crate::{Error, Result};

enum Op {
    Execute {
        command: Command,
        reply: oneshot::Sender<Result<ParsedResult>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable handle for issuing commands on one connection.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    ops: mpsc::UnboundedSender<Op>,
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execute { command, .. } => f.debug_tuple("Execute").field(command).finish(),
            Self::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

impl CommandHandler {
    /// Spawns the worker for a connection.
    ///
    /// `results` is the stream the connection's receiver publishes into.
    pub fn spawn<W>(
        writer: W,
        transform: WireTransform,
        results: mpsc::UnboundedReceiver<ParsedResult>,
    ) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            writer,
            transform,
            results,
            broken: false,
        };
        let task = tokio::spawn(worker.run(rx));
        (Self { ops: tx }, task)
    }

    /// Issues a command and waits for its result.
    ///
    /// Rejections, malformed responses and transport failures come back as
    /// a result with `error` set.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` if the command is for the other protocol.
    /// - `Error::ConnectionClosed` if the connection has been torn down.
    pub async fn execute(&self, command: impl Into<Command>) -> Result<ParsedResult> {
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(Op::Execute {
                command: command.into(),
                reply,
            })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Like [`execute`](Self::execute), giving up after `limit`.
    ///
    /// The command is not retracted. If it was already written its result is
    /// still drained by the worker before the next queued command runs.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when no result arrived in time, otherwise as
    /// [`execute`](Self::execute).
    pub async fn execute_with_timeout(
        &self,
        command: impl Into<Command>,
        limit: Duration,
    ) -> Result<ParsedResult> {
        let command = command.into();
        let name = command.name();
        tokio::time::timeout(limit, self.execute(command))
            .await
            .unwrap_or_else(|_| {
                warn!(command = name, ?limit, "Command timed out");
                Err(Error::Timeout(limit))
            })
    }

    /// Half-closes the socket once every queued command has finished.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the shutdown fails, `Error::ConnectionClosed` if the
    /// worker is already gone.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(Op::Shutdown { reply })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Returns true while the worker accepts commands.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.ops.is_closed()
    }
}

struct Worker<W> {
    writer: W,
    transform: WireTransform,
    results: mpsc::UnboundedReceiver<ParsedResult>,
    broken: bool,
}

impl<W: AsyncWrite + Unpin + Send> Worker<W> {
    async fn run(mut self, mut ops: mpsc::UnboundedReceiver<Op>) {
        while let Some(op) = ops.recv().await {
            match op {
                Op::Execute { command, reply } => {
                    if reply.is_closed() {
                        debug!(command = command.name(), "Caller gone before write, skipping");
                        continue;
                    }
                    let outcome = self.execute(command).await;
                    if reply.send(outcome).is_err() {
                        trace!("Late result discarded");
                    }
                }
                Op::Shutdown { reply } => {
                    let outcome = self.writer.shutdown().await.map_err(Error::from);
                    debug!(ok = outcome.is_ok(), "Write half closed");
                    let _ = reply.send(outcome);
                    break;
                }
            }
        }
        trace!("Command handler stopped");
    }

    async fn execute(&mut self, command: Command) -> Result<ParsedResult> {
        if self.broken {
            return Err(Error::ConnectionClosed);
        }

        let transmit = self.transform.transform(command.clone())?;
        let id = transmit.correlation_id;
        debug!(id = %id, command = command.name(), "Issuing command");

        if let Err(e) = self.write(&transmit.bytes).await {
            warn!(id = %id, error = %e, "Write failed");
            self.broken = true;
            return Ok(ParsedResult::failure(id, command));
        }

        loop {
            match self.results.recv().await {
                Some(result) if result.correlation_id == id => return Ok(result),
                Some(stale) => {
                    debug!(id = %stale.correlation_id, "Discarding result nobody waits for");
                }
                None => {
                    warn!(id = %id, "Receiver gone before result arrived");
                    self.broken = true;
                    return Ok(ParsedResult::failure(id, command));
                }
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
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
    use crate::command::{ImapCommand, Pop3Command};
    use crate::types::{CorrelationId, Protocol};
    use tokio::io::AsyncReadExt;

    fn ack(id: &str) -> ParsedResult {
        ParsedResult::success(
            CorrelationId::new(id),
            ImapCommand::Noop.into(),
            crate::result::Payload::Ack("done".into()),
        )
    }

    #[tokio::test]
    async fn result_is_matched_by_id() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (transform, _queue) = WireTransform::new(Protocol::Imap);
        let (tx, rx) = mpsc::unbounded_channel();
        let (handler, _task) = CommandHandler::spawn(client, transform, rx);

        let call = tokio::spawn({
            let handler = handler.clone();
            async move { handler.execute(ImapCommand::Noop).await }
        });

        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"A0000 NOOP\r\n");

        tx.send(ack("Z9999")).unwrap();
        tx.send(ack("A0000")).unwrap();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.correlation_id.as_str(), "A0000");
        assert!(!result.error);
    }

    #[tokio::test]
    async fn wrong_protocol_is_a_hard_error() {
        let (client, _server) = tokio::io::duplex(1024);
        let (transform, _queue) = WireTransform::new(Protocol::Imap);
        let (_tx, rx) = mpsc::unbounded_channel();
        let (handler, _task) = CommandHandler::spawn(client, transform, rx);

        let result = handler.execute(Pop3Command::Stat).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn closed_results_yield_failure() {
        let (client, _server) = tokio::io::duplex(1024);
        let (transform, _queue) = WireTransform::new(Protocol::Pop3);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        let (handler, _task) = CommandHandler::spawn(client, transform, rx);

        let result = handler.execute(Pop3Command::Noop).await.unwrap();
        assert!(result.error);
        assert!(result.payload.is_none());

        let again = handler.execute(Pop3Command::Noop).await;
        assert!(matches!(again, Err(Error::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_limit() {
        let (client, _server) = tokio::io::duplex(1024);
        let (transform, _queue) = WireTransform::new(Protocol::Imap);
        let (_tx, rx) = mpsc::unbounded_channel();
        let (handler, _task) = CommandHandler::spawn(client, transform, rx);

        let limit = Duration::from_millis(50);
        let result = handler.execute_with_timeout(ImapCommand::Noop, limit).await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn shutdown_closes_write_half() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (transform, _queue) = WireTransform::new(Protocol::Imap);
        let (_tx, rx) = mpsc::unbounded_channel();
        let (handler, task) = CommandHandler::spawn(client, transform, rx);

        handler.shutdown().await.unwrap();
        task.await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
        assert!(!handler.is_open());
    }
}
