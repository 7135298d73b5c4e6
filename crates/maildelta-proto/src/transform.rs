//! Wire transform: command serialization plus the pending-result FIFO.
//!
//! Every serialized command pushes exactly one [`PendingResult`] before its
//! bytes reach the socket. The receiver pops them in the same order as
//! responses complete, which is what ties a response to its command.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::command::{Command, ResultShape, TagGenerator};
use crate::types::{CorrelationId, Protocol};
use crate::{Error, Result};

/// Descriptor of a response the receiver should expect next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResult {
    /// Id assigned to the command.
    pub correlation_id: CorrelationId,
    /// The issued command.
    pub command: Command,
    /// Shape the response will be extracted into.
    pub shape: ResultShape,
}

/// Serializes commands for one connection.
#[derive(Debug)]
pub struct WireTransform {
    protocol: Protocol,
    tags: TagGenerator,
    pending: mpsc::UnboundedSender<PendingResult>,
}

/// Receiving end of the pending-result FIFO.
#[derive(Debug)]
pub struct PendingQueue {
    rx: mpsc::UnboundedReceiver<PendingResult>,
}

/// A serialized command, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Id assigned to the command.
    pub correlation_id: CorrelationId,
    /// Wire bytes, CRLF included.
    pub bytes: Vec<u8>,
}

impl WireTransform {
    /// Creates a transform and the queue its descriptors drain into.
    #[must_use]
    pub fn new(protocol: Protocol) -> (Self, PendingQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                protocol,
                tags: TagGenerator::default(),
                pending: tx,
            },
            PendingQueue { rx },
        )
    }

    /// Protocol this transform speaks.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Serializes a command and records its expected result.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` if the command belongs to the other protocol
    ///   or the correlation id space is exhausted.
    /// - `Error::ConnectionClosed` if the receiver is gone.
    pub fn transform(&self, command: Command) -> Result<Transmit> {
        if command.protocol() != self.protocol {
            warn!(
                expected = %self.protocol,
                command = command.name(),
                "Command issued on a connection of the other protocol"
            );
            return Err(Error::InvalidState(format!(
                "{} command issued on a {} connection",
                command.protocol(),
                self.protocol
            )));
        }

        let correlation_id = self.tags.next()?;
        let bytes = command.serialize(&correlation_id);
        let shape = command.expected_shape();
        trace!(id = %correlation_id, command = command.name(), ?shape, "Serialized command");

        self.pending
            .send(PendingResult {
                correlation_id: correlation_id.clone(),
                command,
                shape,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(Transmit {
            correlation_id,
            bytes,
        })
    }
}

impl PendingQueue {
    /// Takes the oldest pending descriptor, if any.
    pub fn pop(&mut self) -> Option<PendingResult> {
        self.rx.try_recv().ok()
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
    use crate::command::{ImapCommand, ImapShape, Pop3Command};

    #[test]
    fn descriptors_drain_in_issue_order() {
        let (transform, mut queue) = WireTransform::new(Protocol::Imap);
        let first = transform.transform(ImapCommand::Noop.into()).unwrap();
        let second = transform.transform(ImapCommand::Capability.into()).unwrap();

        assert_eq!(first.bytes, b"A0000 NOOP\r\n");
        assert_eq!(second.bytes, b"A0001 CAPABILITY\r\n");

        let a = queue.pop().unwrap();
        let b = queue.pop().unwrap();
        assert_eq!(a.correlation_id, first.correlation_id);
        assert_eq!(b.correlation_id, second.correlation_id);
        assert_eq!(b.shape, ResultShape::Imap(ImapShape::Capabilities));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn other_protocol_is_rejected_without_a_descriptor() {
        let (transform, mut queue) = WireTransform::new(Protocol::Imap);
        let result = transform.transform(Pop3Command::Stat.into());
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn pop3_commands_still_get_ids() {
        let (transform, mut queue) = WireTransform::new(Protocol::Pop3);
        let transmit = transform.transform(Pop3Command::Uidl(None).into()).unwrap();
        assert_eq!(transmit.bytes, b"UIDL\r\n");
        assert_eq!(transmit.correlation_id.as_str(), "A0000");
        assert_eq!(queue.pop().unwrap().correlation_id, transmit.correlation_id);
    }

    #[test]
    fn closed_queue_is_reported() {
        let (transform, queue) = WireTransform::new(Protocol::Pop3);
        drop(queue);
        assert!(matches!(
            transform.transform(Pop3Command::Noop.into()),
            Err(Error::ConnectionClosed)
        ));
    }
}
