//! Receiver: turns the socket's byte stream into published results.
//!
//! The receiver is the only place results are created. Its state is an
//! explicit value: a response in progress owns both its pending descriptor
//! and its parser, so a descriptor can only be taken from the FIFO when the
//! previous response has been published.

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::parser::{Leftover, ResponseParser, Trailer, find_crlf, parser_for};
use crate::result::ParsedResult;
use crate::transform::{PendingQueue, PendingResult};

enum State {
    /// Nothing received yet; the first line is the server greeting.
    AwaitingGreeting(Vec<u8>),
    /// Between responses.
    Idle,
    /// A response is arriving.
    Active {
        pending: PendingResult,
        parser: Box<dyn ResponseParser>,
    },
    /// A POP3 response completed by octet count; its terminator is still due.
    Trailing(Trailer),
}

/// Demultiplexes socket bytes into parsed results.
pub struct Receiver {
    pending: PendingQueue,
    results: mpsc::UnboundedSender<ParsedResult>,
    state: State,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::AwaitingGreeting(_) => "awaiting-greeting",
            State::Idle => "idle",
            State::Active { .. } => "active",
            State::Trailing(_) => "trailing",
        };
        f.debug_struct("Receiver").field("state", &state).finish_non_exhaustive()
    }
}

impl Receiver {
    /// Creates a receiver that expects a greeting first.
    #[must_use]
    pub const fn new(pending: PendingQueue, results: mpsc::UnboundedSender<ParsedResult>) -> Self {
        Self {
            pending,
            results,
            state: State::AwaitingGreeting(Vec::new()),
        }
    }

    /// Processes one chunk of socket input.
    pub fn receive(&mut self, chunk: &[u8]) {
        let mut input = chunk.to_vec();

        while !input.is_empty() {
            match std::mem::replace(&mut self.state, State::Idle) {
                State::AwaitingGreeting(mut buf) => {
                    buf.extend_from_slice(&input);
                    let Some(cr) = find_crlf(&buf) else {
                        self.state = State::AwaitingGreeting(buf);
                        return;
                    };
                    input = buf.split_off(cr + 2);
                    debug!(greeting = %String::from_utf8_lossy(&buf[..cr]), "Server greeting");
                }
                State::Idle => {
                    let Some(pending) = self.pending.pop() else {
                        warn!(bytes = input.len(), "Discarding data with no command outstanding");
                        return;
                    };
                    trace!(id = %pending.correlation_id, "Response started");
                    let parser = parser_for(pending.shape, &pending.correlation_id);
                    self.state = State::Active { pending, parser };
                }
                State::Active {
                    pending,
                    mut parser,
                } => {
                    parser.feed(&input);
                    if !parser.is_complete() {
                        self.state = State::Active { pending, parser };
                        return;
                    }
                    self.publish(complete(pending, parser.as_ref()));
                    match parser.leftover() {
                        Leftover::Next(rest) => input = rest,
                        Leftover::Trailer {
                            seed,
                            at_line_start,
                        } => {
                            input = seed;
                            self.state = State::Trailing(Trailer::new(Vec::new(), at_line_start));
                        }
                    }
                }
                State::Trailing(mut trailer) => match trailer.feed(&input) {
                    Some(rest) => input = rest,
                    None => {
                        self.state = State::Trailing(trailer);
                        return;
                    }
                },
            }
        }
    }

    /// Fails the response in progress and every queued descriptor.
    ///
    /// Called once the socket is gone, so no caller waits forever.
    pub fn fail_outstanding(&mut self) {
        if let State::Active { pending, .. } = std::mem::replace(&mut self.state, State::Idle) {
            warn!(id = %pending.correlation_id, command = pending.command.name(), "Connection lost mid-response");
            self.publish(ParsedResult::failure(pending.correlation_id, pending.command));
        }
        while let Some(pending) = self.pending.pop() {
            self.publish(ParsedResult::failure(pending.correlation_id, pending.command));
        }
    }

    fn publish(&self, result: ParsedResult) {
        if self.results.send(result).is_err() {
            debug!("Result dropped: command handler is gone");
        }
    }
}

fn complete(pending: PendingResult, parser: &dyn ResponseParser) -> ParsedResult {
    match parser.extract() {
        Ok(payload) => {
            debug!(id = %pending.correlation_id, command = pending.command.name(), "Command completed");
            ParsedResult::success(pending.correlation_id, pending.command, payload)
        }
        Err(e) => {
            warn!(
                id = %pending.correlation_id,
                command = pending.command.name(),
                error = %e,
                "Command failed"
            );
            ParsedResult::failure(pending.correlation_id, pending.command)
        }
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
    use crate::result::Payload;
    use crate::transform::WireTransform;
    use crate::types::Protocol;

    fn setup(
        protocol: Protocol,
    ) -> (WireTransform, Receiver, mpsc::UnboundedReceiver<ParsedResult>) {
        let (transform, queue) = WireTransform::new(protocol);
        let (tx, rx) = mpsc::unbounded_channel();
        (transform, Receiver::new(queue, tx), rx)
    }

    #[test]
    fn greeting_is_skipped_and_rest_of_chunk_processed() {
        let (transform, mut receiver, mut results) = setup(Protocol::Pop3);
        transform.transform(Pop3Command::User("u".into()).into()).unwrap();
        receiver.receive(b"+OK POP3 ready\r\n+OK user accepted\r\n");

        let result = results.try_recv().unwrap();
        assert!(!result.error);
        assert_eq!(result.payload, Some(Payload::Ack("user accepted".into())));
    }

    #[test]
    fn greeting_may_arrive_in_pieces() {
        let (transform, mut receiver, mut results) = setup(Protocol::Imap);
        transform.transform(ImapCommand::Noop.into()).unwrap();
        receiver.receive(b"* OK IMAP4rev1 ");
        receiver.receive(b"ready\r\n");
        assert!(results.try_recv().is_err());
        receiver.receive(b"A0000 OK NOOP done\r\n");
        assert_eq!(results.try_recv().unwrap().correlation_id.as_str(), "A0000");
    }

    #[test]
    fn results_follow_issue_order() {
        let (transform, mut receiver, mut results) = setup(Protocol::Imap);
        receiver.receive(b"* OK ready\r\n");
        for _ in 0..3 {
            transform.transform(ImapCommand::Noop.into()).unwrap();
        }
        receiver.receive(b"A0000 OK a\r\nA0001 NO b\r\nA0002 OK c\r\n");

        let ids: Vec<_> = std::iter::from_fn(|| results.try_recv().ok())
            .map(|r| (r.correlation_id.0, r.error))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("A0000".to_string(), false),
                ("A0001".to_string(), true),
                ("A0002".to_string(), false),
            ]
        );
    }

    #[test]
    fn octet_completion_swallows_late_terminator() {
        let (transform, mut receiver, mut results) = setup(Protocol::Pop3);
        receiver.receive(b"+OK\r\n");
        transform.transform(Pop3Command::Retr(1).into()).unwrap();
        transform.transform(Pop3Command::Noop.into()).unwrap();

        receiver.receive(b"+OK 4 octets\r\nabcd");
        let retr = results.try_recv().unwrap();
        assert_eq!(retr.payload, Some(Payload::Content(b"abcd".to_vec())));

        receiver.receive(b"\r\n.\r\n+OK noop\r\n");
        let noop = results.try_recv().unwrap();
        assert_eq!(noop.correlation_id.as_str(), "A0001");
        assert_eq!(noop.payload, Some(Payload::Ack("noop".into())));
    }

    #[test]
    fn missing_terminator_does_not_swallow_next_response() {
        let (transform, mut receiver, mut results) = setup(Protocol::Pop3);
        receiver.receive(b"+OK\r\n");
        transform.transform(Pop3Command::Retr(1).into()).unwrap();
        transform.transform(Pop3Command::Noop.into()).unwrap();

        receiver.receive(b"+OK 6 octets\r\nabcd\r\n");
        let retr = results.try_recv().unwrap();
        assert_eq!(retr.payload, Some(Payload::Content(b"abcd\r\n".to_vec())));

        receiver.receive(b"+OK noop\r\n");
        let noop = results.try_recv().unwrap();
        assert_eq!(noop.correlation_id.as_str(), "A0001");
        assert!(!noop.error);
        assert_eq!(noop.payload, Some(Payload::Ack("noop".into())));
    }

    #[test]
    fn trailer_and_next_response_in_one_chunk() {
        let (transform, mut receiver, mut results) = setup(Protocol::Pop3);
        receiver.receive(b"+OK\r\n");
        transform.transform(Pop3Command::Retr(1).into()).unwrap();
        transform.transform(Pop3Command::Noop.into()).unwrap();

        receiver.receive(b"+OK 2 octets\r\nab-ERR busy\r\n");
        assert!(!results.try_recv().unwrap().error);
        // "-ERR" mid-line is not a status line, so NOOP is still waiting
        assert!(results.try_recv().is_err());
        receiver.receive(b"\r\n.\r\n-ERR busy\r\n");
        let noop = results.try_recv().unwrap();
        assert_eq!(noop.correlation_id.as_str(), "A0001");
        assert!(noop.error);
    }

    #[test]
    fn unsolicited_data_is_dropped() {
        let (_transform, mut receiver, mut results) = setup(Protocol::Imap);
        receiver.receive(b"* OK ready\r\n* BYE shutting down\r\n");
        assert!(results.try_recv().is_err());
    }

    #[test]
    fn lost_connection_fails_everything_outstanding() {
        let (transform, mut receiver, mut results) = setup(Protocol::Imap);
        receiver.receive(b"* OK ready\r\n");
        transform.transform(ImapCommand::Noop.into()).unwrap();
        transform.transform(ImapCommand::Capability.into()).unwrap();
        receiver.receive(b"* 1 EXISTS\r\n");
        receiver.fail_outstanding();

        let first = results.try_recv().unwrap();
        let second = results.try_recv().unwrap();
        assert!(first.error && second.error);
        assert_eq!(first.correlation_id.as_str(), "A0000");
        assert_eq!(second.correlation_id.as_str(), "A0001");
    }
}
