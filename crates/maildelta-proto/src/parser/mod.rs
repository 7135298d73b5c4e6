//! Response parsers.
//!
//! One parser instance handles the response to exactly one command. It
//! accumulates bytes until the protocol-specific end marker shows up, then
//! extracts a [`Payload`] shaped after the command.

mod fetch;
mod imap;
pub mod lexer;
mod pop3;

pub use imap::ImapParser;
pub use pop3::{Pop3Parser, Trailer};

use crate::Result;
use crate::command::ResultShape;
use crate::result::Payload;
use crate::types::CorrelationId;

/// Incremental parser for a single command response.
pub trait ResponseParser: Send {
    /// Appends received bytes.
    fn feed(&mut self, bytes: &[u8]);

    /// Returns true once the whole response has arrived.
    ///
    /// Monotonic: once true it stays true regardless of further input.
    fn is_complete(&self) -> bool;

    /// Extracts the payload from a complete response.
    ///
    /// # Errors
    ///
    /// `Error::Protocol` when the server rejected the command and
    /// `Error::Parse` when the response does not match the expected shape.
    /// Either way the caller gets no partial payload.
    fn extract(&self) -> Result<Payload>;

    /// Hands back the bytes received past the end of this response.
    fn leftover(&mut self) -> Leftover;
}

/// Input that arrived after a response was complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leftover {
    /// Bytes belonging to whatever comes next.
    Next(Vec<u8>),
    /// The response completed early by its declared size; `seed` starts the
    /// terminator that is still owed and must be swallowed first.
    Trailer {
        /// Bytes past the counted content.
        seed: Vec<u8>,
        /// Whether the counted content ended with a line break.
        at_line_start: bool,
    },
}

/// Creates the parser for a command's response.
#[must_use]
pub fn parser_for(shape: ResultShape, correlation_id: &CorrelationId) -> Box<dyn ResponseParser> {
    match shape {
        ResultShape::Imap(shape) => Box::new(ImapParser::new(correlation_id.as_str(), shape)),
        ResultShape::Pop3(shape) => Box::new(Pop3Parser::new(shape)),
    }
}

/// Finds the first CRLF in `buf`, returning the index of the CR.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
