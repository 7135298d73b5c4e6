//! POP3 response parser.
//!
//! Every response opens with a `+OK` or `-ERR` status line. Single-line
//! commands end there. Multi-line commands continue with dot-stuffed lines
//! up to a line holding only `.`. For RETR/TOP the status line usually
//! declares the size in octets; once that many content bytes are in, the
//! response counts as complete even if the terminator has not arrived.

use crate::command::Pop3Shape;
use crate::result::{MaildropStat, Payload, ScanEntry, UidlEntry};
use crate::{Error, Result};

use super::{Leftover, ResponseParser, find_crlf};

const TERMINATOR: &[u8] = b"\r\n.\r\n";

/// Parser for one POP3 response.
#[derive(Debug)]
pub struct Pop3Parser {
    shape: Pop3Shape,
    buf: Vec<u8>,
    body_start: Option<usize>,
    ok: bool,
    declared_octets: Option<usize>,
    scanned: usize,
    end: Option<End>,
}

#[derive(Debug, Clone, Copy)]
enum End {
    /// Response ended at a status line or terminator; `content_end` is where
    /// the multi-line body stops, `consumed` where the next response starts.
    Marker { content_end: usize, consumed: usize },
    /// Response ended by octet count; `raw_end` is where the counted content
    /// stops in the raw buffer.
    Octets { raw_end: usize },
}

impl Pop3Parser {
    /// Creates a parser for a response of the given shape.
    #[must_use]
    pub const fn new(shape: Pop3Shape) -> Self {
        Self {
            shape,
            buf: Vec::new(),
            body_start: None,
            ok: false,
            declared_octets: None,
            scanned: 0,
            end: None,
        }
    }

    fn advance(&mut self) {
        if self.end.is_some() {
            return;
        }

        let body_start = match self.body_start {
            Some(start) => start,
            None => {
                let Some(cr) = find_crlf(&self.buf) else {
                    return;
                };
                let start = cr + 2;
                self.body_start = Some(start);
                self.ok = self.buf.starts_with(b"+OK");
                if !self.ok || !self.shape.is_multiline() {
                    self.end = Some(End::Marker {
                        content_end: start,
                        consumed: start,
                    });
                    return;
                }
                if self.shape == Pop3Shape::Content {
                    self.declared_octets = declared_octets(&self.buf[..cr]);
                }
                self.scanned = start;
                start
            }
        };

        if self.buf[body_start..].starts_with(b".\r\n") {
            self.end = Some(End::Marker {
                content_end: body_start,
                consumed: body_start + 3,
            });
            return;
        }

        let from = self.scanned.max(body_start);
        if let Some(pos) = self.buf[from..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
        {
            let at = from + pos;
            self.end = Some(End::Marker {
                content_end: at + 2,
                consumed: at + TERMINATOR.len(),
            });
            return;
        }
        self.scanned = self.buf.len().saturating_sub(TERMINATOR.len() - 1).max(body_start);

        if let Some(octets) = self.declared_octets
            && self.buf.len() - body_start >= octets
            && let Some((_, raw_len)) = unstuff_prefix(&self.buf[body_start..], octets)
        {
            self.end = Some(End::Octets {
                raw_end: body_start + raw_len,
            });
        }
    }

    fn status_text(&self) -> String {
        let line = self
            .body_start
            .map_or(&self.buf[..], |start| &self.buf[..start - 2]);
        let line = String::from_utf8_lossy(line);
        let rest = line
            .strip_prefix("+OK")
            .or_else(|| line.strip_prefix("-ERR"))
            .unwrap_or(&line);
        rest.trim().to_string()
    }

    fn body(&self) -> Vec<u8> {
        let start = self.body_start.unwrap_or(self.buf.len());
        match self.end {
            Some(End::Marker { content_end, .. }) => unstuff(&self.buf[start..content_end]),
            Some(End::Octets { raw_end }) => unstuff(&self.buf[start..raw_end]),
            None => Vec::new(),
        }
    }

    fn body_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.body())
            .split("\r\n")
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl ResponseParser for Pop3Parser {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.advance();
    }

    fn is_complete(&self) -> bool {
        self.end.is_some()
    }

    fn extract(&self) -> Result<Payload> {
        if self.end.is_none() {
            return Err(Error::InvalidState("response is not complete".to_string()));
        }
        let text = self.status_text();
        if !self.ok {
            return Err(Error::Protocol(format!("-ERR {text}")));
        }

        match self.shape {
            Pop3Shape::Status => Ok(Payload::Ack(text)),
            Pop3Shape::Stat => {
                let (count, size) = parse_pair(&text)?;
                Ok(Payload::Stat(MaildropStat {
                    count,
                    size: size.parse().map_err(|_| bad_line(&text))?,
                }))
            }
            Pop3Shape::Scan => Ok(Payload::Scan(vec![parse_scan(&text)?])),
            Pop3Shape::ScanListing => self
                .body_lines()
                .iter()
                .map(|line| parse_scan(line))
                .collect::<Result<Vec<_>>>()
                .map(Payload::Scan),
            Pop3Shape::Uid => Ok(Payload::UidListing(vec![parse_uidl(&text)?])),
            Pop3Shape::UidListing => self
                .body_lines()
                .iter()
                .map(|line| parse_uidl(line))
                .collect::<Result<Vec<_>>>()
                .map(Payload::UidListing),
            Pop3Shape::Content => Ok(Payload::Content(self.body())),
            Pop3Shape::Capabilities => Ok(Payload::Capabilities(self.body_lines())),
        }
    }

    fn leftover(&mut self) -> Leftover {
        match self.end {
            Some(End::Marker { consumed, .. }) => Leftover::Next(self.buf.split_off(consumed)),
            Some(End::Octets { raw_end }) => {
                let at_line_start = raw_end == 0 || self.buf[raw_end - 1] == b'\n';
                Leftover::Trailer {
                    seed: self.buf.split_off(raw_end),
                    at_line_start,
                }
            }
            None => Leftover::Next(Vec::new()),
        }
    }
}

/// Swallows the terminator still owed by a response that completed by
/// octet count.
///
/// A line opening with `+OK` or `-ERR` before any terminator is the next
/// response; swallowing stops there and the terminator is given up on.
#[derive(Debug, Default)]
pub struct Trailer {
    buf: Vec<u8>,
    at_line_start: bool,
}

impl Trailer {
    /// Starts from bytes already received past the counted content.
    ///
    /// `at_line_start` tells whether the counted content ended with a line
    /// break.
    #[must_use]
    pub const fn new(seed: Vec<u8>, at_line_start: bool) -> Self {
        Self {
            buf: seed,
            at_line_start,
        }
    }

    /// Feeds bytes; returns whatever follows the terminator line, or the
    /// next status line if that shows up first.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut line_start = self.at_line_start;
        for i in 0..self.buf.len() {
            if line_start {
                let line = &self.buf[i..];
                if line.starts_with(b".\r\n") {
                    return Some(self.buf.split_off(i + 3));
                }
                if line.starts_with(b"+OK") || line.starts_with(b"-ERR") {
                    return Some(self.buf.split_off(i));
                }
            }
            line_start = self.buf[i] == b'\n';
        }
        None
    }
}

/// Size from a status line such as `+OK 120 octets`.
fn declared_octets(status_line: &[u8]) -> Option<usize> {
    let line = std::str::from_utf8(status_line).ok()?;
    line.strip_prefix("+OK")?
        .split_ascii_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Removes the stuffed leading dot of each line.
fn unstuff(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut line_start = true;
    for &b in raw {
        if !(line_start && b == b'.') {
            out.push(b);
        }
        line_start = b == b'\n';
    }
    out
}

/// Unstuffs raw bytes until `len` content bytes are produced.
///
/// Returns the content and how many raw bytes it took, or `None` if the raw
/// input runs out first.
fn unstuff_prefix(raw: &[u8], len: usize) -> Option<(Vec<u8>, usize)> {
    let mut out = Vec::with_capacity(len);
    let mut line_start = true;
    for (i, &b) in raw.iter().enumerate() {
        if out.len() == len {
            return Some((out, i));
        }
        if !(line_start && b == b'.') {
            out.push(b);
        }
        line_start = b == b'\n';
    }
    (out.len() == len).then_some((out, raw.len()))
}

fn bad_line(line: &str) -> Error {
    Error::parse(format!("malformed POP3 line: {line}"))
}

fn parse_pair(line: &str) -> Result<(u32, &str)> {
    let mut parts = line.split_ascii_whitespace();
    let seq = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad_line(line))?;
    let value = parts.next().ok_or_else(|| bad_line(line))?;
    Ok((seq, value))
}

fn parse_scan(line: &str) -> Result<ScanEntry> {
    let (seq, size) = parse_pair(line)?;
    Ok(ScanEntry {
        seq,
        size: size.parse().map_err(|_| bad_line(line))?,
    })
}

fn parse_uidl(line: &str) -> Result<UidlEntry> {
    let (seq, uid) = parse_pair(line)?;
    Ok(UidlEntry {
        seq,
        uid: uid.to_string(),
    })
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
    use proptest::prelude::*;

    use super::*;

    fn parsed(shape: Pop3Shape, response: &[u8]) -> Pop3Parser {
        let mut parser = Pop3Parser::new(shape);
        parser.feed(response);
        parser
    }

    #[test]
    fn single_line_completes_on_first_crlf() {
        let mut parser = Pop3Parser::new(Pop3Shape::Status);
        parser.feed(b"+OK user ok");
        assert!(!parser.is_complete());
        parser.feed(b"\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.extract().unwrap(), Payload::Ack("user ok".to_string()));
    }

    #[test]
    fn err_completes_a_multiline_command() {
        let parser = parsed(Pop3Shape::UidListing, b"-ERR no such message\r\n");
        assert!(parser.is_complete());
        assert!(matches!(parser.extract(), Err(Error::Protocol(_))));
    }

    #[test]
    fn uidl_listing() {
        let parser = parsed(
            Pop3Shape::UidListing,
            b"+OK\r\n1 a\r\n2 b\r\n3 c\r\n.\r\n",
        );
        assert_eq!(
            parser.extract().unwrap(),
            Payload::UidListing(vec![
                UidlEntry { seq: 1, uid: "a".into() },
                UidlEntry { seq: 2, uid: "b".into() },
                UidlEntry { seq: 3, uid: "c".into() },
            ])
        );
    }

    #[test]
    fn empty_listing() {
        let parser = parsed(Pop3Shape::ScanListing, b"+OK 0 messages\r\n.\r\n");
        assert_eq!(parser.extract().unwrap(), Payload::Scan(Vec::new()));
    }

    #[test]
    fn stat_and_single_uidl() {
        let stat = parsed(Pop3Shape::Stat, b"+OK 2 320\r\n");
        assert_eq!(
            stat.extract().unwrap(),
            Payload::Stat(MaildropStat { count: 2, size: 320 })
        );
        let uid = parsed(Pop3Shape::Uid, b"+OK 2 QhdPYR:00WBw1Ph7x7\r\n");
        assert_eq!(
            uid.extract().unwrap(),
            Payload::UidListing(vec![UidlEntry { seq: 2, uid: "QhdPYR:00WBw1Ph7x7".into() }])
        );
    }

    #[test]
    fn malformed_listing_is_a_parse_error() {
        let parser = parsed(Pop3Shape::UidListing, b"+OK\r\nx a\r\n.\r\n");
        assert!(matches!(parser.extract(), Err(Error::Parse { .. })));
    }

    #[test]
    fn content_is_unstuffed() {
        let parser = parsed(
            Pop3Shape::Content,
            b"+OK message follows\r\nSubject: x\r\n\r\n..hidden\r\nbody\r\n.\r\n",
        );
        assert_eq!(
            parser.extract().unwrap(),
            Payload::Content(b"Subject: x\r\n\r\n.hidden\r\nbody\r\n".to_vec())
        );
    }

    #[test]
    fn terminator_split_across_chunks() {
        let mut parser = Pop3Parser::new(Pop3Shape::Content);
        parser.feed(b"+OK\r\nline\r\n.");
        assert!(!parser.is_complete());
        parser.feed(b"\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.extract().unwrap(), Payload::Content(b"line\r\n".to_vec()));
    }

    #[test]
    fn declared_octets_complete_early() {
        let mut parser = Pop3Parser::new(Pop3Shape::Content);
        parser.feed(b"+OK 6 octets\r\nline\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.extract().unwrap(), Payload::Content(b"line\r\n".to_vec()));
        assert_eq!(
            parser.leftover(),
            Leftover::Trailer {
                seed: Vec::new(),
                at_line_start: true
            }
        );
    }

    #[test]
    fn trailer_swallows_terminator_and_returns_rest() {
        let mut trailer = Trailer::new(b"\r".to_vec(), false);
        assert_eq!(trailer.feed(b"\n."), None);
        assert_eq!(trailer.feed(b"\r\n+OK next\r\n"), Some(b"+OK next\r\n".to_vec()));

        let mut trailer = Trailer::new(Vec::new(), true);
        assert_eq!(trailer.feed(b".\r\n"), Some(Vec::new()));
    }

    #[test]
    fn trailer_gives_up_at_next_status_line() {
        let mut trailer = Trailer::new(Vec::new(), true);
        assert_eq!(trailer.feed(b"+O"), None);
        assert_eq!(trailer.feed(b"K noop\r\n"), Some(b"+OK noop\r\n".to_vec()));

        let mut trailer = Trailer::new(b"junk".to_vec(), false);
        assert_eq!(trailer.feed(b"\r\n-ERR nope\r\n"), Some(b"-ERR nope\r\n".to_vec()));

        // a status marker in the middle of a line is not a line start
        let mut trailer = Trailer::new(Vec::new(), false);
        assert_eq!(trailer.feed(b"x+OK"), None);
    }

    #[test]
    fn leftover_after_terminator() {
        let mut parser = parsed(Pop3Shape::Capabilities, b"+OK\r\nTOP\r\nUIDL\r\n.\r\n+OK");
        assert_eq!(
            parser.extract().unwrap(),
            Payload::Capabilities(vec!["TOP".into(), "UIDL".into()])
        );
        assert_eq!(parser.leftover(), Leftover::Next(b"+OK".to_vec()));
    }

    proptest! {
        #[test]
        fn completion_is_monotonic(
            lines in prop::collection::vec("[a-z.]{0,12}", 0..8),
            cuts in prop::collection::vec(1usize..10, 0..12),
        ) {
            let mut response = b"+OK\r\n".to_vec();
            for line in &lines {
                if line.starts_with('.') {
                    response.push(b'.');
                }
                response.extend_from_slice(line.as_bytes());
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b".\r\n");

            let mut parser = Pop3Parser::new(Pop3Shape::Content);
            let mut fed = 0;
            for cut in cuts {
                let end = (fed + cut).min(response.len());
                parser.feed(&response[fed..end]);
                fed = end;
                prop_assert_eq!(parser.is_complete(), fed == response.len());
            }
            parser.feed(&response[fed..]);
            prop_assert!(parser.is_complete());
            parser.feed(b"\r\n.\r\n");
            prop_assert!(parser.is_complete());

            let mut expected = Vec::new();
            for line in &lines {
                expected.extend_from_slice(line.as_bytes());
                expected.extend_from_slice(b"\r\n");
            }
            prop_assert_eq!(parser.extract().unwrap(), Payload::Content(expected));
        }
    }
}
