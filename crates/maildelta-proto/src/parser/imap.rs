//! IMAP response parser.
//!
//! The response is split into units: one line each, where a line ending in a
//! `{n}` literal marker continues past the literal's `n` bytes. The response
//! is complete at the first unit that starts with the command's tag followed
//! by `OK`, `NO` or `BAD`.

use std::ops::Range;

use crate::command::{ImapShape, Peek};
use crate::result::Payload;
use crate::types::{ListEntry, Mailbox, MailboxAttribute, MailboxStatus, Status, Uid, UidValidity};
use crate::{Error, Result};

use super::lexer::{Lexer, Token};
use super::{Leftover, ResponseParser, fetch, find_crlf};

/// Parser for one tagged IMAP response.
#[derive(Debug)]
pub struct ImapParser {
    tag: String,
    shape: ImapShape,
    buf: Vec<u8>,
    scanned: usize,
    untagged: Vec<Range<usize>>,
    completion: Option<(Status, Range<usize>)>,
}

impl ImapParser {
    /// Creates a parser waiting for `tag`'s completion.
    #[must_use]
    pub fn new(tag: impl Into<String>, shape: ImapShape) -> Self {
        Self {
            tag: tag.into(),
            shape,
            buf: Vec::new(),
            scanned: 0,
            untagged: Vec::new(),
            completion: None,
        }
    }

    fn scan(&mut self) {
        while self.completion.is_none() {
            let Some(end) = unit_end(&self.buf, self.scanned) else {
                break;
            };
            let range = self.scanned..end;
            self.scanned = end;
            match tagged_status(&self.buf[range.clone()], &self.tag) {
                Some(status) => self.completion = Some((status, range)),
                None => self.untagged.push(range),
            }
        }
    }

    fn units(&self) -> impl Iterator<Item = &[u8]> {
        self.untagged.iter().map(|range| &self.buf[range.clone()])
    }

    /// Untagged units as text, first line only, `* ` prefix removed.
    fn untagged_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.units().filter_map(|unit| {
            let line = first_line(unit);
            line.strip_prefix(b"* ")
                .map(|rest| String::from_utf8_lossy(rest).into_owned())
        })
    }

    fn extract_capabilities(&self) -> Result<Payload> {
        let caps: Vec<String> = self
            .untagged_lines()
            .filter_map(|line| {
                let (word, rest) = split_word(&line);
                word.eq_ignore_ascii_case("CAPABILITY")
                    .then(|| rest.split_ascii_whitespace().map(str::to_string).collect::<Vec<_>>())
            })
            .flatten()
            .collect();
        if caps.is_empty() {
            return Err(Error::parse("no CAPABILITY data in response"));
        }
        Ok(Payload::Capabilities(caps))
    }

    fn extract_search(&self) -> Result<Payload> {
        let mut found = false;
        let mut matches = Vec::new();
        for line in self.untagged_lines() {
            let (word, rest) = split_word(&line);
            if !word.eq_ignore_ascii_case("SEARCH") {
                continue;
            }
            found = true;
            for token in rest.split_ascii_whitespace() {
                let n = token
                    .parse::<u32>()
                    .map_err(|_| Error::parse(format!("non-numeric SEARCH result: {token}")))?;
                matches.push(n);
            }
        }
        if !found {
            return Err(Error::parse("no SEARCH data in response"));
        }
        Ok(Payload::SearchMatches(matches))
    }

    fn extract_selection(&self, tagged_text: &str) -> Result<Payload> {
        let mut status = MailboxStatus::default();
        let mut exists = None;
        let mut recent = None;

        for unit in self.units() {
            let Some(rest) = first_line(unit).strip_prefix(b"* ") else {
                continue;
            };
            let line = String::from_utf8_lossy(rest);
            let (word, tail) = split_word(&line);

            if let Ok(n) = word.parse::<u32>() {
                if tail.eq_ignore_ascii_case("EXISTS") {
                    exists = Some(n);
                } else if tail.eq_ignore_ascii_case("RECENT") {
                    recent = Some(n);
                }
            } else if word.eq_ignore_ascii_case("FLAGS") {
                let mut lexer = Lexer::new(tail.as_bytes());
                status.flags = lexer.read_flag_list()?;
            } else if word.eq_ignore_ascii_case("OK") {
                apply_response_code(&mut status, tail)?;
            }
        }

        status.read_only = response_code(tagged_text)
            .is_some_and(|(code, _)| code.eq_ignore_ascii_case("READ-ONLY"));

        match (exists, recent) {
            (Some(exists), Some(recent)) => {
                status.exists = exists;
                status.recent = recent;
                Ok(Payload::Selection(status))
            }
            _ => Err(Error::parse("SELECT response lacks EXISTS or RECENT")),
        }
    }

    fn extract_mailboxes(&self) -> Result<Payload> {
        let mut entries = Vec::new();
        for unit in self.units() {
            if let Some(entry) = parse_list_unit(unit)? {
                entries.push(entry);
            }
        }
        Ok(Payload::Mailboxes(entries))
    }

    fn extract_fetch(&self, peek: Peek) -> Result<Payload> {
        let mut entries = Vec::new();
        for unit in self.units() {
            if let Some(entry) = fetch::parse_fetch_unit(unit, peek)? {
                entries.push(entry);
            }
        }
        Ok(Payload::Fetch(entries))
    }
}

impl ResponseParser for ImapParser {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.scan();
    }

    fn is_complete(&self) -> bool {
        self.completion.is_some()
    }

    fn extract(&self) -> Result<Payload> {
        let Some((status, range)) = &self.completion else {
            return Err(Error::InvalidState("response is not complete".to_string()));
        };
        let line = String::from_utf8_lossy(first_line(&self.buf[range.clone()])).into_owned();
        let text = line
            .get(self.tag.len()..)
            .map(str::trim_start)
            .map(|rest| split_word(rest).1.to_string())
            .unwrap_or_default();

        if !status.is_ok() {
            return Err(Error::Protocol(format!("{status:?}: {text}")));
        }

        match self.shape {
            ImapShape::Status => Ok(Payload::Ack(text)),
            ImapShape::Capabilities => self.extract_capabilities(),
            ImapShape::Mailboxes => self.extract_mailboxes(),
            ImapShape::Selection => self.extract_selection(&text),
            ImapShape::Search => self.extract_search(),
            ImapShape::Fetch(peek) => self.extract_fetch(peek),
        }
    }

    fn leftover(&mut self) -> Leftover {
        let end = self
            .completion
            .as_ref()
            .map_or(self.buf.len(), |(_, range)| range.end);
        Leftover::Next(self.buf.split_off(end))
    }
}

/// End offset (past the CRLF) of the unit starting at `start`, if it has
/// fully arrived.
pub(crate) fn unit_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    loop {
        let cr = pos + find_crlf(buf.get(pos..)?)?;
        match literal_len(&buf[pos..cr]) {
            Some(len) => {
                pos = cr + 2 + len;
                if pos > buf.len() {
                    return None;
                }
            }
            None => return Some(cr + 2),
        }
    }
}

/// Size announced by a trailing `{n}` or `{n+}` literal marker.
fn literal_len(line: &[u8]) -> Option<usize> {
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn tagged_status(unit: &[u8], tag: &str) -> Option<Status> {
    let rest = unit.strip_prefix(tag.as_bytes())?.strip_prefix(b" ")?;
    let word_len = rest
        .iter()
        .position(|&b| b == b' ' || b == b'\r')
        .unwrap_or(rest.len());
    Status::parse_imap(std::str::from_utf8(&rest[..word_len]).ok()?)
}

fn first_line(unit: &[u8]) -> &[u8] {
    find_crlf(unit).map_or(unit, |cr| &unit[..cr])
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (s.trim(), ""),
    }
}

/// Splits `[CODE args] text` into `CODE` and `args`.
fn response_code(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix('[')?;
    let inner = &inner[..inner.find(']')?];
    Some(split_word(inner))
}

fn apply_response_code(status: &mut MailboxStatus, text: &str) -> Result<()> {
    let Some((code, args)) = response_code(text) else {
        return Ok(());
    };
    match code.to_ascii_uppercase().as_str() {
        "PERMANENTFLAGS" => {
            let mut lexer = Lexer::new(args.as_bytes());
            status.permanent_flags = lexer.read_flag_list()?;
        }
        "UIDVALIDITY" => {
            status.uid_validity = args.parse().ok().and_then(UidValidity::new);
        }
        "UIDNEXT" => {
            status.uid_next = args.parse().ok().and_then(Uid::new);
        }
        _ => {}
    }
    Ok(())
}

fn parse_list_unit(unit: &[u8]) -> Result<Option<ListEntry>> {
    let mut lexer = Lexer::new(unit);
    if lexer.next_token()? != Token::Asterisk {
        return Ok(None);
    }
    lexer.expect_space()?;
    match lexer.next_token()? {
        Token::Atom(word) if word.eq_ignore_ascii_case("LIST") => {}
        _ => return Ok(None),
    }
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(attr) => attributes.push(MailboxAttribute::parse(attr)),
            token => return Err(lexer.error(&format!("Unexpected token in LIST attributes: {token:?}"))),
        }
    }
    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::QuotedString(s) => s.chars().next(),
        Token::Nil => None,
        token => return Err(lexer.error(&format!("Expected LIST delimiter, got {token:?}"))),
    };
    lexer.expect_space()?;
    let name = lexer.read_astring()?;

    Ok(Some(ListEntry {
        attributes,
        delimiter,
        mailbox: Mailbox::new(name),
    }))
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
    use crate::result::FetchData;
    use crate::types::Flag;

    fn parse(tag: &str, shape: ImapShape, response: &[u8]) -> ImapParser {
        let mut parser = ImapParser::new(tag, shape);
        parser.feed(response);
        parser
    }

    #[test]
    fn completes_on_tagged_line_only() {
        let mut parser = ImapParser::new("A0001", ImapShape::Status);
        parser.feed(b"* 3 EXISTS\r\n");
        assert!(!parser.is_complete());
        parser.feed(b"A0001 OK NOOP");
        assert!(!parser.is_complete());
        parser.feed(b" completed\r\n");
        assert!(parser.is_complete());
        assert_eq!(parser.extract().unwrap(), Payload::Ack("NOOP completed".to_string()));
    }

    #[test]
    fn other_tags_do_not_complete() {
        let parser = parse("A0002", ImapShape::Status, b"A0001 OK stale\r\n");
        assert!(!parser.is_complete());
    }

    #[test]
    fn tagged_text_inside_literal_is_ignored() {
        let mut parser = ImapParser::new("A0003", ImapShape::Fetch(Peek::Full));
        parser.feed(b"* 1 FETCH (UID 9 BODY[] {17}\r\nA0003 OK fake\r\n\r\n");
        assert!(!parser.is_complete());
        parser.feed(b")\r\nA0003 OK done\r\n");
        assert!(parser.is_complete());
        match parser.extract().unwrap() {
            Payload::Fetch(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].data, FetchData::Message(b"A0003 OK fake\r\n\r\n".to_vec()));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn rejection_is_a_protocol_error() {
        let parser = parse("A0004", ImapShape::Selection, b"A0004 NO [NONEXISTENT] no such mailbox\r\n");
        assert!(parser.is_complete());
        assert!(matches!(parser.extract(), Err(Error::Protocol(_))));

        let parser = parse("A0005", ImapShape::Search, b"A0005 BAD syntax\r\n");
        assert!(matches!(parser.extract(), Err(Error::Protocol(_))));
    }

    #[test]
    fn search_numbers() {
        let parser = parse(
            "A0006",
            ImapShape::Search,
            b"* SEARCH 100 102\r\nA0006 OK SEARCH completed\r\n",
        );
        assert_eq!(parser.extract().unwrap(), Payload::SearchMatches(vec![100, 102]));

        let empty = parse("A0007", ImapShape::Search, b"* SEARCH\r\nA0007 OK done\r\n");
        assert_eq!(empty.extract().unwrap(), Payload::SearchMatches(Vec::new()));
    }

    #[test]
    fn search_garbage_is_a_parse_error() {
        let parser = parse("A0008", ImapShape::Search, b"* SEARCH 1 two\r\nA0008 OK done\r\n");
        assert!(matches!(parser.extract(), Err(Error::Parse { .. })));

        let missing = parse("A0009", ImapShape::Search, b"A0009 OK done\r\n");
        assert!(matches!(missing.extract(), Err(Error::Parse { .. })));
    }

    #[test]
    fn selection_metadata() {
        let response = b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n\
* 172 EXISTS\r\n\
* 1 RECENT\r\n\
* OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
* OK [UIDNEXT 4392] Predicted next UID\r\n\
A0010 OK [READ-WRITE] SELECT completed\r\n";
        let parser = parse("A0010", ImapShape::Selection, response);
        let Payload::Selection(status) = parser.extract().unwrap() else {
            panic!("expected selection");
        };
        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.flags.len(), 5);
        assert!(status.permanent_flags.contains(&Flag::Wildcard));
        assert_eq!(status.uid_validity.unwrap().get(), 3857529045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert!(!status.read_only);
    }

    #[test]
    fn selection_without_counts_is_a_parse_error() {
        let parser = parse("A0011", ImapShape::Selection, b"* 3 EXISTS\r\nA0011 OK done\r\n");
        assert!(matches!(parser.extract(), Err(Error::Parse { .. })));
    }

    #[test]
    fn examine_is_read_only() {
        let parser = parse(
            "A0012",
            ImapShape::Selection,
            b"* 0 EXISTS\r\n* 0 RECENT\r\nA0012 OK [READ-ONLY] EXAMINE completed\r\n",
        );
        let Payload::Selection(status) = parser.extract().unwrap() else {
            panic!("expected selection");
        };
        assert!(status.read_only);
    }

    #[test]
    fn list_entries() {
        let response = b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
* LIST (\\All \\HasNoChildren) \"/\" \"[Gmail]/All Mail\"\r\n\
* LIST (\\Noselect) NIL {7}\r\nArchive\r\n\
A0013 OK LIST completed\r\n";
        let parser = parse("A0013", ImapShape::Mailboxes, response);
        let Payload::Mailboxes(entries) = parser.extract().unwrap() else {
            panic!("expected mailboxes");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].mailbox.as_str(), "INBOX");
        assert_eq!(entries[1].mailbox.as_str(), "[Gmail]/All Mail");
        assert!(entries[1].has_attribute(&MailboxAttribute::All));
        assert_eq!(entries[1].delimiter, Some('/'));
        assert_eq!(entries[2].delimiter, None);
        assert_eq!(entries[2].mailbox.as_str(), "Archive");
    }

    #[test]
    fn capabilities() {
        let parser = parse(
            "A0014",
            ImapShape::Capabilities,
            b"* CAPABILITY IMAP4rev1 IDLE UIDPLUS\r\nA0014 OK done\r\n",
        );
        assert_eq!(
            parser.extract().unwrap(),
            Payload::Capabilities(vec!["IMAP4rev1".into(), "IDLE".into(), "UIDPLUS".into()])
        );
    }

    #[test]
    fn leftover_is_what_follows_the_tagged_line() {
        let mut parser = parse("A0015", ImapShape::Status, b"A0015 OK done\r\n* 4 EXISTS\r\n");
        assert_eq!(parser.leftover(), Leftover::Next(b"* 4 EXISTS\r\n".to_vec()));
    }

    #[test]
    fn literal_markers() {
        assert_eq!(literal_len(b"* 1 FETCH (BODY[] {42}"), Some(42));
        assert_eq!(literal_len(b"A1 APPEND x {5+}"), Some(5));
        assert_eq!(literal_len(b"* OK {}"), None);
        assert_eq!(literal_len(b"* OK done"), None);
    }

    fn response_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
        let body = prop::collection::vec(any::<u8>(), 0..64);
        (body, prop::collection::vec(1usize..16, 0..8)).prop_map(|(body, cuts)| {
            let mut response = format!("* 1 FETCH (UID 5 BODY[] {{{}}}\r\n", body.len()).into_bytes();
            response.extend_from_slice(&body);
            response.extend_from_slice(b")\r\nA0100 OK FETCH completed\r\n");
            (response, cuts)
        })
    }

    proptest! {
        #[test]
        fn completion_is_monotonic((response, cuts) in response_strategy()) {
            let mut parser = ImapParser::new("A0100", ImapShape::Fetch(Peek::Full));
            let mut fed = 0;
            for cut in cuts {
                let end = (fed + cut).min(response.len());
                parser.feed(&response[fed..end]);
                fed = end;
                prop_assert_eq!(parser.is_complete(), fed == response.len());
            }
            parser.feed(&response[fed..]);
            prop_assert!(parser.is_complete());
            parser.feed(&response);
            prop_assert!(parser.is_complete());
            prop_assert!(parser.extract().is_ok());
        }
    }
}
