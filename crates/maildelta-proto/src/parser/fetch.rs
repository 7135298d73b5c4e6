//! FETCH response parsing.

use crate::command::Peek;
use crate::result::{FetchData, FetchEntry};
use crate::types::{SeqNum, Uid};
use crate::{Error, Result};

use super::lexer::{Lexer, Token};

/// Parses one `* n FETCH (...)` unit.
///
/// Returns `None` for units that are not FETCH responses, and for FETCH
/// responses that do not carry the requested item (unsolicited flag updates).
/// A unit that carries the item but no UID is a parse error: the item could
/// not be attributed to a message.
pub(super) fn parse_fetch_unit(unit: &[u8], peek: Peek) -> Result<Option<FetchEntry>> {
    let mut lexer = Lexer::new(unit);
    if lexer.next_token()? != Token::Asterisk {
        return Ok(None);
    }
    lexer.expect_space()?;
    let Token::Number(seq) = lexer.next_token()? else {
        return Ok(None);
    };
    lexer.expect_space()?;
    match lexer.next_token()? {
        Token::Atom(word) if word.eq_ignore_ascii_case("FETCH") => {}
        _ => return Ok(None),
    }
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut uid = None;
    let mut data = None;

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        uid = Some(Uid::new(n).ok_or_else(|| lexer.error("UID cannot be 0"))?);
                    }
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = lexer.read_flag_list()?;
                        if peek == Peek::Flags {
                            data = Some(FetchData::Flags(flags));
                        }
                    }
                    "INTERNALDATE" => {
                        lexer.expect_space()?;
                        let Token::QuotedString(date) = lexer.next_token()? else {
                            return Err(lexer.error("INTERNALDATE is not a quoted string"));
                        };
                        if peek == Peek::InternalDate {
                            data = Some(FetchData::InternalDate(date));
                        }
                    }
                    "BODYSTRUCTURE" => {
                        lexer.expect_space()?;
                        let raw = lexer.read_raw_list()?;
                        if peek == Peek::BodyStructure {
                            data = Some(FetchData::BodyStructure(
                                String::from_utf8_lossy(raw).into_owned(),
                            ));
                        }
                    }
                    "BODY" if lexer.peek() == Some(b'[') => {
                        let section = lexer.read_section()?;
                        lexer.skip_origin();
                        lexer.expect_space()?;
                        let bytes = lexer.read_nstring_bytes()?.unwrap_or_default();
                        if let Some(item) = body_section(peek, &section, bytes) {
                            data = Some(item);
                        }
                    }
                    "RFC822" | "RFC822.HEADER" => {
                        lexer.expect_space()?;
                        let bytes = lexer.read_nstring_bytes()?.unwrap_or_default();
                        let section = if upper == "RFC822" { "" } else { "HEADER" };
                        if let Some(item) = body_section(peek, section, bytes) {
                            data = Some(item);
                        }
                    }
                    _ => {
                        lexer.expect_space()?;
                        lexer.skip_value()?;
                    }
                }
            }
            token => {
                return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}")));
            }
        }
    }

    let Some(data) = data else {
        return Ok(None);
    };
    let uid = uid.ok_or_else(|| {
        Error::parse(format!("FETCH response for message {seq} carries no UID"))
    })?;
    let seq = SeqNum::new(seq).ok_or_else(|| Error::parse("sequence number cannot be 0"))?;

    Ok(Some(FetchEntry { seq, uid, data }))
}

fn body_section(peek: Peek, section: &str, bytes: Vec<u8>) -> Option<FetchData> {
    match peek {
        Peek::Full if section.is_empty() => Some(FetchData::Message(bytes)),
        Peek::Header if section.eq_ignore_ascii_case("HEADER") => Some(FetchData::Header(bytes)),
        _ => None,
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

    fn entry(unit: &[u8], peek: Peek) -> FetchEntry {
        parse_fetch_unit(unit, peek).unwrap().unwrap()
    }

    #[test]
    fn flags_with_uid_in_either_order() {
        let a = entry(b"* 3 FETCH (UID 103 FLAGS (\\Seen))\r\n", Peek::Flags);
        let b = entry(b"* 3 FETCH (FLAGS (\\Seen) UID 103)\r\n", Peek::Flags);
        assert_eq!(a, b);
        assert_eq!(a.seq.get(), 3);
        assert_eq!(a.uid.get(), 103);
        assert!(matches!(a.data, FetchData::Flags(ref f) if f.is_seen()));
    }

    #[test]
    fn internal_date() {
        let e = entry(
            b"* 1 FETCH (UID 7 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")\r\n",
            Peek::InternalDate,
        );
        assert_eq!(
            e.data,
            FetchData::InternalDate("17-Jul-1996 02:44:25 -0700".to_string())
        );
    }

    #[test]
    fn header_literal() {
        let e = entry(
            b"* 2 FETCH (UID 8 BODY[HEADER] {21}\r\nSubject: hi\r\nX: y\r\n\r\n)\r\n",
            Peek::Header,
        );
        assert_eq!(e.data, FetchData::Header(b"Subject: hi\r\nX: y\r\n\r\n".to_vec()));
    }

    #[test]
    fn full_message_with_origin_and_extra_items() {
        let e = entry(
            b"* 4 FETCH (RFC822.SIZE 3 BODY[]<0> {3}\r\nabc UID 44)\r\n",
            Peek::Full,
        );
        assert_eq!(e.uid.get(), 44);
        assert_eq!(e.data, FetchData::Message(b"abc".to_vec()));
    }

    #[test]
    fn body_structure_is_kept_raw() {
        let e = entry(
            b"* 5 FETCH (UID 9 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92))\r\n",
            Peek::BodyStructure,
        );
        assert_eq!(
            e.data,
            FetchData::BodyStructure(
                "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92)".to_string()
            )
        );
    }

    #[test]
    fn missing_uid_is_a_parse_error() {
        let result = parse_fetch_unit(b"* 6 FETCH (FLAGS (\\Seen))\r\n", Peek::Flags);
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn unrequested_items_are_skipped() {
        assert!(parse_fetch_unit(b"* 6 FETCH (FLAGS (\\Seen))\r\n", Peek::Header)
            .unwrap()
            .is_none());
        assert!(parse_fetch_unit(b"* 6 EXISTS\r\n", Peek::Flags).unwrap().is_none());
        assert!(parse_fetch_unit(b"* OK still here\r\n", Peek::Flags).unwrap().is_none());
    }
}
