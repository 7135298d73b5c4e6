//! IMAP lexer for tokenizing server responses.
//!
//! Breaks raw response bytes into tokens. Literals (`{n}\r\n` followed by
//! `n` raw bytes) are read whole, so anything inside one is never mistaken
//! for protocol structure.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::types::{Flag, Flags};
use crate::{Error, Result};

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();

        let mut result = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("Invalid escape: \\{c}"))),
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(c) => result.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        let s =
            String::from_utf8(result).map_err(|_| self.error("Invalid UTF-8 in quoted string"))?;
        Ok(Token::QuotedString(s))
    }

    fn read_literal(&mut self) -> Result<Token<'a>> {
        let size = self.read_literal_size()?;
        if self.pos + size > self.input.len() {
            return Err(self.error("Incomplete literal data"));
        }
        let data = self.input[self.pos..self.pos + size].to_vec();
        self.skip(size);
        Ok(Token::Literal(data))
    }

    /// Consumes `{n}\r\n` (or the `{n+}` form) and returns `n`.
    fn read_literal_size(&mut self) -> Result<usize> {
        self.advance();
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' | b'+' => {
                    self.advance();
                }
                b'}' => break,
                _ => return Err(self.error("Invalid character in literal size")),
            }
        }

        let size = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid literal size"))?
            .trim_end_matches('+')
            .parse::<usize>()
            .map_err(|_| self.error("Invalid literal size number"))?;

        if self.advance() != Some(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }
        Ok(size)
    }

    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut all_digits = true;

        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            all_digits &= b.is_ascii_digit();
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if all_digits {
            let n: u32 = s.parse().map_err(|_| self.error("Number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Creates a parse error at the current position.
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Expects and consumes a specific token kind.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an astring (atom, quoted string, or literal).
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => {
                String::from_utf8(data).map_err(|_| self.error("Invalid UTF-8 in literal"))
            }
            token => Err(self.error(&format!("Expected astring, got {token:?}"))),
        }
    }

    /// Reads an nstring as raw bytes (NIL, quoted string, or literal).
    pub fn read_nstring_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data)),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads a parenthesized flag list such as `(\Seen \Flagged)`.
    pub fn read_flag_list(&mut self) -> Result<Flags> {
        self.expect(Token::LParen)?;
        let mut flags = Flags::new();
        loop {
            match self.next_token()? {
                Token::RParen => return Ok(flags),
                Token::Space => {}
                Token::Atom("\\") if self.peek() == Some(b'*') => {
                    self.advance();
                    flags.insert(Flag::Wildcard);
                }
                Token::Atom(s) => flags.insert(Flag::parse(s)),
                token => return Err(self.error(&format!("Unexpected token in flag list: {token:?}"))),
            }
        }
    }

    /// Consumes a balanced parenthesized expression and returns its raw text.
    ///
    /// Literals inside are skipped by their declared length, and parentheses
    /// inside quoted strings do not count toward the nesting depth.
    pub fn read_raw_list(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        if self.peek() != Some(b'(') {
            return Err(self.error("Expected ("));
        }
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(b'(') => {
                    depth += 1;
                    self.advance();
                }
                Some(b')') => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&self.input[start..self.pos]);
                    }
                }
                Some(b'"') => {
                    self.read_quoted_string()?;
                }
                Some(b'{') => {
                    self.read_literal()?;
                }
                Some(_) => {
                    self.advance();
                }
                None => return Err(self.error("Unbalanced parentheses")),
            }
        }
    }

    /// Reads a bracketed section specifier such as `[HEADER]` verbatim.
    pub fn read_section(&mut self) -> Result<String> {
        if self.advance() != Some(b'[') {
            return Err(self.error("Expected ["));
        }
        let start = self.pos;
        while let Some(b) = self.advance() {
            if b == b']' {
                return String::from_utf8(self.input[start..self.pos - 1].to_vec())
                    .map_err(|_| self.error("Invalid section"));
            }
        }
        Err(self.error("Unterminated section"))
    }

    /// Skips a partial-fetch origin such as `<0>` if present.
    pub fn skip_origin(&mut self) {
        if self.peek() == Some(b'<') {
            while let Some(b) = self.advance() {
                if b == b'>' {
                    break;
                }
            }
        }
    }

    /// Skips one fetch item value of unknown kind.
    pub fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'(') => self.read_raw_list().map(|_| ()),
            Some(b'[') => self.read_section().map(|_| ()),
            _ => self.next_token().map(|_| ()),
        }
    }
}

/// Returns true if the byte is a valid atom character.
///
/// Includes `\` so flags like `\Seen` lex as a single atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21..=0x27 |
        0x2B..=0x5A |
        0x5C |
        0x5E..=0x7A |
        0x7C |
        0x7E
    ) && b != b'"'
        && b != b'%'
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

    #[test]
    fn untagged_fetch_prefix() {
        let mut lexer = Lexer::new(b"* 12 FETCH (");
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(12));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("FETCH"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
    }

    #[test]
    fn quoted_string_escapes() {
        let mut lexer = Lexer::new(b"\"hello \\\"world\\\"\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("hello \"world\"".to_string())
        );
    }

    #[test]
    fn nil_is_case_insensitive() {
        let mut lexer = Lexer::new(b"NIL nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn literal_is_read_whole() {
        let mut lexer = Lexer::new(b"{11}\r\nA1 OK done)");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::Literal(b"A1 OK done)".to_vec())
        );
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn incomplete_literal_is_an_error() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn flag_list_with_wildcard() {
        let mut lexer = Lexer::new(b"(\\Seen \\Deleted \\*)");
        let flags = lexer.read_flag_list().unwrap();
        assert!(flags.is_seen());
        assert!(flags.contains(&Flag::Deleted));
        assert!(flags.contains(&Flag::Wildcard));
    }

    #[test]
    fn raw_list_respects_quotes_and_literals() {
        let input = b"(\"TEXT\" \"PLAIN\" (\"NAME\" \")(\") {3}\r\n)))) rest";
        let mut lexer = Lexer::new(input);
        let raw = lexer.read_raw_list().unwrap();
        assert_eq!(raw, &input[..input.len() - 5]);
        assert_eq!(lexer.peek(), Some(b' '));
    }

    #[test]
    fn section_and_origin() {
        let mut lexer = Lexer::new(b"[HEADER]<0> NIL");
        assert_eq!(lexer.read_section().unwrap(), "HEADER");
        lexer.skip_origin();
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_nstring_bytes().unwrap(), None);
    }

    #[test]
    fn atom_chars() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b'.'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b'['));
        assert!(!is_atom_char(b'{'));
    }
}
