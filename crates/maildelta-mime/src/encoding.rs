//! Transfer and header encodings.
//!
//! Base64, Quoted-Printable (RFC 2045), RFC 2047 encoded words, and charset
//! conversion of the decoded bytes.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks (`=` at the end of a line, CRLF or LF) are removed.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        let rest = &data[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if rest.is_empty() {
            i += 1;
        } else {
            let hex = rest
                .get(..2)
                .and_then(|h| std::str::from_utf8(h).ok())
                .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
            let decoded = u8::from_str_radix(hex, 16)
                .map_err(|e| Error::InvalidEncoding(format!("Invalid hex {hex:?}: {e}")))?;
            result.push(decoded);
            i += 3;
        }
    }

    Ok(result)
}

/// Converts bytes in the given charset to a string.
///
/// Labels are resolved the WHATWG way, so `iso-8859-1` reads as
/// windows-1252. US-ASCII, a missing charset and an unknown one are read as
/// UTF-8; invalid sequences become U+FFFD.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .map(str::trim)
        .filter(|label| {
            !label.eq_ignore_ascii_case("us-ascii") && !label.eq_ignore_ascii_case("ascii")
        })
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped; text outside
/// encoded words is kept as is. Malformed words are left undecoded.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = "";
    let mut previous_was_word = false;

    while !rest.is_empty() {
        if let Some((word, after)) = split_encoded_word(rest)
            && let Some(decoded) = decode_word(word)
        {
            if !previous_was_word {
                out.push_str(pending_space);
            }
            out.push_str(&decoded);
            pending_space = "";
            previous_was_word = true;
            rest = after;
            continue;
        }

        let ws_len = rest.len() - rest.trim_start().len();
        if ws_len > 0 {
            out.push_str(pending_space);
            pending_space = &rest[..ws_len];
            rest = &rest[ws_len..];
            continue;
        }

        out.push_str(pending_space);
        pending_space = "";
        previous_was_word = false;
        let token_len = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let token_len = rest[first..]
            .find("=?")
            .map_or(token_len, |p| token_len.min(p + first));
        out.push_str(&rest[..token_len]);
        rest = &rest[token_len..];
    }

    out.push_str(pending_space);
    out
}

/// Splits `=?charset?enc?text?=` off the start of `s`.
fn split_encoded_word(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix("=?")?;
    let charset_end = body.find('?')?;
    let after_charset = &body[charset_end + 1..];
    let encoding_end = after_charset.find('?')?;
    let text_start = charset_end + 1 + encoding_end + 1;
    let end = body[text_start..].find("?=")? + text_start;
    let word_len = 2 + end + 2;
    Some((&s[..word_len], &s[word_len..]))
}

fn decode_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let text = parts.next()?;
    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => decode_base64(text.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(text.replace('_', " ").as_bytes()).ok()?,
        _ => return None,
    };
    Some(decode_charset(&bytes, Some(charset)))
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
    fn test_base64_with_line_breaks() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
        assert!(decode_base64(b"not base64!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld=").unwrap(), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid() {
        assert!(decode_quoted_printable(b"bad =ZZ").is_err());
        assert!(decode_quoted_printable(b"short =A").is_err());
    }

    #[test]
    fn test_charsets() {
        assert_eq!(decode_charset(b"caf\xe9", Some("ISO-8859-1")), "café");
        assert_eq!(decode_charset("café".as_bytes(), Some("utf-8")), "café");
        assert_eq!(decode_charset(b"plain", None), "plain");
        assert_eq!(decode_charset("caf\u{e9}".as_bytes(), Some("US-ASCII")), "café");
        assert_eq!(decode_charset(b"x\xffy", Some("x-unknown")), "x\u{fffd}y");
    }

    #[test]
    fn test_single_byte_charsets() {
        assert_eq!(
            decode_charset(&[0x93, b'h', b'i', 0x94, b' ', 0x80], Some("windows-1252")),
            "\u{201c}hi\u{201d} \u{20ac}"
        );
        assert_eq!(
            decode_charset(&[0xf0, 0xd2, 0xc9, 0xd7, 0xc5, 0xd4], Some(" KOI8-R ")),
            "Привет"
        );
    }

    #[test]
    fn test_rfc2047_single_byte_charsets() {
        assert_eq!(decode_rfc2047("=?windows-1252?Q?caf=E9_=80?="), "café €");
        assert_eq!(
            decode_rfc2047("Re: =?koi8-r?Q?=F0=D2=C9=D7=C5=D4?="),
            "Re: Привет"
        );
    }

    #[test]
    fn test_rfc2047_plain_text_untouched() {
        assert_eq!(decode_rfc2047("Hello  there"), "Hello  there");
        assert_eq!(decode_rfc2047("a =? b"), "a =? b");
    }

    #[test]
    fn test_rfc2047_single_words() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?q?H=C3=A9llo_there?="), "Héllo there");
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_rfc2047_multi_word() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?Caf=C3=A9?=\r\n =?utf-8?Q?_au_lait?="),
            "Café au lait"
        );
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= world"),
            "Re: Héllo world"
        );
        assert_eq!(
            decode_rfc2047("\"=?utf-8?Q?J=C3=B6rg?=\" <j@example.com>"),
            "\"Jörg\" <j@example.com>"
        );
    }

    #[test]
    fn test_rfc2047_malformed_kept() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("=?utf-8?Q?unterminated"), "=?utf-8?Q?unterminated");
    }
}
