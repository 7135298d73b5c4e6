//! Leaf decoding: transfer encoding first, then charset.

use std::fmt;

use crate::decompose::ContentNode;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::error::{Error, Result};

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string; unknown values mean 7bit.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Removes this transfer encoding from `raw`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed Base64 or Quoted-Printable data.
    pub fn decode(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(raw),
            Self::QuotedPrintable => decode_quoted_printable(raw),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(raw.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Decoded bytes of a leaf.
///
/// # Errors
///
/// `Error::NotALeaf` for a multipart node, or the transfer decoding error.
pub fn decode_body(node: &ContentNode) -> Result<Vec<u8>> {
    let raw = node
        .body
        .as_deref()
        .ok_or_else(|| Error::NotALeaf(node.mime_part.clone()))?;
    node.header.transfer_encoding.decode(raw)
}

/// Decoded text of a leaf, using its declared charset.
///
/// # Errors
///
/// As [`decode_body`].
pub fn decode_text(node: &ContentNode) -> Result<String> {
    let bytes = decode_body(node)?;
    Ok(decode_charset(&bytes, node.header.content_type.charset()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decompose;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    #[test]
    fn base64_utf8_leaf() {
        let node = decompose(
            b"Content-Type: text/plain; charset=UTF-8\r\n\
Content-Transfer-Encoding: base64\r\n\r\nSMOpbGxv\r\nIHRoZXJl\r\n",
        );
        assert_eq!(decode_text(&node).unwrap(), "Héllo there");
    }

    #[test]
    fn quoted_printable_latin1_leaf() {
        let node = decompose(
            b"Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\ncaf=E9 =\r\nau lait",
        );
        assert_eq!(decode_text(&node).unwrap(), "café au lait");
    }

    #[test]
    fn single_byte_charset_leaves() {
        let node = decompose(
            b"Content-Type: text/plain; charset=windows-1252\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\n=93hi=94 =80",
        );
        assert_eq!(decode_text(&node).unwrap(), "\u{201c}hi\u{201d} \u{20ac}");

        let node = decompose(
            b"Content-Type: text/plain; charset=\"koi8-r\"\r\n\
Content-Transfer-Encoding: 8bit\r\n\r\n\xf0\xd2\xc9\xd7\xc5\xd4",
        );
        assert_eq!(decode_text(&node).unwrap(), "Привет");
    }

    #[test]
    fn identity_leaf() {
        let node = decompose(b"Content-Type: text/plain\r\n\r\nplain");
        assert_eq!(decode_body(&node).unwrap(), b"plain");
    }

    #[test]
    fn multipart_node_has_no_body() {
        let root = decompose(b"Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\na\r\n--x--");
        assert!(matches!(decode_body(&root), Err(Error::NotALeaf(p)) if p.is_empty()));
        assert_eq!(decode_text(&root.children[0]).unwrap(), "a");
    }

    #[test]
    fn broken_base64_is_an_error() {
        let node = decompose(b"Content-Transfer-Encoding: base64\r\n\r\n***");
        assert!(matches!(decode_body(&node), Err(Error::Base64Decode(_))));
    }
}
