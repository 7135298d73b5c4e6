//! MIME header handling.

use crate::encoding::decode_rfc2047;
use std::collections::HashMap;

/// Collection of message or part headers, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        let value = value.into();
        self.headers.entry(name).or_default().push(value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets the first value with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no header was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Parses a header block.
    ///
    /// Parsing stops at the first empty line. Continuation lines (starting
    /// with a space or tab) are unfolded into the previous field with a
    /// single space. Lines without a colon are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
                continue;
            }

            if let Some(name) = current_name.take() {
                headers.add(name, current_value.trim().to_string());
                current_value.clear();
            }

            if let Some((name, value)) = line.split_once(':') {
                current_name = Some(name.trim().to_string());
                current_value = value.trim().to_string();
            }
        }

        if let Some(name) = current_name {
            headers.add(name, current_value.trim().to_string());
        }

        headers
    }

    /// Parses a header block from raw bytes; invalid UTF-8 is replaced.
    #[must_use]
    pub fn parse_bytes(raw: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(raw))
    }
}

/// Splits raw bytes at the first empty line into header block and body.
///
/// Both CRLF and bare LF line endings are recognized. Without an empty
/// line everything is header and the body is empty.
#[must_use]
pub fn split_header(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n").or_else(|| raw.strip_prefix(b"\n")) {
        return (&[], body);
    }

    let mut line_start = 0;
    while let Some(offset) = raw[line_start..].iter().position(|&b| b == b'\n') {
        let next = line_start + offset + 1;
        let rest = &raw[next..];
        if rest.starts_with(b"\r\n") {
            return (&raw[..next], &rest[2..]);
        }
        if rest.starts_with(b"\n") {
            return (&raw[..next], &rest[1..]);
        }
        line_start = next;
    }
    (raw, &[])
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
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_repeated() {
        let headers = Headers::parse("Received: a\r\nReceived: b\r\n\r\n");
        assert_eq!(headers.get_all("received"), vec!["a", "b"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_headers_parse_unfolds() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test\r\n",
            "\tMessage\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Body").is_none());
    }

    #[test]
    fn test_headers_decoded() {
        let headers = Headers::parse("Subject: =?utf-8?Q?Caf=C3=A9?= menu\r\n");
        assert_eq!(headers.decoded("subject").unwrap(), "Café menu");
    }

    #[test]
    fn test_headers_iter() {
        let headers = Headers::parse("From: a@example.com\nTo: b@example.com\n");
        assert_eq!(headers.iter().count(), 2);
        assert!(headers.iter().all(|(n, v)| !n.is_empty() && !v.is_empty()));
    }

    #[test]
    fn test_split_header() {
        let (head, body) = split_header(b"A: 1\r\nB: 2\r\n\r\nbody\r\n");
        assert_eq!(head, b"A: 1\r\nB: 2\r\n");
        assert_eq!(body, b"body\r\n");

        let (head, body) = split_header(b"A: 1\n\nbody");
        assert_eq!(head, b"A: 1\n");
        assert_eq!(body, b"body");

        let (head, body) = split_header(b"\r\nno headers");
        assert!(head.is_empty());
        assert_eq!(body, b"no headers");

        let (head, body) = split_header(b"A: 1\r\n");
        assert_eq!(head, b"A: 1\r\n");
        assert!(body.is_empty());
    }
}
