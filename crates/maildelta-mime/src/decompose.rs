//! Recursive splitting of a raw message into a content tree.
//!
//! Part paths follow IMAP section numbering: the children of a multipart
//! root are `1`, `2`, ..., their children `1.1`, `1.2`, and so on. A
//! message that is not multipart is a single leaf with path `1`; a
//! multipart root itself has the empty path.

use crate::content_type::ContentType;
use crate::decode::TransferEncoding;
use crate::header::{Headers, split_header};

/// Nesting depth past which multipart parts are kept as leaves.
const MAX_DEPTH: usize = 32;

/// The MIME-relevant header fields of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeader {
    /// Parsed Content-Type; `text/plain; charset=us-ascii` when absent or
    /// malformed.
    pub content_type: ContentType,
    /// Content-Transfer-Encoding.
    pub transfer_encoding: TransferEncoding,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// All header fields of the part.
    pub fields: Headers,
}

impl ContentHeader {
    /// Extracts the MIME fields from a header block.
    #[must_use]
    pub fn from_headers(fields: Headers) -> Self {
        let content_type = fields
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_default();
        let transfer_encoding = fields
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let content_id = fields.get("content-id").map(|id| {
            id.trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        });

        Self {
            content_type,
            transfer_encoding,
            content_id,
            fields,
        }
    }

    /// Content-Type parameters in header order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.content_type.parameters
    }
}

/// One node of a decomposed message.
///
/// A leaf has a body and no children; a multipart node has children and
/// no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    /// The node's MIME header.
    pub header: ContentHeader,
    /// Dotted part path, e.g. `"1.2.1"`.
    pub mime_part: String,
    /// Raw (still transfer-encoded) body of a leaf.
    pub body: Option<Vec<u8>>,
    /// Child parts of a multipart node.
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    /// Returns true for a node holding a body.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// All leaves in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        if self.is_leaf() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }

    /// Finds the node with the given part path.
    #[must_use]
    pub fn find(&self, mime_part: &str) -> Option<&Self> {
        if self.mime_part == mime_part {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(mime_part))
    }

    /// First leaf of the given `type/subtype`.
    #[must_use]
    pub fn find_type(&self, mime_type: &str) -> Option<&Self> {
        self.leaves()
            .into_iter()
            .find(|leaf| leaf.header.content_type.mime_type().eq_ignore_ascii_case(mime_type))
    }
}

/// Decomposes a raw message into its content tree.
///
/// Never fails: unparseable headers fall back to defaults and a multipart
/// part that cannot be split is kept as a leaf.
#[must_use]
pub fn decompose(raw: &[u8]) -> ContentNode {
    let (head, body) = split_header(raw);
    let header = ContentHeader::from_headers(Headers::parse_bytes(head));
    if header.content_type.is_multipart() {
        build(header, body, String::new(), 0)
    } else {
        leaf(header, body, "1".to_string())
    }
}

fn build(header: ContentHeader, body: &[u8], path: String, depth: usize) -> ContentNode {
    let Some(boundary) = header.content_type.boundary().map(str::to_string) else {
        return leaf(header, body, path);
    };
    if depth >= MAX_DEPTH {
        return leaf(header, body, path);
    }

    let parts = split_parts(body, &boundary);
    if parts.is_empty() {
        return leaf(header, body, path);
    }

    let children = parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let child_path = if path.is_empty() {
                (i + 1).to_string()
            } else {
                format!("{path}.{}", i + 1)
            };
            let (head, body) = split_header(part);
            let child_header = ContentHeader::from_headers(Headers::parse_bytes(head));
            if child_header.content_type.is_multipart() {
                build(child_header, body, child_path, depth + 1)
            } else {
                leaf(child_header, body, child_path)
            }
        })
        .collect();

    ContentNode {
        header,
        mime_part: path,
        body: None,
        children,
    }
}

fn leaf(header: ContentHeader, body: &[u8], mime_part: String) -> ContentNode {
    ContentNode {
        header,
        mime_part,
        body: Some(body.to_vec()),
        children: Vec::new(),
    }
}

/// Splits a multipart body into the raw parts between delimiter lines.
///
/// The line break before a delimiter belongs to the delimiter. The
/// preamble and the epilogue after the close delimiter are dropped. A
/// missing close delimiter ends the last part at the end of the body.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut line_start = 0;

    loop {
        let line_end = body[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |p| line_start + p);

        if let Some(rest) = body[line_start..line_end].strip_prefix(delimiter.as_bytes()) {
            let closing = rest.starts_with(b"--");
            if closing || rest.iter().all(u8::is_ascii_whitespace) {
                if let Some(start) = current.take() {
                    parts.push(&body[start..content_end(body, start, line_start)]);
                }
                if closing {
                    return parts;
                }
                current = Some((line_end + 1).min(body.len()));
            }
        }

        if line_end >= body.len() {
            break;
        }
        line_start = line_end + 1;
    }

    if let Some(start) = current {
        parts.push(&body[start..]);
    }
    parts
}

fn content_end(body: &[u8], start: usize, delimiter_start: usize) -> usize {
    let mut end = delimiter_start;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
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
    use proptest::prelude::*;

    const NESTED: &[u8] = b"From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain body\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: image/png; name=\"dot.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <img1@example.com>\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--outer--\r\n\
epilogue\r\n";

    #[test]
    fn single_part_is_leaf_one() {
        let node = decompose(b"Subject: hi\r\nContent-Type: text/plain\r\n\r\nhello\r\n");
        assert!(node.is_leaf());
        assert_eq!(node.mime_part, "1");
        assert_eq!(node.body.as_deref(), Some(&b"hello\r\n"[..]));
    }

    #[test]
    fn missing_content_type_defaults_to_text() {
        let node = decompose(b"Subject: hi\r\n\r\nhello");
        assert_eq!(node.header.content_type, ContentType::default());
        assert_eq!(node.header.transfer_encoding, TransferEncoding::SevenBit);
    }

    #[test]
    fn nested_paths() {
        let root = decompose(NESTED);
        assert_eq!(root.mime_part, "");
        assert!(root.body.is_none());
        assert_eq!(root.children.len(), 2);

        let alternative = root.find("1").unwrap();
        assert_eq!(alternative.children.len(), 2);
        assert_eq!(
            root.find("1.1").unwrap().body.as_deref(),
            Some(&b"plain body"[..])
        );
        assert_eq!(
            root.find("1.2").unwrap().body.as_deref(),
            Some(&b"<p>html</p>"[..])
        );

        let image = root.find("2").unwrap();
        assert_eq!(image.header.content_id.as_deref(), Some("img1@example.com"));
        assert_eq!(image.header.transfer_encoding, TransferEncoding::Base64);
        assert_eq!(image.header.content_type.parameter("name"), Some("dot.png"));
        assert_eq!(image.body.as_deref(), Some(&b"iVBORw0KGgo="[..]));

        let paths: Vec<_> = root.leaves().iter().map(|l| l.mime_part.clone()).collect();
        assert_eq!(paths, vec!["1.1", "1.2", "2"]);
        assert_eq!(root.find_type("text/html").unwrap().mime_part, "1.2");
    }

    #[test]
    fn multipart_without_boundary_is_a_leaf() {
        let node = decompose(b"Content-Type: multipart/mixed\r\n\r\n--x\r\nbody\r\n--x--\r\n");
        assert!(node.is_leaf());
        assert_eq!(node.body.as_deref(), Some(&b"--x\r\nbody\r\n--x--\r\n"[..]));
    }

    #[test]
    fn boundary_never_found_is_a_leaf() {
        let node = decompose(b"Content-Type: multipart/mixed; boundary=zz\r\n\r\njust text\r\n");
        assert!(node.is_leaf());
        assert_eq!(node.body.as_deref(), Some(&b"just text\r\n"[..]));
    }

    #[test]
    fn longer_line_sharing_the_prefix_is_content() {
        let raw = b"Content-Type: multipart/mixed; boundary=ab\r\n\r\n--ab\r\n\r\n--abc is text\r\n--ab--\r\n";
        let root = decompose(raw);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].body.as_deref(), Some(&b"--abc is text"[..]));
    }

    #[test]
    fn unterminated_last_part_runs_to_end() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\none\n--b\n\ntwo";
        let root = decompose(raw);
        let bodies: Vec<_> = root.leaves().iter().map(|l| l.body.clone().unwrap()).collect();
        assert_eq!(bodies, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn deep_nesting_is_cut_off() {
        let mut raw = b"Content-Type: multipart/mixed; boundary=b0\r\n\r\n".to_vec();
        for i in 1..(MAX_DEPTH + 5) {
            raw.extend_from_slice(
                format!("--b{}\r\nContent-Type: multipart/mixed; boundary=b{i}\r\n\r\n", i - 1)
                    .as_bytes(),
            );
        }
        let root = decompose(&raw);
        let leaves = root.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].mime_part.split('.').count(), MAX_DEPTH);
        assert!(leaves[0].header.content_type.is_multipart());
    }

    fn leaf_bodies() -> impl Strategy<Value = Vec<Vec<u8>>> {
        prop::collection::vec("[a-zA-Z0-9 .,]{0,40}(\r\n[a-zA-Z0-9 .,]{1,40}){0,3}", 1..8)
            .prop_map(|bodies| bodies.into_iter().map(String::into_bytes).collect())
    }

    proptest! {
        #[test]
        fn k_leaves_round_trip(bodies in leaf_bodies()) {
            let mut raw = b"Content-Type: multipart/mixed; boundary=\"=_sep_=\"\r\n\r\n".to_vec();
            for body in &bodies {
                raw.extend_from_slice(b"--=_sep_=\r\nContent-Type: text/plain\r\n\r\n");
                raw.extend_from_slice(body);
                raw.extend_from_slice(b"\r\n");
            }
            raw.extend_from_slice(b"--=_sep_=--\r\n");

            let root = decompose(&raw);
            let leaves = root.leaves();
            prop_assert_eq!(leaves.len(), bodies.len());
            for (i, (leaf, body)) in leaves.iter().zip(&bodies).enumerate() {
                prop_assert_eq!(leaf.body.as_ref(), Some(body));
                prop_assert_eq!(&leaf.mime_part, &(i + 1).to_string());
            }
        }
    }
}
