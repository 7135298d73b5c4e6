//! # maildelta-mime
//!
//! MIME decomposition and decoding for raw mail messages.
//!
//! ## Features
//!
//! - **Decomposition**: split a raw message into a tree of parts with
//!   IMAP-style part paths (`1`, `1.2`, `2.1.3`)
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Charsets**: UTF-8, US-ASCII and ISO-8859-1; others decoded lossily
//! - **Headers**: case-insensitive lookup with unfolding
//!
//! ## Quick Start
//!
//! ```ignore
//! use maildelta_mime::{decompose, decode_text};
//!
//! let root = decompose(raw_message);
//! for leaf in root.leaves() {
//!     println!("{} {}", leaf.mime_part, leaf.header.content_type);
//! }
//! if let Some(text) = root.find_type("text/plain") {
//!     println!("{}", decode_text(text)?);
//! }
//! ```
//!
//! Header fields decode the same way:
//!
//! ```ignore
//! use maildelta_mime::Headers;
//!
//! let headers = Headers::parse_bytes(header_block);
//! let subject = headers.decoded("subject");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod decode;
mod decompose;
mod error;
mod header;

pub mod encoding;

pub use content_type::ContentType;
pub use decode::{TransferEncoding, decode_body, decode_text};
pub use decompose::{ContentHeader, ContentNode, decompose};
pub use error::{Error, Result};
pub use header::{Headers, split_header};
