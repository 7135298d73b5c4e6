//! # maildelta-proto
//!
//! Client-side engine for IMAP and POP3 over one long-lived TCP or TLS
//! socket per account.
//!
//! ## Pipeline
//!
//! ```text
//!  caller ── execute ──▶ CommandHandler ──▶ WireTransform ──▶ socket
//!                          ▲                    │ PendingResult (FIFO)
//!                          │                    ▼
//!                          └── ParsedResult ── Receiver ◀── socket
//! ```
//!
//! - The [`CommandHandler`] keeps exactly one command in flight per
//!   connection and resolves each caller with the result carrying its
//!   correlation id.
//! - The [`WireTransform`] serializes a command and records what the
//!   response will look like, in issue order.
//! - The [`Receiver`] feeds socket bytes into a per-response parser and
//!   publishes a [`ParsedResult`] when it completes.
//!
//! Protocol rejections, malformed responses and transport failures all
//! come back as a result with `error` set and no payload. `Err` is kept for
//! misuse, such as issuing a command on a torn-down connection.
//!
//! ## Quick Start
//!
//! ```ignore
//! use maildelta_proto::{Connection, ConnectionConfig, ImapCommand, Protocol};
//!
//! let connection = Connection::new(ConnectionConfig::new("imap.example.com", Protocol::Imap));
//! connection.connect().await?;
//!
//! let handler = connection.handler().await?;
//! let login = handler.execute(ImapCommand::login("user@example.com", "password")).await?;
//! if !login.error {
//!     let folders = handler.execute(ImapCommand::list_all()).await?;
//!     println!("{:?}", folders.into_payload());
//! }
//! connection.disconnect().await?;
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP and POP3 command model
//! - [`connection`]: sockets, status machine, registry
//! - [`parser`]: incremental response parsers
//! - [`types`]: identifiers, flags, mailboxes, sequence sets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod handler;
pub mod parser;
pub mod receiver;
pub mod result;
pub mod transform;
pub mod types;

pub use command::{
    Command, ImapCommand, Peek, Pop3Command, ResultShape, SearchCriteria, Secret, StoreAction,
};
pub use connection::{
    ConfigBuilder, Connection, ConnectionConfig, ConnectionRegistry, ConnectionStatus, Security,
};
pub use error::{Error, Result};
pub use handler::CommandHandler;
pub use parser::ResponseParser;
pub use receiver::Receiver;
pub use result::{FetchData, FetchEntry, MaildropStat, ParsedResult, Payload, ScanEntry, UidlEntry};
pub use transform::{PendingQueue, PendingResult, WireTransform};
pub use types::{
    CorrelationId, Flag, Flags, ListEntry, Mailbox, MailboxAttribute, MailboxStatus, Protocol,
    SeqNum, SequenceSet, Status, Uid, UidSet, UidValidity,
};
