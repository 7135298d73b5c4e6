//! # maildelta-core
//!
//! Mailbox delta synchronization on top of `maildelta-proto`.
//!
//! This crate provides:
//! - Account and daemon configuration (`serde` / JSON)
//! - Login over an engine connection, with a per-command timeout
//! - IMAP and POP3 delta sync against a stored history log
//! - The [`MailStore`] persistence trait and its `SQLite` implementation
//! - A fixed-interval scheduler that never overlaps cycles of one account
//!
//! ```ignore
//! use std::sync::Arc;
//! use maildelta_core::{DaemonConfig, Scheduler, SqliteMailStore, Synchronizer, TcpConnector};
//!
//! let config = DaemonConfig::load("accounts.json")?;
//! let store = Arc::new(SqliteMailStore::new("mail.db").await?);
//! let sync = Arc::new(Synchronizer::new(store, TcpConnector, config.accounts.clone()));
//! let report = sync.run("work").await?;
//! println!("{} new", report.new_message_count());
//! Scheduler::new(sync, config.sync_interval()).run_until(shutdown).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod sync;

pub use account::{
    AccountConfig, AccountProtocol, DaemonConfig, Security, ValidationError, ValidationResult,
    validate_account,
};
pub use error::{Error, Result};
pub use scheduler::Scheduler;
pub use session::{Connector, MailSession, TcpConnector, login};
pub use store::{HistoryEntry, HistoryOrder, MailRecord, MailStore, SqliteMailStore, SyncDelta};
pub use sync::{SyncReport, Synchronizer};
