//! Connection management.
//!
//! - Configuration (host, port, security mode, protocol)
//! - TLS/plaintext stream abstraction
//! - The connection status machine and pipeline wiring
//! - A registry of connections keyed by account stream id

mod config;
mod link;
mod registry;
mod stream;

pub use config::{ConfigBuilder, ConnectionConfig, Security};
pub use link::{Connection, ConnectionStatus};
pub use registry::ConnectionRegistry;
pub use stream::{MailStream, connect_plain, connect_tls, create_tls_connector};
