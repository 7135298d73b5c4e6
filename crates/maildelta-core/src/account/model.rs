//! Account and daemon configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use maildelta_proto::{ConnectionConfig, Protocol};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mail retrieval protocol of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountProtocol {
    /// IMAP4rev1.
    #[default]
    Imap,
    /// POP3.
    Pop3,
}

impl From<AccountProtocol> for Protocol {
    fn from(protocol: AccountProtocol) -> Self {
        match protocol {
            AccountProtocol::Imap => Self::Imap,
            AccountProtocol::Pop3 => Self::Pop3,
        }
    }
}

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
        }
    }
}

impl From<Security> for maildelta_proto::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
        }
    }
}

const fn default_login_timeout_ms() -> u64 {
    15_000
}

const fn default_sync_interval_secs() -> u64 {
    300
}

/// One mail account to keep in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Key under which history and mail records are stored.
    pub stream_id: String,
    /// Retrieval protocol.
    #[serde(default)]
    pub protocol: AccountProtocol,
    /// Server hostname.
    pub host: String,
    /// Server port; `None` picks the protocol default for the security mode.
    #[serde(default)]
    pub port: Option<u16>,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    #[serde(default)]
    pub password: String,
    /// How long to wait for each login command before giving up.
    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,
}

impl AccountConfig {
    /// Creates an account with default port, TLS and login timeout.
    #[must_use]
    pub fn new(
        stream_id: impl Into<String>,
        protocol: AccountProtocol,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            protocol,
            host: host.into(),
            port: None,
            security: Security::default(),
            username: username.into(),
            password: password.into(),
            login_timeout_ms: default_login_timeout_ms(),
        }
    }

    /// Login timeout as a duration.
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    /// Effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            Protocol::from(self.protocol).default_port(self.security == Security::Tls)
        })
    }

    /// Connection settings for the protocol engine.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::builder(self.host.clone(), self.protocol.into())
            .port(self.port())
            .security(self.security.into())
            .build()
    }
}

/// Daemon settings, loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Accounts to synchronize.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Seconds between sync ticks.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// `SQLite` database file; defaults to the user data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            sync_interval_secs: default_sync_interval_secs(),
            database_path: None,
        }
    }
}

impl DaemonConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes an invalid account.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every account and rejects duplicate stream ids.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(Error::Config("sync_interval_secs must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if let Err(errors) = super::validate_account(account) {
                let messages: Vec<&str> = errors.iter().map(|e| e.message()).collect();
                return Err(Error::Config(format!(
                    "account {:?}: {}",
                    account.stream_id,
                    messages.join(", ")
                )));
            }
            if !seen.insert(account.stream_id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate stream id {:?}",
                    account.stream_id
                )));
            }
        }
        Ok(())
    }

    /// Interval between sync ticks.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Database file to open, falling back to `<data dir>/maildelta/maildelta.db`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no path is configured and the platform has
    /// no local data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("maildelta").join("maildelta.db"))
            .ok_or_else(|| Error::Config("no local data directory".into()))
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

    mod security_tests {
        use super::*;

        #[test]
        fn default_is_tls() {
            assert_eq!(Security::default(), Security::Tls);
        }

        #[test]
        fn display_names() {
            assert_eq!(Security::None.display_name(), "None (insecure)");
            assert_eq!(Security::Tls.display_name(), "SSL/TLS");
        }
    }

    mod account_tests {
        use super::*;

        #[test]
        fn default_ports() {
            let mut account =
                AccountConfig::new("a", AccountProtocol::Pop3, "pop.example.com", "u", "p");
            assert_eq!(account.port(), 995);
            account.security = Security::None;
            assert_eq!(account.port(), 110);
            account.protocol = AccountProtocol::Imap;
            assert_eq!(account.port(), 143);
            account.port = Some(1143);
            assert_eq!(account.port(), 1143);
        }

        #[test]
        fn connection_config_mapping() {
            let account =
                AccountConfig::new("a", AccountProtocol::Imap, "imap.example.com", "u", "p");
            let config = account.connection_config();
            assert_eq!(config.host, "imap.example.com");
            assert_eq!(config.port, 993);
            assert_eq!(config.protocol, Protocol::Imap);
            assert!(config.security.is_tls());
        }
    }

    mod daemon_tests {
        use super::*;

        #[test]
        fn parse_with_defaults() {
            let json = r#"{
                "accounts": [
                    {"stream_id": "work", "host": "imap.example.com", "username": "me", "password": "pw"},
                    {"stream_id": "home", "protocol": "pop3", "security": "none", "port": 1110,
                     "host": "pop.example.com", "username": "me", "password": "pw", "login_timeout_ms": 500}
                ]
            }"#;
            let config: DaemonConfig = serde_json::from_str(json).unwrap();
            config.validate().unwrap();
            assert_eq!(config.sync_interval_secs, 300);
            assert_eq!(config.accounts[0].protocol, AccountProtocol::Imap);
            assert_eq!(config.accounts[0].login_timeout(), Duration::from_secs(15));
            assert_eq!(config.accounts[1].protocol, AccountProtocol::Pop3);
            assert_eq!(config.accounts[1].port(), 1110);
            assert_eq!(config.accounts[1].login_timeout_ms, 500);
        }

        #[test]
        fn duplicate_stream_ids_rejected() {
            let account = AccountConfig::new("x", AccountProtocol::Imap, "h.example.com", "u", "p");
            let config = DaemonConfig {
                accounts: vec![account.clone(), account],
                ..DaemonConfig::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(m)) if m.contains("duplicate")));
        }

        #[test]
        fn zero_interval_rejected() {
            let config = DaemonConfig {
                sync_interval_secs: 0,
                ..DaemonConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn explicit_database_path_wins() {
            let config = DaemonConfig {
                database_path: Some(PathBuf::from("/tmp/x.db")),
                ..DaemonConfig::default()
            };
            assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/x.db"));
        }
    }
}
