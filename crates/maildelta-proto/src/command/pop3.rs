//! POP3 commands.

use super::types::Secret;
use super::{Pop3Shape, ResultShape};

/// POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop3Command {
    /// USER name.
    User(String),
    /// PASS secret.
    Pass(Secret),
    /// STAT.
    Stat,
    /// LIST, optionally for a single message.
    List(Option<u32>),
    /// UIDL, optionally for a single message.
    Uidl(Option<u32>),
    /// RETR msg.
    Retr(u32),
    /// TOP msg lines.
    Top {
        /// Message number.
        message: u32,
        /// Body lines to include after the header.
        lines: u32,
    },
    /// DELE msg.
    Dele(u32),
    /// NOOP.
    Noop,
    /// RSET.
    Rset,
    /// QUIT.
    Quit,
    /// CAPA.
    Capa,
}

impl Pop3Command {
    /// Command keyword, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::User(_) => "USER",
            Self::Pass(_) => "PASS",
            Self::Stat => "STAT",
            Self::List(_) => "LIST",
            Self::Uidl(_) => "UIDL",
            Self::Retr(_) => "RETR",
            Self::Top { .. } => "TOP",
            Self::Dele(_) => "DELE",
            Self::Noop => "NOOP",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
            Self::Capa => "CAPA",
        }
    }

    /// Shape of the result the command produces.
    #[must_use]
    pub const fn expected_shape(&self) -> ResultShape {
        let shape = match self {
            Self::User(_) | Self::Pass(_) | Self::Dele(_) | Self::Noop | Self::Rset | Self::Quit => {
                Pop3Shape::Status
            }
            Self::Stat => Pop3Shape::Stat,
            Self::List(Some(_)) => Pop3Shape::Scan,
            Self::List(None) => Pop3Shape::ScanListing,
            Self::Uidl(Some(_)) => Pop3Shape::Uid,
            Self::Uidl(None) => Pop3Shape::UidListing,
            Self::Retr(_) | Self::Top { .. } => Pop3Shape::Content,
            Self::Capa => Pop3Shape::Capabilities,
        };
        ResultShape::Pop3(shape)
    }

    /// Serializes the command, including the trailing CRLF.
    ///
    /// POP3 has no tags; correlation happens purely by issue order.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::User(name) => format!("USER {name}"),
            Self::Pass(secret) => format!("PASS {}", secret.expose()),
            Self::Stat => "STAT".to_string(),
            Self::List(None) => "LIST".to_string(),
            Self::List(Some(n)) => format!("LIST {n}"),
            Self::Uidl(None) => "UIDL".to_string(),
            Self::Uidl(Some(n)) => format!("UIDL {n}"),
            Self::Retr(n) => format!("RETR {n}"),
            Self::Top { message, lines } => format!("TOP {message} {lines}"),
            Self::Dele(n) => format!("DELE {n}"),
            Self::Noop => "NOOP".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
            Self::Capa => "CAPA".to_string(),
        };
        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_text() {
        assert_eq!(Pop3Command::User("alice".into()).serialize(), b"USER alice\r\n");
        assert_eq!(Pop3Command::Pass("s3cret".into()).serialize(), b"PASS s3cret\r\n");
        assert_eq!(Pop3Command::Uidl(None).serialize(), b"UIDL\r\n");
        assert_eq!(Pop3Command::Uidl(Some(4)).serialize(), b"UIDL 4\r\n");
        assert_eq!(Pop3Command::Retr(3).serialize(), b"RETR 3\r\n");
        assert_eq!(
            Pop3Command::Top { message: 2, lines: 0 }.serialize(),
            b"TOP 2 0\r\n"
        );
    }

    #[test]
    fn pass_debug_hides_secret() {
        let cmd = Pop3Command::Pass("s3cret".into());
        assert!(!format!("{cmd:?}").contains("s3cret"));
    }

    #[test]
    fn shapes_follow_arguments() {
        assert_eq!(
            Pop3Command::List(None).expected_shape(),
            ResultShape::Pop3(Pop3Shape::ScanListing)
        );
        assert_eq!(
            Pop3Command::List(Some(1)).expected_shape(),
            ResultShape::Pop3(Pop3Shape::Scan)
        );
        assert_eq!(
            Pop3Command::Top { message: 1, lines: 5 }.expected_shape(),
            ResultShape::Pop3(Pop3Shape::Content)
        );
    }
}
