//! Account validation.

use super::model::AccountConfig;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Stream id is empty.
    EmptyStreamId,
    /// Host is empty.
    EmptyHost,
    /// Port is invalid.
    InvalidPort,
    /// Username is empty.
    EmptyUsername,
    /// Password is empty.
    EmptyPassword,
    /// Login timeout is zero.
    ZeroLoginTimeout,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyStreamId => "Stream id is required",
            Self::EmptyHost => "Server is required",
            Self::InvalidPort => "Port must be 1-65535",
            Self::EmptyUsername => "Username is required",
            Self::EmptyPassword => "Password is required",
            Self::ZeroLoginTimeout => "Login timeout must be positive",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyStreamId => "stream_id",
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyUsername => "username",
            Self::EmptyPassword => "password",
            Self::ZeroLoginTimeout => "login_timeout_ms",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &AccountConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if account.stream_id.trim().is_empty() {
        errors.push(ValidationError::EmptyStreamId);
    }
    if account.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if account.port == Some(0) {
        errors.push(ValidationError::InvalidPort);
    }
    if account.username.trim().is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if account.password.is_empty() {
        errors.push(ValidationError::EmptyPassword);
    }
    if account.login_timeout_ms == 0 {
        errors.push(ValidationError::ZeroLoginTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
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
    use crate::account::AccountProtocol;

    fn valid() -> AccountConfig {
        AccountConfig::new(
            "work",
            AccountProtocol::Imap,
            "imap.example.com",
            "user@example.com",
            "secret",
        )
    }

    #[test]
    fn test_validate_valid_account() {
        assert!(validate_account(&valid()).is_ok());
    }

    #[test]
    fn test_validate_empty_account() {
        let account = AccountConfig::new("", AccountProtocol::Pop3, " ", "", "");
        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyStreamId,
                ValidationError::EmptyHost,
                ValidationError::EmptyUsername,
                ValidationError::EmptyPassword,
            ]
        );
    }

    #[test]
    fn test_validate_port_and_timeout() {
        let mut account = valid();
        account.port = Some(0);
        account.login_timeout_ms = 0;
        let errors = validate_account(&account).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::ZeroLoginTimeout));
    }

    #[test]
    fn test_error_fields() {
        assert_eq!(ValidationError::EmptyHost.field(), "host");
        assert_eq!(ValidationError::InvalidPort.to_string(), "Port must be 1-65535");
    }
}
