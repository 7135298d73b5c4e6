//! Account configuration.
//!
//! Provides per-account connection settings, daemon settings, and validation.

mod model;
mod validation;

pub use model::{AccountConfig, AccountProtocol, DaemonConfig, Security};
pub use validation::{ValidationError, ValidationResult, validate_account};
