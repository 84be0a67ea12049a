//! Error types.
//!
//! The register itself never fails a lookup; absence is `None`.  Errors
//! exist only for parsing, for consumers built on top of the register, and
//! for the debug command surface.  Factory failures during
//! [`Register::register_object_with_id`](crate::Register::register_object_with_id)
//! are passed through as the caller's own error type.

use thiserror::Error;

/// A release policy string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyParseError {
    #[error("empty release policy")]
    Empty,
    #[error("unknown release policy '{0}'")]
    UnknownPolicy(String),
    #[error("release policy '{0}' requires a parameter")]
    MissingParameter(String),
    #[error("invalid release policy parameter '{0}'")]
    InvalidParameter(String),
    #[error("unexpected trailing input in '{0}'")]
    TrailingInput(String),
}

/// Errors reported by [`PasswordStore`](crate::PasswordStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    /// The owning instance is not present in the register.
    #[error("owner instance '{0}' is not configured")]
    InstanceNotConfigured(String),
    /// The handle does not resolve to a live password.
    #[error("password object is no longer valid")]
    InvalidObject,
    /// Character position outside the password.
    #[error("position {position} is out of range for length {len}")]
    OutOfRange { position: usize, len: usize },
}

/// Errors reported by [`BiometryKeyStore`](crate::BiometryKeyStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BiometryError {
    #[error("biometry key is no longer valid")]
    InvalidObject,
    #[error("biometry key material is empty")]
    EmptyKey,
    #[error("invalid instance identifier")]
    InvalidInstance,
}

/// Errors reported by [`Register::debug_command`](crate::Register::debug_command).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugCommandError {
    #[error("wrong parameter for command '{0}'")]
    WrongParameter(&'static str),
    #[error(transparent)]
    Policy(#[from] PolicyParseError),
}
