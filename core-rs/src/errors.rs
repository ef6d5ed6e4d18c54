//! Error types for the EPN oracle
//!
//! Three families matter to callers:
//!
//! - [`ConfigError`]: malformed window bounds, conflicting modes, bad
//!   `epn.conf` values. Rendered verbatim on the notifier's stderr.
//! - [`TransportError`]: the mail transport could not be reached.
//! - [`EpnError`]: everything the harness itself can fail on.

use thiserror::Error;

/// Input rejected before any lookup or delivery happens.
///
/// The `Display` output of each variant is the exact diagnostic line the
/// notifier prints, so negative scenarios can match on it literally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You cannot specify --from-nbdays without --to-nbdays")]
    MissingUpperBound,

    #[error("error: --to-nbdays must be a positive integer.")]
    InvalidUpperBound(String),

    #[error("error: --from-nbdays must be a positive integer.")]
    InvalidLowerBound(String),

    #[error("error: --from-nbdays must be smaller than --to-nbdays.")]
    RangeInverted { from: i64, to: i64 },

    #[error("You cannot specify --mail-test and --dry-run together")]
    ConflictingModes,

    #[error("could not convert string to float: '{0}'")]
    InvalidDelay(String),

    #[error("smtp_delay cannot be less than zero")]
    NegativeDelay,

    #[error("invalid value for {key}: '{value}'")]
    InvalidSetting { key: String, value: String },

    #[error("malformed line {line} in configuration: {content}")]
    MalformedLine { line: usize, content: String },
}

/// Failure talking to the mail transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("IPA-EPN: Could not connect to the configured SMTP server: {server}:{port}")]
    Unreachable { server: String, port: u16 },

    #[error("IPA-EPN: SMTP server rejected message for {recipient}: {reason}")]
    Rejected { recipient: String, reason: String },
}

#[derive(Error, Debug)]
pub enum EpnError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation mismatch: {0}")]
    Mismatch(#[from] crate::compare::Mismatch),

    #[error("Invalid wire timestamp: {0}")]
    WireTimestamp(String),

    #[error("Duplicate login: {0}")]
    DuplicateLogin(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Invocation error: {0}")]
    Invocation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, EpnError>;
