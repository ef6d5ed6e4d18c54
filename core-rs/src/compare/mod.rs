//! Result comparison
//!
//! Two questions are asked of every scenario:
//!
//! 1. Did both access paths answer the same? ([`compare_across_paths`])
//! 2. Is the answer the oracle's expected set? ([`compare_to_oracle`])
//!
//! Failures are classified by the literal diagnostic found on stderr
//! ([`ErrorKind`]); see [`expect_failure`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::ScenarioResult;
use crate::notifier::NotifiedRecord;

/// Path fragment that must never appear in a notifier's stderr
pub const LOG_PATH_MARKER: &str = "/var/log";

/// Why a scenario did not hold
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("access paths {left_name} and {right_name} disagree")]
    PathDivergence {
        left_name: String,
        right_name: String,
        left: ScenarioResult,
        right: ScenarioResult,
    },

    #[error("notified set differs from expected: missing {missing:?}, unexpected {unexpected:?}")]
    OracleDivergence {
        missing: BTreeSet<String>,
        unexpected: BTreeSet<String>,
    },

    #[error("stdout is not a notification payload: {0}")]
    MalformedPayload(String),

    #[error("expected {expected}, got {actual}")]
    UnexpectedOutcome { expected: String, actual: String },

    #[error("stderr leaks a log path: {0}")]
    LeakedLogPath(String),

    #[error("mail check failed: {0}")]
    Mail(String),

    #[error("{0}")]
    Check(String),
}

/// Diagnostic families a notifier can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    MissingUpperBound,
    InvalidUpperBound,
    InvalidLowerBound,
    RangeInverted,
    SmtpUnreachable,
    ConflictingModes,
}

impl ErrorKind {
    /// Matching order. `ConflictingModes` is a prefix of
    /// `MissingUpperBound`'s text and has to come last.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::MissingUpperBound,
        ErrorKind::InvalidUpperBound,
        ErrorKind::InvalidLowerBound,
        ErrorKind::RangeInverted,
        ErrorKind::SmtpUnreachable,
        ErrorKind::ConflictingModes,
    ];

    /// Literal substring identifying the kind on stderr
    pub fn needle(self) -> &'static str {
        match self {
            ErrorKind::MissingUpperBound => "You cannot specify --from-nbdays without --to-nbdays",
            ErrorKind::InvalidUpperBound => "error: --to-nbdays must be a positive integer.",
            ErrorKind::InvalidLowerBound => "error: --from-nbdays must be a positive integer.",
            ErrorKind::RangeInverted => "error: --from-nbdays must be smaller than --to-nbdays.",
            ErrorKind::SmtpUnreachable => "Could not connect to the configured SMTP server",
            ErrorKind::ConflictingModes => "You cannot specify",
        }
    }

    /// First kind whose text appears in `stderr`
    pub fn from_stderr(stderr: &str) -> Option<ErrorKind> {
        Self::ALL
            .into_iter()
            .find(|kind| stderr.contains(kind.needle()))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MissingUpperBound => "missing upper bound",
            ErrorKind::InvalidUpperBound => "invalid upper bound",
            ErrorKind::InvalidLowerBound => "invalid lower bound",
            ErrorKind::RangeInverted => "inverted range",
            ErrorKind::SmtpUnreachable => "SMTP unreachable",
            ErrorKind::ConflictingModes => "conflicting modes",
        };
        f.write_str(name)
    }
}

/// Shape of one result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit 0 with a JSON array on stdout
    Payload(Vec<NotifiedRecord>),
    /// Exit 0 and nothing on stdout (mail was sent instead)
    Empty,
    /// Exit 0 but stdout is not a payload
    Malformed(String),
    Failure {
        exit_code: i32,
        kind: Option<ErrorKind>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Payload(records) => write!(f, "payload of {} record(s)", records.len()),
            Outcome::Empty => write!(f, "empty output"),
            Outcome::Malformed(reason) => write!(f, "malformed output ({})", reason),
            Outcome::Failure {
                exit_code,
                kind: Some(kind),
            } => write!(f, "failure {} ({})", exit_code, kind),
            Outcome::Failure {
                exit_code,
                kind: None,
            } => write!(f, "failure {} (unrecognized)", exit_code),
        }
    }
}

fn parse_payload(stdout: &[u8]) -> std::result::Result<Vec<NotifiedRecord>, String> {
    let text = std::str::from_utf8(stdout).map_err(|e| e.to_string())?;
    serde_json::from_str(text.trim()).map_err(|e| e.to_string())
}

pub fn classify(result: &ScenarioResult) -> Outcome {
    if result.exit_code != 0 {
        return Outcome::Failure {
            exit_code: result.exit_code,
            kind: ErrorKind::from_stderr(&result.stderr_text()),
        };
    }
    if result.stdout.iter().all(u8::is_ascii_whitespace) {
        return Outcome::Empty;
    }
    match parse_payload(&result.stdout) {
        Ok(records) => Outcome::Payload(records),
        Err(reason) => Outcome::Malformed(reason),
    }
}

/// Logins listed in a successful dry-run payload
pub fn notified_logins(result: &ScenarioResult) -> Result<BTreeSet<String>, Mismatch> {
    match classify(result) {
        Outcome::Payload(records) => Ok(records.into_iter().map(|r| r.uid).collect()),
        Outcome::Malformed(reason) => Err(Mismatch::MalformedPayload(reason)),
        other => Err(Mismatch::UnexpectedOutcome {
            expected: "a notification payload".to_string(),
            actual: other.to_string(),
        }),
    }
}

/// Result of comparing both access paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDiff {
    pub stdout_equal: bool,
    pub exit_code_equal: bool,
}

impl PathDiff {
    pub fn is_identical(&self) -> bool {
        self.stdout_equal && self.exit_code_equal
    }
}

/// Byte-level comparison of stdout and exit codes
///
/// stderr is not compared: each path may report its own connection details
/// there. stdout is compared undecoded.
pub fn compare_across_paths(left: &ScenarioResult, right: &ScenarioResult) -> PathDiff {
    PathDiff {
        stdout_equal: left.stdout == right.stdout,
        exit_code_equal: left.exit_code == right.exit_code,
    }
}

/// [`compare_across_paths`] as a check carrying both results on failure
pub fn expect_same_across_paths(
    left_name: &str,
    left: &ScenarioResult,
    right_name: &str,
    right: &ScenarioResult,
) -> Result<(), Mismatch> {
    if compare_across_paths(left, right).is_identical() {
        return Ok(());
    }
    Err(Mismatch::PathDivergence {
        left_name: left_name.to_string(),
        right_name: right_name.to_string(),
        left: left.clone(),
        right: right.clone(),
    })
}

/// Set difference between notified and expected logins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleDiff {
    /// Expected but not notified
    pub missing: BTreeSet<String>,
    /// Notified but not expected
    pub unexpected: BTreeSet<String>,
}

impl OracleDiff {
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    pub fn into_result(self) -> Result<(), Mismatch> {
        if self.is_match() {
            Ok(())
        } else {
            Err(Mismatch::OracleDivergence {
                missing: self.missing,
                unexpected: self.unexpected,
            })
        }
    }
}

/// Compare a dry-run payload to the expected set, ignoring order
pub fn compare_to_oracle(
    result: &ScenarioResult,
    expected: &BTreeSet<String>,
) -> Result<OracleDiff, Mismatch> {
    let notified = notified_logins(result)?;
    Ok(OracleDiff {
        missing: expected.difference(&notified).cloned().collect(),
        unexpected: notified.difference(expected).cloned().collect(),
    })
}

/// Check that `result` is a clean failure of the given kind
///
/// Exit code above zero, nothing on stdout, the diagnostic on stderr and no
/// log file path leaked alongside it.
pub fn expect_failure(result: &ScenarioResult, kind: ErrorKind) -> Result<(), Mismatch> {
    let unexpected = |what: &str| Mismatch::UnexpectedOutcome {
        expected: format!("failure ({})", kind),
        actual: what.to_string(),
    };

    if result.exit_code <= 0 {
        return Err(unexpected(&classify(result).to_string()));
    }
    if !result.stdout.is_empty() {
        return Err(unexpected(&format!(
            "exit {} with stdout {:?}",
            result.exit_code,
            result.stdout_text()
        )));
    }
    let stderr = result.stderr_text();
    if !stderr.contains(kind.needle()) {
        return Err(unexpected(&format!(
            "exit {} with stderr {:?}",
            result.exit_code, stderr
        )));
    }
    if stderr.contains(LOG_PATH_MARKER) {
        return Err(Mismatch::LeakedLogPath(stderr.into_owned()));
    }
    Ok(())
}
