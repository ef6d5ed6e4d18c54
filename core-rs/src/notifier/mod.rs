//! Notifier collaborators
//!
//! A notifier is reached through an [`AccessPath`]. The harness invokes two of
//! them with identical [`NotifierOptions`] and compares what comes back:
//!
//! - [`CommandAccessPath`] spawns a program (the installed notifier, or
//!   `epnck simulate`) and captures its streams.
//! - [`ReferenceNotifier`] runs the notifier contract in process over a
//!   [`SharedDirectory`](crate::store::SharedDirectory).
//!
//! An access path only returns `Err` when it could not run at all. Anything
//! the notifier itself reports, including rejected arguments, comes back as
//! an ordinary [`ScenarioResult`].

pub mod command;
pub mod reference;

use serde::{Deserialize, Serialize};

use crate::capture::ScenarioResult;
use crate::errors::{ConfigError, Result};
use crate::identity::IdentityRecord;
use crate::window::NotificationPlan;

pub use command::CommandAccessPath;
pub use reference::ReferenceNotifier;

pub const EXIT_SUCCESS: i32 = 0;

/// Mail transport failure
pub const EXIT_TRANSPORT: i32 = 1;

/// Rejected arguments or configuration
pub const EXIT_CONFIG: i32 = 2;

/// The invocation did not finish in time
pub const EXIT_TIMEOUT: i32 = 124;

/// Parameters of one notifier run
///
/// Bounds are kept as raw text so malformed values reach the notifier
/// unchanged and are rejected there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_days: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_days: Option<String>,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub mail_test: bool,
}

impl NotifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_from(self, days: i64) -> Self {
        self.with_raw_from(days.to_string())
    }

    pub fn with_to(self, days: i64) -> Self {
        self.with_raw_to(days.to_string())
    }

    pub fn with_raw_from(mut self, text: impl Into<String>) -> Self {
        self.from_days = Some(text.into());
        self
    }

    pub fn with_raw_to(mut self, text: impl Into<String>) -> Self {
        self.to_days = Some(text.into());
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_mail_test(mut self) -> Self {
        self.mail_test = true;
        self
    }

    /// Command-line arguments, in the notifier's flag syntax
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(from) = &self.from_days {
            args.push("--from-nbdays".to_string());
            args.push(from.clone());
        }
        if let Some(to) = &self.to_days {
            args.push("--to-nbdays".to_string());
            args.push(to.clone());
        }
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if self.mail_test {
            args.push("--mail-test".to_string());
        }
        args
    }

    /// Whether the run only reports and sends nothing
    ///
    /// Any upper bound implies a dry run, with or without a lower bound.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run || self.to_days.is_some()
    }

    /// Validate and resolve what the run selects
    ///
    /// A lower bound without an upper bound is reported before the mode
    /// conflict; window values are checked after it.
    pub fn plan(&self, schedule: &[i64]) -> std::result::Result<NotificationPlan, ConfigError> {
        if self.from_days.is_some() && self.to_days.is_none() {
            return Err(ConfigError::MissingUpperBound);
        }
        if self.mail_test && self.dry_run {
            return Err(ConfigError::ConflictingModes);
        }
        NotificationPlan::from_args(
            self.from_days.as_deref(),
            self.to_days.as_deref(),
            schedule,
        )
    }
}

/// One entry of the notifier's dry-run JSON payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedRecord {
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub givenname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<String>,

    #[serde(default)]
    pub mail: Vec<String>,

    /// `YYYY-MM-DD HH:MM:SS`, UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub krbpasswordexpiration: Option<String>,
}

/// Payload timestamp format
pub const PAYLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl From<&IdentityRecord> for NotifiedRecord {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            uid: record.login.clone(),
            cn: Some(record.full_name()),
            givenname: record.first_name.clone(),
            sn: record.last_name.clone(),
            mail: record.mail.clone(),
            krbpasswordexpiration: record
                .expiration
                .map(|instant| instant.format(PAYLOAD_TIME_FORMAT).to_string()),
        }
    }
}

/// A way of reaching the notifier
pub trait AccessPath {
    /// Label used in reports
    fn name(&self) -> &str;

    /// Run the notifier once
    fn invoke(&self, options: &NotifierOptions) -> Result<ScenarioResult>;
}

impl<T: AccessPath + ?Sized> AccessPath for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, options: &NotifierOptions) -> Result<ScenarioResult> {
        (**self).invoke(options)
    }
}
