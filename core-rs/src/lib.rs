//! # epn-oracle
//!
//! Ground truth and harness for password expiration notifiers (EPN).
//!
//! A notifier scans a directory for users whose password expires within a
//! window of days and mails them. This crate predicts which users a
//! correct notifier selects, drives two notifier access paths against the
//! same seeded directory and checks that they agree with each other and
//! with the prediction.
//!
//! ## Architecture
//!
//! ```text
//!   IdentitySet ──seed──▶ EnvironmentFixture ◀──read── AccessPath (left)
//!        │                  (store, mailbox)   ◀──read── AccessPath (right)
//!        ▼                                                 │
//!   window::oracle ──expected set──▶ compare ◀──ScenarioResult
//!                                       │
//!                                 ScenarioReport
//! ```
//!
//! ## Key pieces
//!
//! - [`clock`]: day offsets and the `YYYYMMDDHHMMSSZ` wire format
//! - [`window`]: notification windows and the expected-set oracle
//! - [`compare`]: classification of notifier output and diffs
//! - [`runner`]: scenario catalogue, fixture scoping and reports
//! - [`notifier`]: access paths, including an in-process reference notifier

pub mod capture;
pub mod cli;
pub mod clock;
pub mod compare;
pub mod config;
pub mod errors;
pub mod identity;
pub mod mail;
pub mod notifier;
pub mod runner;
pub mod store;
pub mod window;

pub use capture::{capture, ScenarioResult};
pub use clock::{format_wire_timestamp, parse_wire_timestamp, Clock, FixedClock, SystemClock};
pub use compare::{
    classify, compare_across_paths, compare_to_oracle, expect_failure, expect_same_across_paths,
    ErrorKind, Mismatch, OracleDiff, Outcome, PathDiff,
};
pub use config::{EpnConfig, HarnessConfig};
pub use errors::{ConfigError, EpnError, Result, TransportError};
pub use identity::{ExpirationStatus, IdentityRecord, IdentitySet, StalenessPolicy};
pub use mail::{MailMessage, MailTransport, Mailbox, MemoryMailbox, SpoolMailbox};
pub use notifier::{AccessPath, CommandAccessPath, NotifierOptions, ReferenceNotifier};
pub use runner::{Check, EnvironmentFixture, Scenario, ScenarioReport, ScenarioRunner};
pub use store::{CommandStore, IdentityStore, SharedDirectory};
pub use window::{expected_for_plan, expected_in_window, NotificationPlan, NotificationWindow};

/// Offsets of the default notification schedule, in days
pub use window::DEFAULT_NOTIFY_TTLS;
