//! Identity records and expiration status
//!
//! An [`IdentityRecord`] is what a scenario seeds into the identity store: a
//! unique login, optional names and mail addresses, and the two instants the
//! notifiers care about (password expiration and last successful
//! authentication).
//!
//! [`ExpirationStatus`] classifies a record relative to "now" under a
//! [`StalenessPolicy`]. Status is derived once when a scenario is built and
//! never updated afterwards.

pub mod generator;
pub mod ldif;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{
    offset_instant, to_calendar_offset_days, to_offset_days, whole_seconds, wire_timestamp,
};
use crate::errors::{EpnError, Result};

pub use generator::{BatchPlan, UserBatch};
pub use ldif::LdifContext;

/// One user entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub login: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mail: Vec<String>,

    /// Password expiration; `None` never expires
    #[serde(
        default,
        with = "wire_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "wire_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_successful_auth: Option<DateTime<Utc>>,

    /// Initial password, only used when seeding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl IdentityRecord {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            first_name: None,
            last_name: None,
            mail: Vec::new(),
            expiration: None,
            last_successful_auth: None,
            password: None,
        }
    }

    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_mail(mut self, address: impl Into<String>) -> Self {
        self.mail.push(address.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn expiring_at(mut self, instant: DateTime<Utc>) -> Self {
        self.expiration = Some(instant);
        self
    }

    /// Expire `days` whole days after `now`
    pub fn expiring_in(self, now: DateTime<Utc>, days: i64) -> Self {
        self.expiring_at(offset_instant(now, days))
    }

    pub fn last_authenticated_at(mut self, instant: DateTime<Utc>) -> Self {
        self.last_successful_auth = Some(instant);
        self
    }

    /// Day offset of the expiration relative to `now`
    pub fn offset_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiration.map(|instant| to_offset_days(instant, now))
    }

    /// UTC calendar days between the day of `now` and the expiration day
    pub fn calendar_offset_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiration
            .map(|instant| to_calendar_offset_days(instant, now))
    }

    /// Copy with both instants truncated to what the store keeps
    pub fn at_wire_precision(&self) -> Self {
        let mut record = self.clone();
        record.expiration = record.expiration.map(whole_seconds);
        record.last_successful_auth = record.last_successful_auth.map(whole_seconds);
        record
    }

    pub fn status(&self, now: DateTime<Utc>, policy: &StalenessPolicy) -> Option<ExpirationStatus> {
        self.offset_days(now)
            .map(|offset| ExpirationStatus::classify(offset, policy))
    }

    /// No successful authentication within the grace period
    pub fn is_inactive(&self, now: DateTime<Utc>, policy: &StalenessPolicy) -> bool {
        match self.last_successful_auth {
            Some(instant) => to_offset_days(instant, now) <= -policy.grace_period_days,
            None => false,
        }
    }

    /// "first last", falling back to the login
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.login.clone(),
        }
    }

    pub fn primary_mail(&self) -> Option<&str> {
        self.mail.first().map(String::as_str)
    }
}

/// Expiration classification
///
/// - `Future`: expires after the notification threshold
/// - `Soon`: expires within the threshold (today included)
/// - `Grace`: expired, still inside the grace period
/// - `Expired`: expired for at least the whole grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationStatus {
    Future,
    Soon,
    Grace,
    Expired,
}

impl ExpirationStatus {
    pub const ALL: [ExpirationStatus; 4] = [
        ExpirationStatus::Future,
        ExpirationStatus::Soon,
        ExpirationStatus::Grace,
        ExpirationStatus::Expired,
    ];

    pub fn classify(offset_days: i64, policy: &StalenessPolicy) -> Self {
        if offset_days > policy.notify_threshold_days {
            ExpirationStatus::Future
        } else if offset_days >= 0 {
            ExpirationStatus::Soon
        } else if offset_days > -policy.grace_period_days {
            ExpirationStatus::Grace
        } else {
            ExpirationStatus::Expired
        }
    }

    /// Offset used when generating a user of this status
    pub fn canonical_offset(self) -> i64 {
        match self {
            ExpirationStatus::Future => 100,
            ExpirationStatus::Soon => 2,
            ExpirationStatus::Grace => -5,
            ExpirationStatus::Expired => -100,
        }
    }
}

/// Thresholds for [`ExpirationStatus::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessPolicy {
    pub notify_threshold_days: i64,
    pub grace_period_days: i64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            notify_threshold_days: 28,
            grace_period_days: 30,
        }
    }
}

/// Identities of one scenario, login-unique, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    records: Vec<IdentityRecord>,
    logins: HashSet<String>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = IdentityRecord>,
    {
        let mut set = Self::new();
        for record in records {
            set.insert(record)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, record: IdentityRecord) -> Result<()> {
        if !self.logins.insert(record.login.clone()) {
            return Err(EpnError::DuplicateLogin(record.login));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, login: &str) -> Option<&IdentityRecord> {
        self.records.iter().find(|r| r.login == login)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IdentityRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn logins(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.login.as_str())
    }
}

impl<'a> IntoIterator for &'a IdentitySet {
    type Item = &'a IdentityRecord;
    type IntoIter = std::slice::Iter<'a, IdentityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
