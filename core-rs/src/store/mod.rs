//! Identity store collaborators
//!
//! Scenarios seed identities through an [`IdentityStore`] and remove them on
//! teardown. [`SharedDirectory`] keeps them in memory and is what the
//! reference notifier reads; [`CommandStore`] drives the `ipa` command line
//! against a live server.

pub mod command;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{EpnError, Result};
use crate::identity::{IdentityRecord, IdentitySet};
use crate::window::NotificationPlan;

pub use command::CommandStore;

pub trait IdentityStore {
    fn add(&self, record: &IdentityRecord) -> Result<()>;

    fn remove(&self, login: &str) -> Result<()>;

    /// Add every record, stopping at the first failure
    fn add_batch(&self, records: &IdentitySet) -> Result<()> {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }
}

/// On-disk form of a directory, as read by `epnck simulate --directory`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryFile {
    pub domain: String,
    #[serde(default)]
    pub identities: Vec<IdentityRecord>,
}

/// In-memory identity directory
///
/// Clones share the same entries, so a fixture can seed through one handle
/// while notifiers read through another.
#[derive(Debug, Clone)]
pub struct SharedDirectory {
    entries: Arc<RwLock<BTreeMap<String, IdentityRecord>>>,
    domain: String,
}

impl SharedDirectory {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            domain: domain.into(),
        }
    }

    /// Directory holding the built-in `admin` account
    ///
    /// `admin` has no given name and no mail address.
    pub fn with_admin(domain: impl Into<String>) -> Result<Self> {
        let directory = Self::new(domain);
        let mut admin = IdentityRecord::new("admin");
        admin.last_name = Some("Administrator".to_string());
        directory.add(&admin)?;
        Ok(directory)
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EpnError::FileNotFound(path.to_string_lossy().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let file: DirectoryFile = serde_yaml::from_str(&content)?;
        let directory = Self::new(file.domain);
        for record in &file.identities {
            directory.add(record)?;
        }
        debug!(path = %path.display(), count = file.identities.len(), "loaded directory");
        Ok(directory)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = DirectoryFile {
            domain: self.domain.clone(),
            identities: self.snapshot()?,
        };
        fs::write(path, serde_yaml::to_string(&file)?)?;
        Ok(())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn read_entries(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IdentityRecord>>> {
        self.entries
            .read()
            .map_err(|_| EpnError::Store("directory lock poisoned".to_string()))
    }

    fn write_entries(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IdentityRecord>>> {
        self.entries
            .write()
            .map_err(|_| EpnError::Store("directory lock poisoned".to_string()))
    }

    pub fn get(&self, login: &str) -> Result<Option<IdentityRecord>> {
        Ok(self.read_entries()?.get(login).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_entries()?.is_empty())
    }

    /// All entries, ordered by login
    pub fn snapshot(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.read_entries()?.values().cloned().collect())
    }

    /// Entries selected by `plan`, ordered by expiration then login
    ///
    /// Selection is by UTC calendar day: a user expiring at any time on the
    /// day `t` days ahead of `now` is on day `t`.
    pub fn due(&self, plan: &NotificationPlan, now: DateTime<Utc>) -> Result<Vec<IdentityRecord>> {
        let mut due: Vec<IdentityRecord> = self
            .read_entries()?
            .values()
            .filter(|record| {
                record
                    .calendar_offset_days(now)
                    .map_or(false, |d| plan.contains(d))
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.expiration
                .cmp(&b.expiration)
                .then_with(|| a.login.cmp(&b.login))
        });
        Ok(due)
    }
}

impl IdentityStore for SharedDirectory {
    fn add(&self, record: &IdentityRecord) -> Result<()> {
        let mut entries = self.write_entries()?;
        if entries.contains_key(&record.login) {
            return Err(EpnError::DuplicateLogin(record.login.clone()));
        }
        entries.insert(record.login.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, login: &str) -> Result<()> {
        self.write_entries()?
            .remove(login)
            .map(|_| ())
            .ok_or_else(|| EpnError::IdentityNotFound(login.to_string()))
    }
}
