//! Environment fixture and scoped teardown

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{whole_seconds, Clock};
use crate::errors::Result;
use crate::identity::IdentitySet;
use crate::mail::{Mailbox, MailMessage};
use crate::store::IdentityStore;

/// Everything a scenario touches outside the notifiers
pub struct EnvironmentFixture {
    store: Box<dyn IdentityStore>,
    mailbox: Box<dyn Mailbox>,
    clock: Arc<dyn Clock>,
    domain: String,
}

impl EnvironmentFixture {
    pub fn new(
        store: Box<dyn IdentityStore>,
        mailbox: Box<dyn Mailbox>,
        clock: Arc<dyn Clock>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailbox,
            clock,
            domain: domain.into(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Open a scope; whatever it seeds is removed when it is dropped
    ///
    /// The scope pins one whole-second instant when it opens. Identities and
    /// expected sets are both computed from it.
    pub fn scope(&self) -> FixtureScope<'_> {
        FixtureScope {
            fixture: self,
            seeded: Vec::new(),
            watched: BTreeSet::new(),
            opened_at: whole_seconds(self.now()),
        }
    }
}

/// Seeded state of one scenario
///
/// Teardown runs on every exit path, including early returns and panics.
/// It is best effort: failures are logged and do not mask the scenario's
/// own result.
pub struct FixtureScope<'a> {
    fixture: &'a EnvironmentFixture,
    seeded: Vec<String>,
    watched: BTreeSet<String>,
    opened_at: DateTime<Utc>,
}

impl<'a> FixtureScope<'a> {
    /// Add every identity to the store at wire precision
    pub fn seed(&mut self, identities: &IdentitySet) -> Result<()> {
        for record in identities {
            self.fixture.store.add(&record.at_wire_precision())?;
            self.seeded.push(record.login.clone());
        }
        debug!(count = identities.len(), seeded_at = %self.opened_at, "seeded identities");
        Ok(())
    }

    /// Instant identities are generated from and expected sets computed against
    pub fn now(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Same instant as [`FixtureScope::now`]
    pub fn seeded_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Empty a mailbox now and again on teardown
    pub fn watch_mailbox(&mut self, handle: &str) -> Result<()> {
        self.fixture.mailbox.clear(handle)?;
        self.watched.insert(handle.to_string());
        Ok(())
    }

    pub fn clear_mail(&self, handle: &str) -> Result<()> {
        self.fixture.mailbox.clear(handle)
    }

    pub fn read_mail(&self, handle: &str) -> Result<Option<MailMessage>> {
        self.fixture.mailbox.read_message(handle)
    }

    pub fn has_mail(&self, handle: &str) -> Result<bool> {
        Ok(self.fixture.mailbox.read(handle)?.is_some())
    }

    pub fn fixture(&self) -> &EnvironmentFixture {
        self.fixture
    }
}

impl Drop for FixtureScope<'_> {
    fn drop(&mut self) {
        for login in self.seeded.drain(..).rev() {
            if let Err(e) = self.fixture.store.remove(&login) {
                warn!(%login, error = %e, "teardown could not remove identity");
            }
        }
        for handle in std::mem::take(&mut self.watched) {
            if let Err(e) = self.fixture.mailbox.clear(&handle) {
                warn!(%handle, error = %e, "teardown could not clear mailbox");
            }
        }
    }
}
