//! Expected-set computation
//!
//! Pure functions of `now`, the identity records and the window. Results are
//! sets: callers compare them against notifier output as sets, never as
//! sequences.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::{NotificationPlan, NotificationWindow};
use crate::identity::IdentityRecord;

/// Logins whose expiration offset lies in `window`
///
/// Records without an expiration are never included.
pub fn expected_in_window<'a, I>(
    identities: I,
    window: &NotificationWindow,
    now: DateTime<Utc>,
) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a IdentityRecord>,
{
    select(identities, now, |offset| window.contains(offset))
}

/// Logins selected by a window or by the notification schedule
pub fn expected_for_plan<'a, I>(
    identities: I,
    plan: &NotificationPlan,
    now: DateTime<Utc>,
) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a IdentityRecord>,
{
    select(identities, now, |offset| plan.contains(offset))
}

fn select<'a, I, F>(identities: I, now: DateTime<Utc>, due: F) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a IdentityRecord>,
    F: Fn(i64) -> bool,
{
    identities
        .into_iter()
        .filter(|record| record.offset_days(now).map_or(false, &due))
        .map(|record| record.login.clone())
        .collect()
}
