// Expiration Window Contract Tests
//
// These tests pin down which users a notifier must select for a given
// window and instant. Every scenario check compares notifier output against
// these rules, so drifting here silently changes what "correct" means.
//
// **Problem**: off-by-one edits to the window bounds or day rounding
// **Solution**: contracts on the boundaries, asserted through the public API

use chrono::{DateTime, Duration, Utc};
use epn_oracle::clock::{parse_wire_timestamp, to_offset_days};
use epn_oracle::identity::generator::incremental_population;
use epn_oracle::{
    expected_for_plan, expected_in_window, IdentityRecord, NotificationPlan, NotificationWindow,
    DEFAULT_NOTIFY_TTLS,
};
use std::collections::BTreeSet;

fn now() -> DateTime<Utc> {
    parse_wire_timestamp("20261017120000Z").unwrap()
}

fn logins(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// WHY: The window is half-open, lower bound included, upper bound excluded
/// REASON: `--from-nbdays 7 --to-nbdays 8` must select exactly the users
///         expiring in seven days, never those at eight
/// BREAKS: Every range scenario if the upper bound becomes inclusive
#[test]
fn window_includes_lower_and_excludes_upper_bound() {
    let users = incremental_population(30, now(), "ipa.test").unwrap();

    let window = NotificationWindow::new(7, 8).unwrap();
    assert_eq!(expected_in_window(&users, &window, now()), logins(&["user7"]));

    let window = NotificationWindow::new(0, 3).unwrap();
    assert_eq!(
        expected_in_window(&users, &window, now()),
        logins(&["user0", "user1", "user2"])
    );
}

/// WHY: A lone upper bound means the single day just below it
/// REASON: `--to-nbdays 5` lists `user4` only, the notifier's own behavior
/// BREAKS: The implied dry-run scenario if read as `[0, 5)`
#[test]
fn lone_upper_bound_is_one_day() {
    let users = incremental_population(30, now(), "ipa.test").unwrap();
    let window = NotificationWindow::from_args(None, Some("5")).unwrap().unwrap();
    assert_eq!(window, NotificationWindow::single_day(4));
    assert_eq!(expected_in_window(&users, &window, now()), logins(&["user4"]));
}

/// WHY: Day offsets round toward negative infinity
/// REASON: A password that expired one second ago is at offset -1, not 0
/// BREAKS: `[0, n)` windows would notify users whose password already expired
#[test]
fn offsets_floor_toward_the_past() {
    let n = now();
    assert_eq!(to_offset_days(n, n), 0);
    assert_eq!(to_offset_days(n + Duration::seconds(86_399), n), 0);
    assert_eq!(to_offset_days(n + Duration::days(1), n), 1);
    assert_eq!(to_offset_days(n - Duration::seconds(1), n), -1);
    assert_eq!(to_offset_days(n - Duration::milliseconds(500), n), -1);
}

/// WHY: Users without an expiration are never expected
/// REASON: They have no offset, so no window can contain them
#[test]
fn users_without_expiration_are_never_selected() {
    let users = vec![
        IdentityRecord::new("testuser0").with_mail("testuser0@ipa.test"),
        IdentityRecord::new("testuser1")
            .with_mail("testuser1@ipa.test")
            .expiring_in(now(), 7),
    ];
    let window = NotificationWindow::new(0, 365).unwrap();
    assert_eq!(expected_in_window(&users, &window, now()), logins(&["testuser1"]));
}

/// WHY: Without bounds the schedule selects exactly its listed days
/// REASON: Each notification day `t` is the window `[t, t + 1)`
#[test]
fn default_schedule_selects_listed_days_only() {
    let users = incremental_population(30, now(), "ipa.test").unwrap();
    let plan = NotificationPlan::default_schedule();
    let expected: BTreeSet<String> = DEFAULT_NOTIFY_TTLS
        .iter()
        .map(|day| format!("user{}", day))
        .collect();
    assert_eq!(expected_for_plan(&users, &plan, now()), expected);
}

/// WHY: Selection is a set; order and duplicates carry no meaning
/// REASON: Overlapping sliding windows must each report a user exactly once
#[test]
fn expected_set_is_order_independent() {
    let users = incremental_population(10, now(), "ipa.test").unwrap();
    let mut reversed: Vec<IdentityRecord> = users.iter().cloned().collect();
    reversed.reverse();
    let window = NotificationWindow::new(2, 6).unwrap();
    assert_eq!(
        expected_in_window(&users, &window, now()),
        expected_in_window(&reversed, &window, now())
    );
}

/// WHY: An empty directory has an empty expected set for any window
/// REASON: The empty-state scenario relies on `[]` being the only correct payload
#[test]
fn empty_population_expects_nothing() {
    let users: Vec<IdentityRecord> = Vec::new();
    for window in [NotificationWindow::single_day(0), NotificationWindow::new(0, 90).unwrap()] {
        assert!(expected_in_window(&users, &window, now()).is_empty());
    }
}
