//! Integration tests for the scenario runner
//!
//! Two in-process reference notifiers share one directory and one mailbox,
//! the way two access paths of a real deployment share the server.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use epn_oracle::clock::{parse_wire_timestamp, Clock, FixedClock};
use epn_oracle::compare::{notified_logins, Mismatch};
use epn_oracle::identity::generator::incremental_population;
use epn_oracle::mail::{MailTransport, UnreachableTransport};
use epn_oracle::{
    expected_for_plan, AccessPath, EnvironmentFixture, EpnConfig, IdentityStore, MemoryMailbox,
    NotificationPlan, NotifierOptions, ReferenceNotifier, Scenario, ScenarioRunner,
    SharedDirectory,
};

const NOW: &str = "20261017120000Z";
const DOMAIN: &str = "ipa.test";

struct Harness {
    directory: SharedDirectory,
    mailbox: MemoryMailbox,
    fixture: EnvironmentFixture,
}

impl Harness {
    fn new() -> Self {
        let directory = SharedDirectory::with_admin(DOMAIN).unwrap();
        let mailbox = MemoryMailbox::new();
        let fixture = EnvironmentFixture::new(
            Box::new(directory.clone()),
            Box::new(mailbox.clone()),
            Arc::new(clock(NOW)),
            DOMAIN,
        );
        Self {
            directory,
            mailbox,
            fixture,
        }
    }

    fn notifier(&self, name: &str) -> ReferenceNotifier {
        self.notifier_with(name, Arc::new(self.mailbox.clone()), NOW)
    }

    fn notifier_with(
        &self,
        name: &str,
        transport: Arc<dyn MailTransport>,
        now: &str,
    ) -> ReferenceNotifier {
        let mut config = EpnConfig::for_domain(DOMAIN);
        config.smtp_admin = format!("user2@{}", DOMAIN);
        ReferenceNotifier::new(
            name,
            self.directory.clone(),
            config,
            Arc::new(clock(now)),
            transport,
        )
    }
}

fn clock(wire: &str) -> FixedClock {
    FixedClock::new(parse_wire_timestamp(wire).unwrap())
}

/// Live clock stand-in: every reading is one second and a bit later
struct TickingClock(Mutex<DateTime<Utc>>);

impl TickingClock {
    fn starting_at(wire: &str) -> Self {
        Self(Mutex::new(
            parse_wire_timestamp(wire).unwrap() + Duration::milliseconds(300),
        ))
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.0.lock().unwrap();
        let current = *now;
        *now = current + Duration::milliseconds(1_100);
        current
    }
}

#[test]
fn test_full_catalogue_passes_against_reference_notifiers() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    let reports = runner.run_all(&Scenario::catalogue(Some("user2"))).unwrap();
    assert_eq!(reports.len(), 16);
    for report in &reports {
        let failures: Vec<String> = report
            .failures()
            .map(|c| format!("{}: {:?}", c.name, c.outcome))
            .collect();
        assert!(report.passed(), "{} failed: {:#?}", report.scenario, failures);
        assert!(report.warnings.is_empty());
    }

    // every scenario tore down what it seeded
    assert_eq!(harness.directory.len().unwrap(), 1);
    assert!(harness.mailbox.handles().unwrap().is_empty());
}

#[test]
fn test_smtp_unreachable_is_a_clean_failure() {
    let harness = Harness::new();
    let dead: Arc<dyn MailTransport> = Arc::new(UnreachableTransport {
        server: "localhost".to_string(),
        port: 25,
    });
    let cli = harness.notifier_with("cli", dead.clone(), NOW);
    let api = harness.notifier_with("api", dead, NOW);
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    let report = runner.run(&Scenario::SmtpUnreachable).unwrap();
    assert!(report.passed(), "{:?}", report.checks);
    assert_eq!(report.checks.len(), 2);
}

#[test]
fn test_reachable_server_fails_the_unreachable_scenario() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    let report = runner.run(&Scenario::SmtpUnreachable).unwrap();
    assert!(!report.passed());
}

#[test]
fn test_path_divergence_is_reported() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    // a path whose clock runs a day ahead selects different users
    let skewed = harness.notifier_with("skewed", Arc::new(harness.mailbox.clone()), "20261018120000Z");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &skewed);

    let report = runner.run(&Scenario::DefaultSchedule).unwrap();
    assert!(!report.passed());

    let failures: Vec<_> = report.failures().collect();
    assert!(failures
        .iter()
        .any(|c| matches!(c.outcome, Err(Mismatch::PathDivergence { .. }))));
    // the left path still matches the expected set
    assert!(failures.iter().all(|c| !c.name.contains("cli matches")));
    assert!(failures
        .iter()
        .any(|c| matches!(c.outcome, Err(Mismatch::OracleDivergence { .. }))));
}

#[test]
fn test_negative_scenarios_detect_lenient_notifier() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    // the reference notifier rejects all of these
    for scenario in [
        Scenario::MissingUpperBound,
        Scenario::AlphaUpperBound,
        Scenario::DecimalUpperBound,
        Scenario::InvertedRange,
        Scenario::MailTestDryRunConflict,
    ] {
        let report = runner.run(&scenario).unwrap();
        assert!(report.passed(), "{}: {:?}", scenario, report.checks);
    }
}

#[test]
fn test_run_scenario_returns_both_results_and_tears_down() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    let now = harness.fixture.now();
    let identities = incremental_population(30, now, DOMAIN).unwrap();
    let (left, right) = runner
        .run_scenario(&identities, &NotifierOptions::new().with_dry_run())
        .unwrap();

    assert_eq!(left, right);
    assert_eq!(left.exit_code, 0);
    let expected = expected_for_plan(&identities, &NotificationPlan::default_schedule(), now);
    for login in &expected {
        assert!(left.stdout_text().contains(&format!("\"uid\": \"{}\"", login)));
    }
    assert_eq!(harness.directory.len().unwrap(), 1);
}

#[test]
fn test_custom_schedule() {
    let harness = Harness::new();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    // notifiers keep the default schedule; a runner expecting another one fails
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api).with_schedule(vec![2, 5]);

    let report = runner.run(&Scenario::DefaultSchedule).unwrap();
    assert!(!report.passed());
}

#[test]
fn test_seeding_conflict_is_an_environment_error() {
    let harness = Harness::new();
    harness
        .directory
        .add(&epn_oracle::IdentityRecord::new("user0"))
        .unwrap();
    let cli = harness.notifier("cli");
    let api = harness.notifier("api");
    let runner = ScenarioRunner::new(&harness.fixture, &cli, &api);

    assert!(runner.run(&Scenario::DefaultSchedule).is_err());
    // seeding stopped at user0; only the admin and the pre-existing user0 remain
    assert_eq!(harness.directory.len().unwrap(), 2);
    assert_eq!(cli.name(), "cli");
}

#[test]
fn test_live_clock_selects_whole_days_ahead() {
    let directory = SharedDirectory::with_admin(DOMAIN).unwrap();
    let mailbox = MemoryMailbox::new();
    let ticking = Arc::new(TickingClock::starting_at(NOW));
    let fixture = EnvironmentFixture::new(
        Box::new(directory.clone()),
        Box::new(mailbox.clone()),
        ticking.clone(),
        DOMAIN,
    );
    let notifier = |name: &str| {
        let mut config = EpnConfig::for_domain(DOMAIN);
        config.smtp_admin = format!("user2@{}", DOMAIN);
        ReferenceNotifier::new(
            name,
            directory.clone(),
            config,
            ticking.clone(),
            Arc::new(mailbox.clone()),
        )
    };
    let cli = notifier("cli");
    let api = notifier("api");
    let runner = ScenarioRunner::new(&fixture, &cli, &api);

    let report = runner.run(&Scenario::DefaultSchedule).unwrap();
    assert!(report.passed(), "{:?}", report.checks);

    let identities = {
        let scope = fixture.scope();
        incremental_population(30, scope.now(), DOMAIN).unwrap()
    };
    let (left, right) = runner
        .run_scenario(&identities, &NotifierOptions::new().with_dry_run())
        .unwrap();
    let expected: BTreeSet<String> = [1, 3, 7, 14, 28]
        .iter()
        .map(|day| format!("user{}", day))
        .collect();
    assert_eq!(notified_logins(&left).unwrap(), expected);
    assert_eq!(left, right);

    for report in runner.run_all(&Scenario::catalogue(Some("user2"))).unwrap() {
        assert!(report.passed(), "{} failed: {:?}", report.scenario, report.checks);
    }
    assert_eq!(directory.len().unwrap(), 1);
}
