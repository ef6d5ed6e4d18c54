//! Scenario catalogue
//!
//! Each [`Scenario`] seeds its own identities, drives the notifiers and
//! returns a [`ScenarioReport`]. Everything it seeded or watched is torn down
//! when it returns.

use std::collections::BTreeSet;
use std::fmt;

use super::{Check, ScenarioReport, ScenarioRunner};
use crate::capture::ScenarioResult;
use crate::compare::{ErrorKind, Mismatch};
use crate::config::epn::{DEFAULT_FROM_NAME, DEFAULT_SUBJECT};
use crate::errors::Result;
use crate::identity::generator::incremental_population;
use crate::identity::{BatchPlan, IdentityRecord, IdentitySet};
use crate::mail::ExpectedMail;
use crate::notifier::NotifierOptions;
use crate::runner::fixture::FixtureScope;
use crate::window::{expected_for_plan, expected_in_window, NotificationPlan, NotificationWindow};

/// Size of the incremental population: offsets `0..=29`
const POPULATION: u32 = 30;

/// Windows checked by [`Scenario::RangeContainment`]
const RANGES: [(i64, i64); 3] = [(0, 5), (7, 15), (1, 20)];

const BATCH_PASSWORD: &str = "Secret123";

/// Body prefix of the default template for the incremental users
const DEFAULT_BODY: &str = "Hi test user,\n\nYour password will expire";

const MAIL_TEST_BODY: &str = "Hi SAMPLE USER,";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// No expiring identity: the payload is `[]`
    EmptyState,
    /// One expiring user and one that never expires
    SingleUserWindow,
    /// Dry run on the notification schedule
    DefaultSchedule,
    /// `[t, t+1)` and `--to-nbdays t` for every scheduled day; no mail sent
    SlidingWindows,
    /// Ranges with and without `--dry-run`; neither sends mail
    RangeContainment,
    /// `--to-nbdays 5` without `--dry-run` lists `user4` and sends nothing
    UpperBoundImpliesDryRun,
    MissingUpperBound,
    AlphaUpperBound,
    DecimalUpperBound,
    InvertedRange,
    MailTestDryRunConflict,
    /// Repeated dry runs print the same payload
    Idempotence,
    /// Expiring users without a mail address are reported by DN
    MissingMailAddress,
    /// Large mixed batch from [`BatchPlan`]
    BulkPopulation,
    /// Mail delivered on the schedule, checked in the recipients' mailboxes
    DefaultScheduleDelivery,
    /// `--mail-test` reaches `smtp_admin`, whose mailbox handle is given
    MailTestDelivery { handle: String },
    /// Notifiers configured with a dead mail server
    SmtpUnreachable,
}

impl Scenario {
    /// Everything runnable against a correctly configured notifier
    pub fn catalogue(mail_test_recipient: Option<&str>) -> Vec<Scenario> {
        let mut scenarios = vec![
            Scenario::EmptyState,
            Scenario::SingleUserWindow,
            Scenario::DefaultSchedule,
            Scenario::SlidingWindows,
            Scenario::RangeContainment,
            Scenario::UpperBoundImpliesDryRun,
            Scenario::MissingUpperBound,
            Scenario::AlphaUpperBound,
            Scenario::DecimalUpperBound,
            Scenario::InvertedRange,
            Scenario::MailTestDryRunConflict,
            Scenario::Idempotence,
            Scenario::MissingMailAddress,
            Scenario::BulkPopulation,
            Scenario::DefaultScheduleDelivery,
        ];
        if let Some(handle) = mail_test_recipient {
            scenarios.push(Scenario::MailTestDelivery {
                handle: handle.to_string(),
            });
        }
        scenarios
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::EmptyState => "emptyState",
            Scenario::SingleUserWindow => "singleUserWindow",
            Scenario::DefaultSchedule => "defaultSchedule",
            Scenario::SlidingWindows => "slidingWindows",
            Scenario::RangeContainment => "rangeContainment",
            Scenario::UpperBoundImpliesDryRun => "upperBoundImpliesDryRun",
            Scenario::MissingUpperBound => "missingUpperBound",
            Scenario::AlphaUpperBound => "alphaUpperBound",
            Scenario::DecimalUpperBound => "decimalUpperBound",
            Scenario::InvertedRange => "invertedRange",
            Scenario::MailTestDryRunConflict => "mailTestDryRunConflict",
            Scenario::Idempotence => "idempotence",
            Scenario::MissingMailAddress => "missingMailAddress",
            Scenario::BulkPopulation => "bulkPopulation",
            Scenario::DefaultScheduleDelivery => "defaultScheduleDelivery",
            Scenario::MailTestDelivery { .. } => "mailTestDelivery",
            Scenario::SmtpUnreachable => "smtpUnreachable",
        }
    }

    /// Look a scenario up by name
    ///
    /// `mailTestDelivery` needs a recipient handle and is `None` without one.
    pub fn from_name(name: &str, mail_test_recipient: Option<&str>) -> Option<Scenario> {
        if name == "smtpUnreachable" {
            return Some(Scenario::SmtpUnreachable);
        }
        if name == "mailTestDelivery" {
            return mail_test_recipient.map(|handle| Scenario::MailTestDelivery {
                handle: handle.to_string(),
            });
        }
        Self::catalogue(None).into_iter().find(|s| s.name() == name)
    }

    /// Whether the scenario makes the notifier send mail
    pub fn delivers_mail(&self) -> bool {
        matches!(
            self,
            Scenario::DefaultScheduleDelivery
                | Scenario::MailTestDelivery { .. }
                | Scenario::SmtpUnreachable
        )
    }

    pub fn execute(&self, runner: &ScenarioRunner<'_>) -> Result<ScenarioReport> {
        let mut report = ScenarioReport::new(self.name());
        let fixture = runner.fixture();
        let mut scope = fixture.scope();
        let domain = fixture.domain().to_string();

        match self {
            Scenario::EmptyState => {
                let results = runner.invoke_both(&NotifierOptions::new().with_dry_run())?;
                report.push(runner.check_paths("dry run", &results));
                report.extend(runner.check_oracle("dry run", &results, &BTreeSet::new()));
            }

            Scenario::SingleUserWindow => {
                let now = scope.now();
                let identities = IdentitySet::from_records(vec![
                    IdentityRecord::new("testuser0")
                        .with_names("test", "user")
                        .with_mail(format!("testuser0@{}", domain)),
                    IdentityRecord::new("testuser1")
                        .with_names("test", "user")
                        .with_mail(format!("testuser1@{}", domain))
                        .expiring_in(now, 7),
                ])?;
                scope.seed(&identities)?;
                for (from, to) in [(6, 7), (7, 8), (8, 9), (0, 30)] {
                    let window = NotificationWindow::new(from, to)?;
                    verify_window(runner, &scope, &mut report, &identities, window)?;
                }
            }

            Scenario::DefaultSchedule => {
                let identities = seed_population(&mut scope, &domain)?;
                let plan = NotificationPlan::Schedule(runner.schedule().to_vec());
                let expected = expected_for_plan(&identities, &plan, scope.seeded_at());
                let results = runner.invoke_both(&NotifierOptions::new().with_dry_run())?;
                report.push(runner.check_paths("schedule", &results));
                report.extend(runner.check_oracle("schedule", &results, &expected));
            }

            Scenario::SlidingWindows => {
                let identities = seed_population(&mut scope, &domain)?;
                for &ttl in runner.schedule() {
                    for handle in [format!("user{}", ttl), format!("user{}", ttl - 1)] {
                        scope.watch_mailbox(&handle)?;
                    }

                    verify_window(
                        runner,
                        &scope,
                        &mut report,
                        &identities,
                        NotificationWindow::single_day(ttl),
                    )?;

                    let label = format!("--to-nbdays {}", ttl);
                    let options = NotifierOptions::new().with_to(ttl);
                    let expected = expected_in_window(
                        &identities,
                        &NotificationWindow::ending_at(ttl),
                        scope.seeded_at(),
                    );
                    let results = runner.invoke_both(&options)?;
                    report.push(runner.check_paths(&label, &results));
                    report.extend(runner.check_oracle(&label, &results, &expected));

                    for handle in [format!("user{}", ttl), format!("user{}", ttl - 1)] {
                        report.push(expect_no_mail(&scope, &label, &handle)?);
                    }
                }
            }

            Scenario::RangeContainment => {
                let identities = seed_population(&mut scope, &domain)?;
                for (from, to) in RANGES {
                    let window = NotificationWindow::new(from, to)?;
                    verify_window(runner, &scope, &mut report, &identities, window)?;
                }

                // a range is a dry run even without --dry-run
                let window = NotificationWindow::new(7, 15)?;
                for day in window.from_days()..window.to_days() {
                    scope.watch_mailbox(&format!("user{}", day))?;
                }
                let label = "--from-nbdays 7 --to-nbdays 15";
                let options = NotifierOptions::new()
                    .with_from(window.from_days())
                    .with_to(window.to_days());
                let expected = expected_in_window(&identities, &window, scope.seeded_at());
                let results = runner.invoke_both(&options)?;
                report.push(runner.check_paths(label, &results));
                report.extend(runner.check_oracle(label, &results, &expected));
                for day in window.from_days()..window.to_days() {
                    report.push(expect_no_mail(&scope, label, &format!("user{}", day))?);
                }
            }

            Scenario::UpperBoundImpliesDryRun => {
                let identities = seed_population(&mut scope, &domain)?;
                scope.watch_mailbox("user4")?;
                let expected = expected_in_window(
                    &identities,
                    &NotificationWindow::ending_at(5),
                    scope.seeded_at(),
                );
                let results = runner.invoke_both(&NotifierOptions::new().with_to(5))?;
                report.push(runner.check_paths("--to-nbdays 5", &results));
                report.extend(runner.check_oracle("--to-nbdays 5", &results, &expected));
                report.push(expect_no_mail(&scope, "--to-nbdays 5", "user4")?);
            }

            Scenario::MissingUpperBound => {
                verify_rejected(
                    runner,
                    &mut report,
                    NotifierOptions::new().with_from(3),
                    ErrorKind::MissingUpperBound,
                )?;
            }

            Scenario::AlphaUpperBound => {
                verify_rejected(
                    runner,
                    &mut report,
                    NotifierOptions::new().with_raw_to("abc"),
                    ErrorKind::InvalidUpperBound,
                )?;
            }

            Scenario::DecimalUpperBound => {
                verify_rejected(
                    runner,
                    &mut report,
                    NotifierOptions::new().with_raw_to("7.3"),
                    ErrorKind::InvalidUpperBound,
                )?;
            }

            Scenario::InvertedRange => {
                verify_rejected(
                    runner,
                    &mut report,
                    NotifierOptions::new().with_from(9).with_to(7),
                    ErrorKind::RangeInverted,
                )?;
            }

            Scenario::MailTestDryRunConflict => {
                verify_rejected(
                    runner,
                    &mut report,
                    NotifierOptions::new().with_mail_test().with_dry_run(),
                    ErrorKind::ConflictingModes,
                )?;
            }

            Scenario::Idempotence => {
                let identities = seed_population(&mut scope, &domain)?;
                let options = NotifierOptions::new().with_dry_run();
                let first = runner.invoke_both(&options)?;
                let second = runner.invoke_both(&options)?;
                report.push(runner.check_paths("first run", &first));
                report.push(runner.check_paths("second run", &second));
                report.push(same_output("first and second run agree", &first.0, &second.0));
                report.push(same_output("first and second run agree", &first.1, &second.1));

                let plan = NotificationPlan::Schedule(runner.schedule().to_vec());
                let expected = expected_for_plan(&identities, &plan, scope.seeded_at());
                report.extend(runner.check_oracle("second run", &second, &expected));
            }

            Scenario::MissingMailAddress => {
                let now = scope.now();
                let identities = IdentitySet::from_records(vec![IdentityRecord::new("nomail0")
                    .with_names("test", "user")
                    .expiring_in(now, 7)])?;
                scope.seed(&identities)?;
                let results = runner.invoke_both(&NotifierOptions::new().with_dry_run())?;
                report.push(runner.check_paths("dry run", &results));
                for result in [&results.0, &results.1] {
                    report.push(Check::new(
                        "dry run: missing mail address reported",
                        if result.stderr_text().contains("uid=nomail0") {
                            Ok(())
                        } else {
                            Err(Mismatch::Check(format!(
                                "stderr does not name uid=nomail0: {:?}",
                                result.stderr_text()
                            )))
                        },
                    ));
                }
            }

            Scenario::BulkPopulation => {
                let plan = BatchPlan::default();
                let batch =
                    plan.generate(scope.now(), &domain, BATCH_PASSWORD, &mut rand::thread_rng())?;
                scope.seed(&batch.identities)?;
                let window = NotificationWindow::new(0, plan.max_days as i64 + 1)?;
                verify_window(runner, &scope, &mut report, &batch.identities, window)?;

                let schedule = NotificationPlan::Schedule(runner.schedule().to_vec());
                let expected = expected_for_plan(&batch.identities, &schedule, scope.seeded_at());
                let results = runner.invoke_both(&NotifierOptions::new().with_dry_run())?;
                report.push(runner.check_paths("schedule", &results));
                report.extend(runner.check_oracle("schedule", &results, &expected));
            }

            Scenario::DefaultScheduleDelivery => {
                seed_population(&mut scope, &domain)?;
                let scheduled: Vec<i64> = runner
                    .schedule()
                    .iter()
                    .copied()
                    .filter(|day| (0..i64::from(POPULATION)).contains(day))
                    .collect();
                let unscheduled: Vec<i64> = (0..i64::from(POPULATION))
                    .filter(|day| !scheduled.contains(day))
                    .take(2)
                    .collect();
                for day in scheduled.iter().chain(&unscheduled) {
                    scope.watch_mailbox(&format!("user{}", day))?;
                }

                let result = runner.left().invoke(&NotifierOptions::new())?;
                report.push(expect_delivery_run(runner.left().name(), &result));

                for day in &scheduled {
                    let handle = format!("user{}", day);
                    let expected = ExpectedMail {
                        to: format!("{}@{}", handle, domain),
                        from: format!("{} <noreply@{}>", DEFAULT_FROM_NAME, domain),
                        subject: DEFAULT_SUBJECT.to_string(),
                        body_contains: DEFAULT_BODY.to_string(),
                    };
                    report.push(expect_mail(&scope, &handle, &expected)?);
                }
                for day in &unscheduled {
                    report.push(expect_no_mail(&scope, "delivery", &format!("user{}", day))?);
                }
            }

            Scenario::MailTestDelivery { handle } => {
                scope.watch_mailbox(handle)?;
                let result = runner.left().invoke(&NotifierOptions::new().with_mail_test())?;
                report.push(expect_delivery_run(runner.left().name(), &result));
                let expected = ExpectedMail {
                    to: format!("{}@{}", handle, domain),
                    from: format!("{} <noreply@{}>", DEFAULT_FROM_NAME, domain),
                    subject: DEFAULT_SUBJECT.to_string(),
                    body_contains: MAIL_TEST_BODY.to_string(),
                };
                report.push(expect_mail(&scope, handle, &expected)?);
            }

            Scenario::SmtpUnreachable => {
                seed_population(&mut scope, &domain)?;
                let results = runner.invoke_both(&NotifierOptions::new())?;
                report.extend(runner.check_failure("delivery", &results, ErrorKind::SmtpUnreachable));
            }
        }

        runner.note_day_crossing(&mut report, scope.seeded_at());
        Ok(report)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn seed_population(scope: &mut FixtureScope<'_>, domain: &str) -> Result<IdentitySet> {
    let identities = incremental_population(POPULATION, scope.now(), domain)?;
    scope.seed(&identities)?;
    Ok(identities)
}

/// Dry run over `window` on both paths, checked against the oracle
fn verify_window(
    runner: &ScenarioRunner<'_>,
    scope: &FixtureScope<'_>,
    report: &mut ScenarioReport,
    identities: &IdentitySet,
    window: NotificationWindow,
) -> Result<()> {
    let label = format!("[{}, {})", window.from_days(), window.to_days());
    let options = NotifierOptions::new()
        .with_from(window.from_days())
        .with_to(window.to_days())
        .with_dry_run();
    let expected = expected_in_window(identities, &window, scope.seeded_at());
    let results = runner.invoke_both(&options)?;
    report.push(runner.check_paths(&label, &results));
    report.extend(runner.check_oracle(&label, &results, &expected));
    Ok(())
}

fn verify_rejected(
    runner: &ScenarioRunner<'_>,
    report: &mut ScenarioReport,
    options: NotifierOptions,
    kind: ErrorKind,
) -> Result<()> {
    let label = options.to_args().join(" ");
    let results = runner.invoke_both(&options)?;
    report.push(runner.check_paths(&label, &results));
    report.extend(runner.check_failure(&label, &results, kind));
    Ok(())
}

fn same_output(name: &str, first: &ScenarioResult, second: &ScenarioResult) -> Check {
    Check::new(
        name,
        if first.stdout == second.stdout && first.exit_code == second.exit_code {
            Ok(())
        } else {
            Err(Mismatch::Check(format!(
                "output changed between runs: {:?} then {:?}",
                first.stdout_text(),
                second.stdout_text()
            )))
        },
    )
}

fn expect_delivery_run(path: &str, result: &ScenarioResult) -> Check {
    Check::new(
        format!("{}: delivery run succeeds", path),
        if result.exit_code == 0 && result.stdout.is_empty() {
            Ok(())
        } else {
            Err(Mismatch::UnexpectedOutcome {
                expected: "exit 0 with empty stdout".to_string(),
                actual: format!(
                    "exit {} with stdout {:?} and stderr {:?}",
                    result.exit_code,
                    result.stdout_text(),
                    result.stderr_text()
                ),
            })
        },
    )
}

fn expect_mail(scope: &FixtureScope<'_>, handle: &str, expected: &ExpectedMail) -> Result<Check> {
    let name = format!("mail to {}", handle);
    Ok(match scope.read_mail(handle)? {
        Some(message) => Check::new(name, message.validate(expected)),
        None => Check::new(name, Err(Mismatch::Mail(format!("nothing delivered to {}", handle)))),
    })
}

fn expect_no_mail(scope: &FixtureScope<'_>, label: &str, handle: &str) -> Result<Check> {
    let name = format!("{}: no mail to {}", label, handle);
    Ok(if scope.has_mail(handle)? {
        Check::new(name, Err(Mismatch::Mail(format!("unexpected mail delivered to {}", handle))))
    } else {
        Check::pass(name)
    })
}
