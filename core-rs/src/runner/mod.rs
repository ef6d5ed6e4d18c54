//! Scenario runner
//!
//! Seeds identities through an [`EnvironmentFixture`], invokes the notifier
//! over two [`AccessPath`]s with identical options and collects named
//! [`Check`]s into a [`ScenarioReport`].
//!
//! Notifier-side failures are results, not errors: `run_scenario` only
//! returns `Err` when the environment itself breaks (seeding fails, a
//! process cannot be spawned).

pub mod fixture;
pub mod scenarios;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::capture::ScenarioResult;
use crate::clock::crosses_utc_day;
use crate::compare::{
    compare_to_oracle, expect_failure, expect_same_across_paths, ErrorKind, Mismatch,
};
use crate::errors::Result;
use crate::identity::IdentitySet;
use crate::notifier::{AccessPath, NotifierOptions};
use crate::window::DEFAULT_NOTIFY_TTLS;

pub use fixture::{EnvironmentFixture, FixtureScope};
pub use scenarios::Scenario;

/// One named assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub outcome: std::result::Result<(), Mismatch>,
}

impl Check {
    pub fn new(name: impl Into<String>, outcome: std::result::Result<(), Mismatch>) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }

    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, Ok(()))
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Checks of one scenario
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub scenario: String,
    pub checks: Vec<Check>,
    pub warnings: Vec<String>,
}

impl ScenarioReport {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    pub fn extend(&mut self, checks: impl IntoIterator<Item = Check>) {
        self.checks.extend(checks);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// True iff every check passed
    pub fn passed(&self) -> bool {
        self.checks.iter().all(Check::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed())
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            scenario: self.scenario.clone(),
            passed: self.passed(),
            checks: self.checks.len(),
            failures: self
                .failures()
                .map(|c| match &c.outcome {
                    Err(e) => format!("{}: {}", c.name, e),
                    Ok(()) => c.name.clone(),
                })
                .collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Serializable digest of a report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub scenario: String,
    pub passed: bool,
    pub checks: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

/// Drives two access paths against one fixture
pub struct ScenarioRunner<'a> {
    fixture: &'a EnvironmentFixture,
    left: &'a dyn AccessPath,
    right: &'a dyn AccessPath,
    schedule: Vec<i64>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(
        fixture: &'a EnvironmentFixture,
        left: &'a dyn AccessPath,
        right: &'a dyn AccessPath,
    ) -> Self {
        Self {
            fixture,
            left,
            right,
            schedule: DEFAULT_NOTIFY_TTLS.to_vec(),
        }
    }

    /// Notification days the notifiers are configured with
    pub fn with_schedule(mut self, schedule: Vec<i64>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn fixture(&self) -> &EnvironmentFixture {
        self.fixture
    }

    pub fn schedule(&self) -> &[i64] {
        &self.schedule
    }

    pub fn left(&self) -> &dyn AccessPath {
        self.left
    }

    /// Invoke each path once with the same options
    pub fn invoke_both(&self, options: &NotifierOptions) -> Result<(ScenarioResult, ScenarioResult)> {
        let left = self.left.invoke(options)?;
        let right = self.right.invoke(options)?;
        Ok((left, right))
    }

    /// Seed `identities`, invoke both paths, tear down
    pub fn run_scenario(
        &self,
        identities: &IdentitySet,
        options: &NotifierOptions,
    ) -> Result<(ScenarioResult, ScenarioResult)> {
        let mut scope = self.fixture.scope();
        scope.seed(identities)?;
        self.invoke_both(options)
    }

    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        info!(scenario = %scenario.name(), "running scenario");
        let report = scenario.execute(self)?;
        if report.passed() {
            info!(scenario = %scenario.name(), "passed");
        } else {
            warn!(scenario = %scenario.name(), failures = report.failures().count(), "failed");
        }
        Ok(report)
    }

    pub fn run_all(&self, scenarios: &[Scenario]) -> Result<Vec<ScenarioReport>> {
        scenarios.iter().map(|s| self.run(s)).collect()
    }

    /// Both paths agree byte for byte
    pub fn check_paths(&self, label: &str, results: &(ScenarioResult, ScenarioResult)) -> Check {
        Check::new(
            format!("{}: access paths agree", label),
            expect_same_across_paths(self.left.name(), &results.0, self.right.name(), &results.1),
        )
    }

    /// Both results list exactly `expected`
    pub fn check_oracle(
        &self,
        label: &str,
        results: &(ScenarioResult, ScenarioResult),
        expected: &BTreeSet<String>,
    ) -> Vec<Check> {
        [(self.left.name(), &results.0), (self.right.name(), &results.1)]
            .into_iter()
            .map(|(name, result)| {
                Check::new(
                    format!("{}: {} matches expected set", label, name),
                    compare_to_oracle(result, expected).and_then(|diff| diff.into_result()),
                )
            })
            .collect()
    }

    /// Both results are clean failures of `kind`
    pub fn check_failure(
        &self,
        label: &str,
        results: &(ScenarioResult, ScenarioResult),
        kind: ErrorKind,
    ) -> Vec<Check> {
        [(self.left.name(), &results.0), (self.right.name(), &results.1)]
            .into_iter()
            .map(|(name, result)| {
                Check::new(
                    format!("{}: {} reports {}", label, name, kind),
                    expect_failure(result, kind),
                )
            })
            .collect()
    }

    /// Warn when verification runs on a later UTC day than seeding
    pub fn note_day_crossing(&self, report: &mut ScenarioReport, seeded_at: DateTime<Utc>) {
        let now = self.fixture.now();
        if crosses_utc_day(seeded_at, now) {
            warn!(%seeded_at, %now, "scenario crossed UTC midnight");
            report.warn(format!(
                "seeded at {} and verified at {}: offsets may have shifted by a day",
                seeded_at, now
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_passes_only_when_every_check_passes() {
        let mut report = ScenarioReport::new("emptyState");
        report.push(Check::pass("first"));
        assert!(report.passed());
        report.push(Check::new("second", Err(Mismatch::Check("boom".to_string()))));
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);

        let summary = report.summary();
        assert!(!summary.passed);
        assert_eq!(summary.checks, 2);
        assert_eq!(summary.failures, vec!["second: boom"]);
    }

    #[test]
    fn test_empty_report_passes() {
        assert!(ScenarioReport::new("nothing").passed());
    }
}
