//! Notification windows
//!
//! A window is the half-open day-offset range `[from_days, to_days)`: an
//! identity is due when its expiration offset `d` satisfies
//! `from_days <= d < to_days`.
//!
//! Command-line bounds arrive as raw text and are validated in a fixed order
//! (see [`NotificationWindow::from_args`]) so that each malformed input maps
//! to exactly one diagnostic.
//!
//! When no bounds are given the notifier falls back to its schedule of
//! notification days ([`NotificationPlan::Schedule`]), each day `t` meaning the
//! one-day window `[t, t + 1)`.

pub mod oracle;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub use oracle::{expected_for_plan, expected_in_window};

/// Days before expiration at which users are notified by default
pub const DEFAULT_NOTIFY_TTLS: [i64; 5] = [28, 14, 7, 3, 1];

/// Half-open day-offset range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWindow {
    from_days: i64,
    to_days: i64,
}

impl NotificationWindow {
    pub fn new(from_days: i64, to_days: i64) -> Result<Self, ConfigError> {
        if from_days >= to_days {
            return Err(ConfigError::RangeInverted {
                from: from_days,
                to: to_days,
            });
        }
        Ok(Self { from_days, to_days })
    }

    /// `[day, day + 1)`
    pub fn single_day(day: i64) -> Self {
        Self {
            from_days: day,
            to_days: day + 1,
        }
    }

    /// `[to_days - 1, to_days)`, the meaning of a lone upper bound
    pub fn ending_at(to_days: i64) -> Self {
        Self::single_day(to_days - 1)
    }

    /// Validate raw `--from-nbdays` / `--to-nbdays` values
    ///
    /// Checks, in order:
    /// 1. a lower bound without an upper bound
    /// 2. the upper bound is a positive integer
    /// 3. the lower bound is a non-negative integer
    /// 4. the lower bound is below the upper bound
    ///
    /// Returns `Ok(None)` when neither bound is given.
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Option<Self>, ConfigError> {
        let to_text = match (from, to) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(ConfigError::MissingUpperBound),
            (_, Some(to_text)) => to_text,
        };

        let to_days = parse_integer(to_text)
            .filter(|v| *v > 0)
            .ok_or_else(|| ConfigError::InvalidUpperBound(to_text.to_string()))?;

        match from {
            None => Ok(Some(Self::ending_at(to_days))),
            Some(from_text) => {
                let from_days = parse_integer(from_text)
                    .filter(|v| *v >= 0)
                    .ok_or_else(|| ConfigError::InvalidLowerBound(from_text.to_string()))?;
                Self::new(from_days, to_days).map(Some)
            }
        }
    }

    pub fn from_days(&self) -> i64 {
        self.from_days
    }

    pub fn to_days(&self) -> i64 {
        self.to_days
    }

    pub fn contains(&self, offset_days: i64) -> bool {
        self.from_days <= offset_days && offset_days < self.to_days
    }

    /// Offsets covered by the window, ascending
    pub fn offsets(&self) -> std::ops::Range<i64> {
        self.from_days..self.to_days
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// What a notifier run selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationPlan {
    /// One-day windows at each listed offset
    Schedule(Vec<i64>),
    Window(NotificationWindow),
}

impl NotificationPlan {
    pub fn default_schedule() -> Self {
        NotificationPlan::Schedule(DEFAULT_NOTIFY_TTLS.to_vec())
    }

    /// Window from raw bounds, or the given schedule when none are set
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        schedule: &[i64],
    ) -> Result<Self, ConfigError> {
        Ok(match NotificationWindow::from_args(from, to)? {
            Some(window) => NotificationPlan::Window(window),
            None => NotificationPlan::Schedule(schedule.to_vec()),
        })
    }

    pub fn contains(&self, offset_days: i64) -> bool {
        match self {
            NotificationPlan::Schedule(days) => days
                .iter()
                .any(|day| NotificationWindow::single_day(*day).contains(offset_days)),
            NotificationPlan::Window(window) => window.contains(offset_days),
        }
    }
}

impl Default for NotificationPlan {
    fn default() -> Self {
        Self::default_schedule()
    }
}

impl From<NotificationWindow> for NotificationPlan {
    fn from(window: NotificationWindow) -> Self {
        NotificationPlan::Window(window)
    }
}
