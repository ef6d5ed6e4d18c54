//! Time model
//!
//! Everything that depends on "now" takes a [`Clock`] so scenarios can pin the
//! instant. A suite that seeds identities shortly before UTC midnight and
//! verifies shortly after will legitimately see offsets shift by one day;
//! [`crosses_utc_day`] lets callers report that instead of hiding it.
//!
//! ## Wire format
//!
//! The identity store exchanges instants as LDAP generalized time:
//! `YYYYMMDDHHMMSSZ` (four-digit year, every other field two digits, literal
//! `Z`). Formatting and parsing round-trip at one-second precision.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, SubsecRound, TimeZone, Utc};

use crate::errors::{EpnError, Result};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// chrono format string for the wire timestamp
pub const WIRE_FORMAT: &str = "%Y%m%d%H%M%SZ";

const WIRE_LEN: usize = 15;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Pin the clock to a wire-format timestamp
    pub fn from_wire(text: &str) -> Result<Self> {
        parse_wire_timestamp(text).map(Self)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Signed whole days from `now` to `instant`, rounded toward negative infinity
///
/// `floor((instant - now) / 86400s)`. Sub-second remainders count, so an
/// instant half a second in the past is day `-1`, not day `0`.
pub fn to_offset_days(instant: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = instant - now;
    let mut seconds = delta.num_seconds();
    if delta - Duration::seconds(seconds) < Duration::zero() {
        seconds -= 1;
    }
    seconds.div_euclid(SECONDS_PER_DAY)
}

/// Whole UTC calendar days from the day of `now` to the day of `instant`
///
/// This is how a deployed notifier queries the directory: day `t` covers
/// every expiration between midnight and midnight `t` days ahead, whatever
/// the time of day of `now`.
pub fn to_calendar_offset_days(instant: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (instant.date_naive() - now.date_naive()).num_days()
}

/// `instant` truncated to the one-second precision of the wire format
pub fn whole_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

/// Instant `days` whole days after `now` (negative days go back in time)
pub fn offset_instant(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now + Duration::days(days)
}

/// True when the two instants fall on different UTC calendar days
pub fn crosses_utc_day(earlier: DateTime<Utc>, later: DateTime<Utc>) -> bool {
    earlier.date_naive() != later.date_naive()
}

/// Render an instant as `YYYYMMDDHHMMSSZ`
///
/// Sub-second precision is dropped. Years outside `0..=9999` cannot be
/// expressed in four digits and are rejected.
pub fn format_wire_timestamp(instant: DateTime<Utc>) -> Result<String> {
    let year = instant.year();
    if !(0..=9999).contains(&year) {
        return Err(EpnError::WireTimestamp(format!(
            "year {} does not fit the four-digit wire format",
            year
        )));
    }
    Ok(instant.format(WIRE_FORMAT).to_string())
}

/// Parse `YYYYMMDDHHMMSSZ` back into an instant
pub fn parse_wire_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let digits = text.strip_suffix('Z').ok_or_else(|| {
        EpnError::WireTimestamp(format!("'{}' is missing the trailing Z", text))
    })?;

    // chrono accepts short fields; the wire form is fixed-width
    if text.len() != WIRE_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EpnError::WireTimestamp(format!(
            "'{}' is not of the form YYYYMMDDHHMMSSZ",
            text
        )));
    }

    let naive = NaiveDateTime::parse_from_str(text, WIRE_FORMAT)
        .map_err(|e| EpnError::WireTimestamp(format!("'{}': {}", text, e)))?;

    Ok(Utc.from_utc_datetime(&naive))
}

/// serde adapter storing `DateTime<Utc>` as a wire timestamp string
pub mod wire_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(instant: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = super::format_wire_timestamp(*instant).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_wire_timestamp(&text).map_err(serde::de::Error::custom)
    }

    /// Same adapter for `Option<DateTime<Utc>>`
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(
            instant: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match instant {
                Some(instant) => super::serialize(instant, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let text: Option<String> = Option::deserialize(deserializer)?;
            text.map(|t| crate::clock::parse_wire_timestamp(&t).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
