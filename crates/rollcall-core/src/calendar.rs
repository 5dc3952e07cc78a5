//! Calendar-date policy.
//!
//! Attendance is deduplicated per calendar day. Which day an instant falls on
//! depends on the timezone, so the policy is explicit and shared by the code
//! that writes records and the code that checks them.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CalendarError {
    #[error("unknown timezone policy {0:?}, expected \"local\", \"utc\" or an offset like \"+02:00\"")]
    UnknownPolicy(String),
}

/// Timezone used to turn a timestamp into a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatePolicy {
    /// Host timezone.
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl DatePolicy {
    /// Calendar date of an epoch-millisecond timestamp.
    ///
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn date_of(&self, timestamp_ms: i64) -> Option<NaiveDate> {
        let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?;
        Some(self.split(utc).0)
    }

    /// Calendar date of `now` under this policy.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.split(now).0
    }

    /// Wall-clock date and time of `now` under this policy.
    pub fn split(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let naive = match self {
            DatePolicy::Local => Local.from_utc_datetime(&now.naive_utc()).naive_local(),
            DatePolicy::Utc => now.naive_utc(),
            DatePolicy::Fixed(offset) => offset.from_utc_datetime(&now.naive_utc()).naive_local(),
        };
        (naive.date(), naive.time())
    }
}

impl FromStr for DatePolicy {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DatePolicy::Local),
            "utc" | "z" => Ok(DatePolicy::Utc),
            other => other
                .parse::<FixedOffset>()
                .map(DatePolicy::Fixed)
                .map_err(|_| CalendarError::UnknownPolicy(s.to_string())),
        }
    }
}

impl TryFrom<String> for DatePolicy {
    type Error = CalendarError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DatePolicy> for String {
    fn from(policy: DatePolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for DatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatePolicy::Local => f.write_str("local"),
            DatePolicy::Utc => f.write_str("utc"),
            DatePolicy::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}
