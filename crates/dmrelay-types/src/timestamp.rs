//! Strict millisecond timestamps.
//!
//! Every timestamp that crosses an ingestion boundary (inbound gateway
//! payloads, bulk import documents, rows read back from storage) goes through
//! [`Timestamp::from_millis`] or [`Timestamp::parse`]. Values are positive
//! integer milliseconds since the Unix epoch; anything else is rejected.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TimestampError;

/// Marker rendered instead of a date when a timestamp falls outside the
/// plausible window.
pub const INVALID_DATE: &str = "Invalid date";

/// Positive integer milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimestamp", into = "i64")]
pub struct Timestamp(i64);

impl Timestamp {
    /// 2020-01-01T00:00:00Z.
    pub const PLAUSIBLE_MIN: i64 = 1_577_836_800_000;
    /// 2031-01-01T00:00:00Z (exclusive).
    pub const PLAUSIBLE_MAX: i64 = 1_924_992_000_000;

    /// Accept an integer millisecond value. Zero and negatives are rejected.
    pub fn from_millis(millis: i64) -> Result<Self, TimestampError> {
        if millis <= 0 {
            return Err(TimestampError::NonPositive(millis));
        }
        Ok(Self(millis))
    }

    /// Parse a value that must consist solely of ASCII digits.
    ///
    /// No trimming, signs, or decimal points are accepted.
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::NotNumeric(raw.to_string()));
        }
        let millis = raw
            .parse::<i64>()
            .map_err(|_| TimestampError::NotNumeric(raw.to_string()))?;
        Self::from_millis(millis)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis().max(1))
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Whether the value lies inside the window the dashboard can render.
    pub fn is_plausible(self) -> bool {
        (Self::PLAUSIBLE_MIN..Self::PLAUSIBLE_MAX).contains(&self.0)
    }

    /// Convert to a `DateTime`, or `None` outside the plausible window.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if !self.is_plausible() {
            return None;
        }
        DateTime::from_timestamp_millis(self.0)
    }

    /// Human-readable rendering for the dashboard.
    ///
    /// Implausible values render as [`INVALID_DATE`] rather than a wrong
    /// date. Stored data is never touched by this check.
    pub fn display(self) -> String {
        match self.to_datetime() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => INVALID_DATE.to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl TryFrom<i64> for Timestamp {
    type Error = TimestampError;

    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        Self::from_millis(millis)
    }
}

/// Wire shape accepted on deserialization: a JSON number or a digit string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl TryFrom<RawTimestamp> for Timestamp {
    type Error = TimestampError;

    fn try_from(raw: RawTimestamp) -> Result<Self, Self::Error> {
        match raw {
            RawTimestamp::Millis(millis) => Self::from_millis(millis),
            RawTimestamp::Text(text) => Self::parse(&text),
        }
    }
}
