//! Arrival timestamps with nanosecond precision
//!
//! Station reports carry nine fractional digits. The instant itself is kept
//! at microsecond resolution and the remaining three digits travel alongside
//! as a separate remainder, so differences between stations can be taken
//! exactly at the nanosecond level.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::error::{LocatorError, LocatorResult};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NANOS_PER_MICRO: i64 = 1_000;

/// UTC instant at microsecond resolution plus a 0-999 nanosecond remainder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NanosecondTimestamp {
    timestamp: DateTime<Utc>,
    nanoseconds: u16,
}

impl NanosecondTimestamp {
    /// Combines a microsecond instant with a nanosecond remainder.
    ///
    /// Fails if `timestamp` carries sub-microsecond digits or the remainder
    /// exceeds 999.
    pub fn new(timestamp: DateTime<Utc>, nanoseconds: u16) -> LocatorResult<Self> {
        if nanoseconds > 999 {
            return Err(LocatorError::InvalidEvent {
                reason: format!("nanosecond remainder {} exceeds 999", nanoseconds),
            });
        }
        if timestamp.nanosecond() % 1_000 != 0 {
            return Err(LocatorError::InvalidEvent {
                reason: format!("timestamp {} is finer than one microsecond", timestamp),
            });
        }
        Ok(Self { timestamp, nanoseconds })
    }

    /// Splits a nanosecond-precise instant into microseconds and remainder
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        let sub_micro = datetime.nanosecond() % 1_000;
        let timestamp = datetime
            .with_nanosecond(datetime.nanosecond() - sub_micro)
            .unwrap_or(datetime);
        Self { timestamp, nanoseconds: sub_micro as u16 }
    }

    /// Nanoseconds since the Unix epoch
    pub fn from_unix_nanos(nanos: i64) -> Option<Self> {
        let micros = nanos.div_euclid(NANOS_PER_MICRO);
        let nanoseconds = nanos.rem_euclid(NANOS_PER_MICRO) as u16;
        DateTime::from_timestamp_micros(micros).map(|timestamp| Self { timestamp, nanoseconds })
    }

    /// The microsecond part
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn nanoseconds(&self) -> u16 {
        self.nanoseconds
    }

    /// The full instant including the nanosecond remainder
    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.timestamp + TimeDelta::nanoseconds(self.nanoseconds as i64)
    }

    /// Nanoseconds since the Unix epoch
    pub fn unix_nanos(&self) -> i128 {
        self.timestamp.timestamp_micros() as i128 * NANOS_PER_MICRO as i128
            + self.nanoseconds as i128
    }

    /// Signed time from `self` to `other` in nanoseconds.
    ///
    /// The microsecond delta and the remainder delta are combined in integer
    /// arithmetic. Instants more than about 292 years apart saturate at the
    /// `i64` bounds; use [`checked_ns_difference_to`](Self::checked_ns_difference_to)
    /// to detect that.
    pub fn ns_difference_to(&self, other: &NanosecondTimestamp) -> i64 {
        let difference = self.wide_difference_to(other);
        difference.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Signed time from `self` to `other` in nanoseconds, `None` if it does
    /// not fit in an `i64`
    pub fn checked_ns_difference_to(&self, other: &NanosecondTimestamp) -> Option<i64> {
        i64::try_from(self.wide_difference_to(other)).ok()
    }

    fn wide_difference_to(&self, other: &NanosecondTimestamp) -> i128 {
        other.unix_nanos() - self.unix_nanos()
    }

    /// Coarse difference of the microsecond parts
    pub fn difference_to(&self, other: &NanosecondTimestamp) -> TimeDelta {
        other.timestamp - self.timestamp
    }

    /// Shifts the instant by `offset_ns` nanoseconds
    pub fn checked_add_ns(&self, offset_ns: i64) -> Option<Self> {
        let total = (self.nanoseconds as i64).checked_add(offset_ns)?;
        let micros = self
            .timestamp
            .timestamp_micros()
            .checked_add(total.div_euclid(NANOS_PER_MICRO))?;
        let timestamp = DateTime::from_timestamp_micros(micros)?;
        Some(Self { timestamp, nanoseconds: total.rem_euclid(NANOS_PER_MICRO) as u16 })
    }
}

impl fmt::Display for NanosecondTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"), self.nanoseconds)
    }
}

impl FromStr for NanosecondTimestamp {
    type Err = LocatorError;

    /// Parses `YYYY-MM-DD HH:MM:SS[.fffffffff]`; digits past the ninth are ignored
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |detail: &str| LocatorError::InvalidEvent {
            reason: format!("cannot parse timestamp '{}': {}", value, detail),
        };

        let (seconds_part, fraction) = match value.split_once('.') {
            Some((seconds_part, fraction)) => (seconds_part, fraction),
            None => (value, ""),
        };
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("fraction is not numeric"));
        }

        let naive = NaiveDateTime::parse_from_str(seconds_part, TIME_FORMAT)
            .map_err(|e| invalid(&e.to_string()))?;

        let digits: Vec<u32> = fraction
            .bytes()
            .take(9)
            .map(|b| (b - b'0') as u32)
            .chain(std::iter::repeat(0))
            .take(9)
            .collect();
        let micros = digits[..6].iter().fold(0, |acc, d| acc * 10 + d);
        let nanoseconds = digits[6..].iter().fold(0, |acc, d| acc * 10 + d) as u16;

        let timestamp = naive.and_utc() + TimeDelta::microseconds(micros as i64);
        Self::new(timestamp, nanoseconds)
    }
}

impl TryFrom<String> for NanosecondTimestamp {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NanosecondTimestamp> for String {
    fn from(value: NanosecondTimestamp) -> Self {
        value.to_string()
    }
}
