// libs/appointment-cell/src/services/time_utils.rs
//! Wall-clock arithmetic on `HH:MM` times of day.
//!
//! Times carry no date. Adding minutes wraps modulo 24h without signalling the
//! day boundary, so callers must reject any interval whose end does not come
//! after its start.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' is not a valid HH:MM time")]
pub struct ClockTimeParseError {
    pub input: String,
}

/// A time of day with minute precision, rendered as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime { minutes: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { minutes: (hour * 60 + minute) as u16 })
        } else {
            None
        }
    }

    pub fn from_minutes(total: u32) -> Option<Self> {
        (total < MINUTES_PER_DAY).then(|| Self { minutes: total as u16 })
    }

    pub fn hour(&self) -> u32 {
        u32::from(self.minutes) / 60
    }

    pub fn minute(&self) -> u32 {
        u32::from(self.minutes) % 60
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.minutes)
    }

    pub fn add_minutes(self, minutes: i64) -> Self {
        add_minutes(self, minutes)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ClockTimeParseError;

    /// Accepts `HH:MM`, and `HH:MM:SS` as returned by SQL `time` columns
    /// (seconds are dropped).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ClockTimeParseError { input: s.to_string() };
        let trimmed = s.trim();

        let mut parts = trimmed.split(':');
        let hour = parts.next().ok_or_else(err)?;
        let minute = parts.next().ok_or_else(err)?;
        if let Some(second) = parts.next() {
            let valid = second.len() == 2
                && second.parse::<u32>().map(|s| s < 60).unwrap_or(false);
            if !valid {
                return Err(err());
            }
        }
        if parts.next().is_some() || hour.len() != 2 || minute.len() != 2 {
            return Err(err());
        }

        let hour: u32 = hour.parse().map_err(|_| err())?;
        let minute: u32 = minute.parse().map_err(|_| err())?;
        ClockTime::new(hour, minute).ok_or_else(err)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Wall-clock addition. Results at or past 24:00 wrap around.
pub fn add_minutes(time: ClockTime, minutes: i64) -> ClockTime {
    let day = i64::from(MINUTES_PER_DAY);
    let total = (i64::from(time.minutes) + minutes).rem_euclid(day);
    ClockTime { minutes: total as u16 }
}

/// Half-open overlap test on `[a_start, a_end)` and `[b_start, b_end)`.
/// Empty intervals never overlap anything.
pub fn overlaps(a_start: ClockTime, a_end: ClockTime, b_start: ClockTime, b_end: ClockTime) -> bool {
    if a_start >= a_end || b_start >= b_end {
        return false;
    }
    a_start < b_end && b_start < a_end
}

/// Same ordering as comparing the zero-padded `HH:MM` strings.
pub fn compare_time(a: ClockTime, b: ClockTime) -> Ordering {
    a.cmp(&b)
}

/// Minutes from `start` to `end`, zero when `end` does not come after `start`.
pub fn minutes_between(start: ClockTime, end: ClockTime) -> u32 {
    end.minutes_since_midnight().saturating_sub(start.minutes_since_midnight())
}
