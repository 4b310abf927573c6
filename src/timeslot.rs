use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minutes in one day; every `TimeOfDay` is strictly below this.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time with minute resolution, stored as minutes since midnight.
///
/// Parsed from and rendered as `HH:MM` (24-hour). The hour may be written with
/// a single digit on input (`9:30`), the minutes always take two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour as u16 * 60 + minute as u16))
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TimeParseError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !digits(h) || h.len() > 2 || !digits(m) || m.len() != 2 {
            return Err(err());
        }
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        Self::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError(pub String);

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time {:?}: expected HH:MM (24-hour)", self.0)
    }
}

impl std::error::Error for TimeParseError {}

/// Window used for slot suggestions when neither the deployment nor the venue
/// configures one: 09:00-23:00.
pub const DEFAULT_BUSINESS_HOURS: TimeRange = TimeRange {
    start: TimeOfDay(9 * 60),
    end: TimeOfDay(23 * 60),
};

/// Half-open time-of-day interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    /// Returns `None` for zero-length or inverted ranges.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn duration(&self) -> SlotDuration {
        duration(self.start, self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for TimeRange {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s.split_once('-').ok_or_else(|| TimeParseError(s.to_string()))?;
        Self::new(a.parse()?, b.parse()?).ok_or_else(|| TimeParseError(s.to_string()))
    }
}

impl TryFrom<String> for TimeRange {
    type Error = TimeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeRange> for String {
    fn from(r: TimeRange) -> Self {
        r.to_string()
    }
}

/// Half-open overlap test: `start1 < end2 && end1 > start2`.
/// Touching intervals (`end1 == start2`) do not overlap.
pub fn overlaps(start1: TimeOfDay, end1: TimeOfDay, start2: TimeOfDay, end2: TimeOfDay) -> bool {
    start1 < end2 && end1 > start2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDuration {
    pub hours: u32,
    pub minutes: u32,
    pub total_minutes: u32,
    pub display: String,
}

/// Decompose `end - start`. Callers guarantee `end > start`; an inverted pair
/// saturates to zero rather than wrapping.
pub fn duration(start: TimeOfDay, end: TimeOfDay) -> SlotDuration {
    let total = end.minutes().saturating_sub(start.minutes()) as u32;
    let (hours, minutes) = (total / 60, total % 60);
    SlotDuration {
        hours,
        minutes,
        total_minutes: total,
        display: format!("{hours}h {minutes}m"),
    }
}

/// Consecutive slots of exactly `slot_minutes` covering `[day_start, day_end)`.
/// A trailing partial slot is dropped. The iterator is `Clone`, so a copy taken
/// before consumption replays the same sequence.
pub fn generate_slots(day_start: TimeOfDay, day_end: TimeOfDay, slot_minutes: u16) -> Slots {
    Slots {
        next_start: day_start.minutes(),
        day_end: day_end.minutes(),
        step: slot_minutes,
    }
}

#[derive(Debug, Clone)]
pub struct Slots {
    next_start: u16,
    day_end: u16,
    step: u16,
}

impl Iterator for Slots {
    type Item = TimeRange;

    fn next(&mut self) -> Option<TimeRange> {
        if self.step == 0 {
            return None;
        }
        let end = self.next_start.checked_add(self.step)?;
        if end > self.day_end {
            return None;
        }
        let slot = TimeRange {
            start: TimeOfDay::from_minutes(self.next_start)?,
            // day_end < MINUTES_PER_DAY, so end is a valid time of day.
            end: TimeOfDay::from_minutes(end)?,
        };
        self.next_start = end;
        Some(slot)
    }
}
