//! Half-open time intervals.
//!
//! An [`Interval`] stores its end *inclusively* (the last millisecond inside
//! the interval) and exposes it exclusively through [`Interval::to`], so every
//! comparison outside this module works with `[from, to)` semantics.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{Result, ScheduleError};

/// The practical beginning of representable time.
pub const START_OF_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// The practical end of representable time.
pub const END_OF_TIME: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The instant one millisecond after `date`, or `None` at the end of time.
pub fn one_millis_after(date: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if date == END_OF_TIME {
        return None;
    }
    date.checked_add_signed(Duration::milliseconds(1))
}

/// The instant one millisecond before `date`, or `None` at the start of time.
pub fn one_millis_before(date: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if date == START_OF_TIME {
        return None;
    }
    date.checked_sub_signed(Duration::milliseconds(1))
}

/// An immutable half-open range of time `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    from: DateTime<Utc>,
    /// Last instant inside the interval.
    end: DateTime<Utc>,
}

impl Interval {
    /// Create the interval `[from, to)`.
    ///
    /// `to == from` collapses to the point interval at `from`. An interval
    /// ending at [`END_OF_TIME`] is open-ended.
    ///
    /// # Panics
    ///
    /// Panics if `to` is before `from`; use [`Interval::try_new`] for
    /// unchecked input.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        assert!(from <= to, "interval end {to} is before its start {from}");
        let end = if to == END_OF_TIME {
            END_OF_TIME
        } else {
            one_millis_before(to).map_or(from, |end| end.max(from))
        };
        Self { from, end }
    }

    /// Checked form of [`Interval::new`].
    pub fn try_new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if to < from {
            return Err(ScheduleError::InvalidInterval { from, to });
        }
        Ok(Self::new(from, to))
    }

    /// A point in time: the interval `[at, at + 1ms)`.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self { from: at, end: at }
    }

    /// The interval covering all of representable time.
    pub fn forever() -> Self {
        Self {
            from: START_OF_TIME,
            end: END_OF_TIME,
        }
    }

    /// Inclusive start.
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Exclusive end: one millisecond after the last instant inside.
    ///
    /// Always later than [`from`](Self::from), except for an interval whose
    /// last instant is [`END_OF_TIME`]: nothing is representable after it, so
    /// `to` is the sentinel itself. `Interval::at(END_OF_TIME)` is the only
    /// interval where `to == from`.
    pub fn to(&self) -> DateTime<Utc> {
        one_millis_after(self.end).unwrap_or(END_OF_TIME)
    }

    /// Last instant inside the interval.
    pub fn inclusive_end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True if this interval starts before `other` starts.
    pub fn is_before(&self, other: &Interval) -> bool {
        self.from < other.from
    }

    /// True if this interval starts after `other` has ended.
    pub fn is_past(&self, other: &Interval) -> bool {
        self.from > other.end
    }

    pub fn is_point(&self) -> bool {
        self.from == self.end
    }

    /// True if `date` lies inside `[from, to)`.
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.from <= date && date <= self.end
    }

    /// Narrow this (outer) interval by an inner candidate.
    ///
    /// Returns `None` when `other` starts before this interval or after its
    /// last instant. Otherwise the result starts where `other` starts and ends
    /// where `other` ends, even when that is beyond this interval's end.
    pub fn limit(&self, other: &Interval) -> Option<Interval> {
        if other.from < self.from || other.from > self.end {
            return None;
        }
        Some(Interval {
            from: self.from.max(other.from),
            end: other.end,
        })
    }
}

fn format_bound(date: DateTime<Utc>) -> String {
    if date == START_OF_TIME {
        "the beginning of time".to_string()
    } else if date == END_OF_TIME {
        "the end of time".to_string()
    } else {
        date.format(DISPLAY_FORMAT).to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "at {}", format_bound(self.from))
        } else {
            write!(
                f,
                "{} up to {}",
                format_bound(self.from),
                format_bound(self.to())
            )
        }
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Interval", 2)?;
        state.serialize_field("from", &self.from)?;
        state.serialize_field("to", &self.to())?;
        state.end()
    }
}

/// A due interval plus the instant from which the following occurrence
/// should be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleResult {
    interval: Interval,
    use_next: Option<DateTime<Utc>>,
}

impl ScheduleResult {
    /// A result whose use-next marker is the interval's exclusive end.
    pub fn new(interval: Interval) -> Self {
        let use_next = one_millis_after(interval.end);
        Self { interval, use_next }
    }

    pub fn with_use_next(interval: Interval, use_next: Option<DateTime<Utc>>) -> Self {
        Self { interval, use_next }
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.interval.from()
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.interval.to()
    }

    /// Where the next query should start, `None` if there is nothing after
    /// this occurrence.
    pub fn use_next(&self) -> Option<DateTime<Utc>> {
        self.use_next
    }
}

impl AsRef<Interval> for ScheduleResult {
    fn as_ref(&self) -> &Interval {
        &self.interval
    }
}

impl From<Interval> for ScheduleResult {
    fn from(interval: Interval) -> Self {
        Self::new(interval)
    }
}

impl fmt::Display for ScheduleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.use_next {
            Some(next) if next != self.interval.to() => write!(
                f,
                "{} (use next {})",
                self.interval,
                format_bound(next)
            ),
            _ => write!(f, "{}", self.interval),
        }
    }
}

impl Serialize for ScheduleResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ScheduleResult", 3)?;
        state.serialize_field("from", &self.interval.from)?;
        state.serialize_field("to", &self.interval.to())?;
        state.serialize_field("use_next", &self.use_next)?;
        state.end()
    }
}
