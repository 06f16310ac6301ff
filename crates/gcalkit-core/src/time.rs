//! Time types for calendar events.
//!
//! [`EventTime`] is either a pure date (all-day semantics) or a timestamp
//! that keeps the UTC offset it was given with. [`TimeWindow`] is the
//! half-open range used for event queries.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Seconds in a whole day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Compact UTC timestamp format used by recurrence `UNTIL` values.
const COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The start or end of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A date without a time-of-day component.
    Date(NaiveDate),
    /// A specific instant, keeping the offset it was expressed in.
    DateTime(DateTime<FixedOffset>),
}

impl EventTime {
    /// Creates a timestamp from a datetime in any timezone.
    pub fn from_datetime<T: TimeZone>(dt: DateTime<T>) -> Self {
        Self::DateTime(dt.fixed_offset())
    }

    /// Creates a date-only value.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    /// The current instant, in UTC.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Parses either `YYYY-MM-DD` or an RFC 3339 timestamp.
    ///
    /// Anything else fails with [`ErrorKind::InvalidArgument`](crate::ErrorKind).
    pub fn parse(value: &str) -> CalendarResult<Self> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Self::Date(date));
        }
        DateTime::parse_from_rfc3339(value)
            .map(Self::DateTime)
            .map_err(|e| {
                CalendarError::invalid_argument(format!("malformed time value '{}'", value))
                    .with_source(e)
            })
    }

    /// Returns true for the date-only variant.
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the date if this is a date-only value.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(_) => None,
        }
    }

    /// Returns the instant, treating a pure date as midnight in `zone`
    /// (or UTC when no zone is given).
    pub fn instant(&self, zone: Option<Tz>) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => dt.with_timezone(&Utc),
            Self::Date(date) => {
                let midnight = date.and_time(NaiveTime::MIN);
                match zone.and_then(|tz| tz.from_local_datetime(&midnight).earliest()) {
                    Some(local) => local.with_timezone(&Utc),
                    None => midnight.and_utc(),
                }
            }
        }
    }

    /// Returns the wall-clock value of this time in `zone`, or in the
    /// offset the value carries when no zone is given.
    pub fn local(&self, zone: Option<Tz>) -> NaiveDateTime {
        match (self, zone) {
            (Self::Date(date), _) => date.and_time(NaiveTime::MIN),
            (Self::DateTime(dt), Some(tz)) => dt.with_timezone(&tz).naive_local(),
            (Self::DateTime(dt), None) => dt.naive_local(),
        }
    }

    /// Returns the calendar date of this time in `zone`.
    pub fn date(&self, zone: Option<Tz>) -> NaiveDate {
        self.local(zone).date()
    }

    /// Formats the value for the wire: `YYYY-MM-DD` or RFC 3339.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Returns this time shifted by `delta`. Dates move by whole days.
    pub fn shifted(&self, delta: Duration) -> Self {
        match self {
            Self::Date(date) => Self::Date(*date + Duration::days(delta.num_days())),
            Self::DateTime(dt) => Self::DateTime(*dt + delta),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for EventTime {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant(None).cmp(&other.instant(None))
    }
}

/// Parses an IANA time zone name, returning `None` for unknown names.
pub fn parse_zone(name: Option<&str>) -> Option<Tz> {
    name.and_then(|n| n.parse::<Tz>().ok())
}

/// Decides whether a start/end pair spans whole days.
///
/// The span is all-day when `end - start` is a non-zero multiple of 86400
/// seconds and `start`, read as wall-clock time in `zone` (or in its own
/// offset), is midnight.
pub fn spans_whole_days(start: &EventTime, end: &EventTime, zone: Option<&str>) -> bool {
    let tz = parse_zone(zone);
    let seconds = (end.instant(tz) - start.instant(tz)).num_seconds();
    if seconds <= 0 || seconds % SECONDS_PER_DAY != 0 {
        return false;
    }
    start.local(tz).time() == NaiveTime::MIN
}

/// Formats a UTC instant as `YYYYMMDDTHHMMSSZ`.
pub fn format_compact(dt: DateTime<Utc>) -> String {
    dt.format(COMPACT_FORMAT).to_string()
}

/// Parses a compact timestamp (`YYYYMMDDTHHMMSSZ` or `YYYYMMDD`), case-insensitively.
pub fn parse_compact(value: &str) -> CalendarResult<DateTime<Utc>> {
    let upper = value.trim().to_ascii_uppercase();
    if let Ok(dt) = NaiveDateTime::parse_from_str(&upper, COMPACT_FORMAT) {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&upper, "%Y%m%dT%H%M%S") {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(&upper, "%Y%m%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| {
            CalendarError::invalid_argument(format!("malformed compact timestamp '{}'", value))
                .with_source(e)
        })
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarResult<Self> {
        if start > end {
            return Err(CalendarError::invalid_argument(format!(
                "time window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a window from a start and a duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> CalendarResult<Self> {
        Self::new(start, start + duration)
    }

    /// Returns the duration of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        dt >= self.start && dt < self.end
    }
}
