//! Recurrence rules.
//!
//! A [`RecurrenceRule`] is the structured form of an `RRULE:` line. Input is
//! case-insensitive; the structure keeps everything lowercase and the wire
//! form is uppercase, e.g. `RRULE:FREQ=WEEKLY;COUNT=4;BYDAY=MO,WE`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};
use crate::time::{format_compact, parse_compact};

const RRULE_MARKER: &str = "RRULE:";

/// How often a recurring event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Returns the lowercase rule value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secondly => "secondly",
            Self::Minutely => "minutely",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secondly" => Ok(Self::Secondly),
            "minutely" => Ok(Self::Minutely),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(CalendarError::invalid_argument(format!(
                "unknown recurrence frequency '{}'",
                other
            ))),
        }
    }
}

/// One entry of a `BYDAY` list, e.g. `mo`, `1mo` or `-1fr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayToken {
    /// Which occurrence within the period (`-1` is the last one).
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

impl DayToken {
    /// A token matching every occurrence of `weekday`.
    pub fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    /// A token matching the `ordinal`-th occurrence of `weekday`.
    pub fn nth(ordinal: i32, weekday: Weekday) -> Self {
        Self {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mo",
        Weekday::Tue => "tu",
        Weekday::Wed => "we",
        Weekday::Thu => "th",
        Weekday::Fri => "fr",
        Weekday::Sat => "sa",
        Weekday::Sun => "su",
    }
}

impl FromStr for DayToken {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        let invalid = || CalendarError::invalid_argument(format!("malformed BYDAY token '{}'", s));
        if token.len() < 2 || !token.is_char_boundary(token.len() - 2) {
            return Err(invalid());
        }
        let (prefix, code) = token.split_at(token.len() - 2);
        let weekday = match code {
            "mo" => Weekday::Mon,
            "tu" => Weekday::Tue,
            "we" => Weekday::Wed,
            "th" => Weekday::Thu,
            "fr" => Weekday::Fri,
            "sa" => Weekday::Sat,
            "su" => Weekday::Sun,
            _ => return Err(invalid()),
        };
        let ordinal = if prefix.is_empty() {
            None
        } else {
            let n: i32 = prefix.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            Some(n)
        };
        Ok(Self { ordinal, weekday })
    }
}

impl fmt::Display for DayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.ordinal {
            write!(f, "{}", n)?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

/// A structured recurrence rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Option<Frequency>,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
    pub interval: Option<u32>,
    pub by_day: Vec<DayToken>,
    /// Any other key, lowercase key and value.
    pub extra: BTreeMap<String, String>,
}

impl RecurrenceRule {
    /// Creates a rule with the given frequency.
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency: Some(frequency),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets `until`, truncated to whole seconds as the wire format requires.
    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until.trunc_subsecs(0));
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_by_day(mut self, days: Vec<DayToken>) -> Self {
        self.by_day = days;
        self
    }

    /// Sets an arbitrary rule part, e.g. `wkst` or `bymonth`.
    pub fn with_part(mut self, key: &str, value: &str) -> Self {
        self.extra
            .insert(key.to_ascii_lowercase(), value.to_ascii_lowercase());
        self
    }

    /// Returns true when no frequency is set, i.e. nothing to encode.
    pub fn is_empty(&self) -> bool {
        self.frequency.is_none()
    }

    /// Parses the rule from a string that contains an `RRULE:` marker.
    ///
    /// Text before the marker is ignored and the rule ends at the first line
    /// break. A string without the marker is read as a bare rule body.
    pub fn parse(input: &str) -> CalendarResult<Self> {
        let upper = input.to_ascii_uppercase();
        let body = match upper.find(RRULE_MARKER) {
            Some(idx) => &input[idx + RRULE_MARKER.len()..],
            None => input,
        };
        let body = body.lines().next().unwrap_or_default().trim();

        let mut rule = Self::default();
        for part in body.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CalendarError::invalid_argument(format!("malformed recurrence part '{}'", part))
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_ascii_lowercase();

            match key.as_str() {
                "freq" => rule.frequency = Some(value.parse()?),
                "count" => rule.count = Some(parse_number(&key, &value)?),
                "interval" => rule.interval = Some(parse_number(&key, &value)?),
                "until" => rule.until = Some(parse_compact(&value)?),
                "byday" => {
                    rule.by_day = value
                        .split(',')
                        .filter(|d| !d.is_empty())
                        .map(str::parse)
                        .collect::<CalendarResult<_>>()?;
                }
                _ => {
                    rule.extra.insert(key, value);
                }
            }
        }
        Ok(rule)
    }

    /// Serializes the rule as an uppercase `RRULE:` line.
    ///
    /// Fails when no frequency is set or when both `count` and `until` are
    /// present, since the two bounds are mutually exclusive.
    pub fn to_rule_string(&self) -> CalendarResult<String> {
        let frequency = self.frequency.ok_or_else(|| {
            CalendarError::invalid_argument("recurrence rule has no frequency")
        })?;
        if self.count.is_some() && self.until.is_some() {
            return Err(CalendarError::invalid_argument(
                "recurrence rule cannot have both count and until",
            ));
        }

        let mut parts = vec![format!("freq={}", frequency.as_str())];
        if let Some(count) = self.count {
            parts.push(format!("count={}", count));
        }
        if let Some(until) = self.until {
            parts.push(format!("until={}", format_compact(until)));
        }
        if let Some(interval) = self.interval {
            parts.push(format!("interval={}", interval));
        }
        if !self.by_day.is_empty() {
            let days: Vec<String> = self.by_day.iter().map(ToString::to_string).collect();
            parts.push(format!("byday={}", days.join(",")));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{}={}", key, value));
        }

        Ok(format!("{}{}", RRULE_MARKER, parts.join(";").to_ascii_uppercase()))
    }
}

fn parse_number(key: &str, value: &str) -> CalendarResult<u32> {
    value.parse().map_err(|_| {
        CalendarError::invalid_argument(format!("recurrence {} must be a number, got '{}'", key, value))
    })
}

impl FromStr for RecurrenceRule {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
