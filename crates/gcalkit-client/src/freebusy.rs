//! Free/busy queries across calendars.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use gcalkit_core::{CalendarError, CalendarResult, TimeWindow};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::gateway::{decode_json, encode_json};

/// A busy block of one calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The answer for one queried calendar.
///
/// A calendar the server could not check carries its error reasons and no
/// busy blocks; an empty `busy` only means free when `errors` is empty too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreebusyCalendar {
    /// Busy blocks, sorted by start.
    pub busy: Vec<BusyInterval>,
    /// Error reasons reported for this calendar, e.g. `notFound`.
    pub errors: Vec<String>,
}

impl FreebusyCalendar {
    /// Returns true when the server answered for this calendar.
    pub fn is_checked(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FreebusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreebusyItem<'a>>,
}

#[derive(Serialize)]
struct FreebusyItem<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct FreebusyResponse {
    #[serde(default)]
    calendars: BTreeMap<String, CalendarBusy>,
}

#[derive(Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<CalendarBusyError>,
}

#[derive(Deserialize)]
struct CalendarBusyError {
    #[serde(default)]
    reason: String,
}

/// Queries busy time for a set of calendars.
#[derive(Debug, Clone)]
pub struct FreebusyResource {
    connection: Connection,
}

impl FreebusyResource {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns the busy intervals of each calendar within `[start, end)`.
    ///
    /// Per-calendar failures do not fail the query; they are reported in
    /// [`FreebusyCalendar::errors`].
    pub async fn query<S: AsRef<str>>(
        &self,
        calendar_ids: &[S],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalendarResult<BTreeMap<String, FreebusyCalendar>> {
        self.connection.require_json("free/busy queries")?;
        if calendar_ids.is_empty() {
            return Err(CalendarError::calendar_id_missing());
        }
        let window = TimeWindow::new(start, end)?;

        let request = FreebusyRequest {
            time_min: window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            time_max: window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            items: calendar_ids
                .iter()
                .map(|id| FreebusyItem { id: id.as_ref() })
                .collect(),
        };
        let body = encode_json(&request, "free/busy request")?;
        let response = self
            .connection
            .gateway()
            .request(Method::POST, "freeBusy", Some(body))
            .await?;
        let parsed: FreebusyResponse = decode_json(&response.body, "free/busy response")?;

        let mut result = BTreeMap::new();
        for (id, calendar) in parsed.calendars {
            let errors: Vec<String> = calendar.errors.into_iter().map(|e| e.reason).collect();
            for reason in &errors {
                warn!(calendar_id = %id, reason = %reason, "free/busy lookup failed");
            }
            let mut busy = calendar.busy;
            busy.sort();
            result.insert(id, FreebusyCalendar { busy, errors });
        }
        debug!(calendars = result.len(), "free/busy query complete");
        Ok(result)
    }
}
