//! JSON codec for the Calendar API v3 event resource.

use std::collections::BTreeMap;

use gcalkit_core::{
    Attendee, CalendarError, CalendarResult, Event, EventTime, ExtendedProperties,
    RecurrenceRule, ReminderMethod, ReminderOverride, Reminders, ServerFields, parse_zone,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{EventCodec, EventPage};
use crate::gateway::ApiGeneration;

/// Start or end of an event as the API represents it.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiReminders {
    #[serde(default)]
    use_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    overrides: Vec<ApiReminderOverride>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiReminderOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default)]
    minutes: Option<u32>,
}

/// Only these three attendee fields are read or written.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_status: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiExtendedProperties {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    shared: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    private: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPerson {
    email: Option<String>,
    display_name: Option<String>,
}

/// The event resource.
///
/// Server-computed fields are read but never written back.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing)]
    html_link: Option<String>,
    #[serde(skip_serializing)]
    etag: Option<String>,
    #[serde(skip_serializing)]
    creator: Option<ApiPerson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<ApiEventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<ApiEventTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    recurrence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminders: Option<ApiReminders>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attendees: Vec<ApiAttendee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extended_properties: Option<ApiExtendedProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transparency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guests_can_invite_others: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guests_can_see_other_guests: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventList {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

/// Encodes and decodes Calendar API v3 event resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventCodec;

impl JsonEventCodec {
    fn decode_value(&self, value: Value) -> CalendarResult<Event> {
        let raw = value.to_string();
        let api: ApiEvent = serde_json::from_value(value).map_err(|e| {
            CalendarError::invalid_response(format!("failed to parse event: {}", e)).with_source(e)
        })?;
        from_api(api, raw)
    }
}

impl EventCodec for JsonEventCodec {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::Json
    }

    fn encode(&self, event: &Event) -> CalendarResult<String> {
        let api = to_api(event)?;
        serde_json::to_string(&api).map_err(|e| {
            CalendarError::invalid_argument(format!("failed to encode event: {}", e)).with_source(e)
        })
    }

    fn decode(&self, body: &str) -> CalendarResult<Event> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            CalendarError::invalid_response(format!("failed to parse event: {}", e)).with_source(e)
        })?;
        let mut event = self.decode_value(value)?;
        // keep the body exactly as received
        let mut server = event.server_fields().clone();
        server.raw = Some(body.to_string());
        event.set_server_fields(server);
        Ok(event)
    }

    fn decode_page(&self, body: &str) -> CalendarResult<EventPage> {
        let list: ApiEventList = serde_json::from_str(body).map_err(|e| {
            CalendarError::invalid_response(format!("failed to parse event list: {}", e))
                .with_source(e)
        })?;
        let events = list
            .items
            .into_iter()
            .map(|item| self.decode_value(item))
            .collect::<CalendarResult<Vec<_>>>()?;
        debug!(count = events.len(), "decoded event page");
        Ok(EventPage {
            events,
            next_page_token: list.next_page_token,
            next_sync_token: list.next_sync_token,
        })
    }

    fn encode_quick_add(&self, _text: &str) -> CalendarResult<Option<String>> {
        Ok(None)
    }
}

fn encode_time(time: &EventTime, all_day: bool, event: &Event) -> ApiEventTime {
    let zone = parse_zone(event.time_zone.as_deref());
    if all_day {
        ApiEventTime {
            date: Some(EventTime::Date(time.date(zone)).to_wire()),
            ..Default::default()
        }
    } else {
        let instant = match time {
            EventTime::DateTime(_) => *time,
            EventTime::Date(_) => EventTime::from_datetime(time.instant(zone)),
        };
        ApiEventTime {
            date_time: Some(instant.to_wire()),
            time_zone: event.time_zone.clone(),
            ..Default::default()
        }
    }
}

fn decode_time(time: &ApiEventTime) -> CalendarResult<Option<EventTime>> {
    match (&time.date, &time.date_time) {
        (Some(date), _) => EventTime::parse(date).map(Some),
        (None, Some(date_time)) => EventTime::parse(date_time).map(Some),
        (None, None) => Ok(None),
    }
}

fn to_api(event: &Event) -> CalendarResult<ApiEvent> {
    let all_day = event.is_all_day();

    let recurrence = match &event.recurrence {
        Some(rule) if !rule.is_empty() => vec![rule.to_rule_string()?],
        _ => Vec::new(),
    };

    let reminders = event.reminders.as_ref().map(|r| ApiReminders {
        use_default: r.use_default,
        overrides: r
            .overrides
            .iter()
            .map(|o| ApiReminderOverride {
                method: Some(o.method_or(ReminderMethod::Popup).as_str().to_string()),
                minutes: Some(o.lead_minutes()),
            })
            .collect(),
    });

    let attendees = event
        .attendees
        .iter()
        .map(|a| ApiAttendee {
            email: Some(a.email.clone()),
            display_name: a.display_name.clone(),
            response_status: a.response_status.map(|s| s.as_str().to_string()),
        })
        .collect();

    let extended_properties = (!event.extended_properties.is_empty()).then(|| {
        ApiExtendedProperties {
            shared: event.extended_properties.shared.clone(),
            private: event.extended_properties.private.clone(),
        }
    });

    Ok(ApiEvent {
        id: event
            .has_asserted_id()
            .then(|| event.id().map(str::to_string))
            .flatten(),
        status: event.status.map(|s| s.as_str().to_string()),
        summary: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        color_id: event.color_id.clone(),
        start: Some(encode_time(&event.start, all_day, event)),
        end: Some(encode_time(&event.end, all_day, event)),
        recurrence,
        reminders,
        attendees,
        extended_properties,
        transparency: event.transparency.map(|t| t.as_str().to_string()),
        visibility: event.visibility.map(|v| v.as_str().to_string()),
        guests_can_invite_others: event.guests_can_invite_others,
        guests_can_see_other_guests: event.guests_can_see_other_guests,
        ..Default::default()
    })
}

/// Builds an event from the decoded resource.
///
/// A missing start or end keeps the `Event::new` default of now and now
/// plus one hour.
fn from_api(api: ApiEvent, raw: String) -> CalendarResult<Event> {
    let mut event = Event::new();

    if let Some(id) = api.id {
        event.assign_server_id(id);
    }
    if let Some(start) = api.start.as_ref() {
        event.time_zone = start.time_zone.clone();
        if let Some(time) = decode_time(start)? {
            event.start = time;
        }
    }
    if let Some(time) = api.end.as_ref().map(decode_time).transpose()?.flatten() {
        event.end = time;
    }

    event.status = api.status.as_deref().and_then(|s| s.parse().ok());
    event.title = api.summary;
    event.description = api.description;
    event.location = api.location;
    event.color_id = api.color_id;
    event.transparency = api.transparency.as_deref().and_then(|t| t.parse().ok());
    if let Some(visibility) = api.visibility.as_deref() {
        event.set_visibility_str(visibility)?;
    }
    event.guests_can_invite_others = api.guests_can_invite_others;
    event.guests_can_see_other_guests = api.guests_can_see_other_guests;
    event.creator_name = api.creator.and_then(|c| c.display_name.or(c.email));

    event.recurrence = api
        .recurrence
        .iter()
        .find(|line| line.to_ascii_uppercase().contains("RRULE:"))
        .map(|line| RecurrenceRule::parse(line))
        .transpose()?;

    event.reminders = api.reminders.map(|r| Reminders {
        use_default: r.use_default,
        overrides: r
            .overrides
            .into_iter()
            .map(|o| ReminderOverride {
                method: Some(
                    o.method
                        .as_deref()
                        .and_then(|m| m.parse().ok())
                        .unwrap_or(ReminderMethod::Popup),
                ),
                minutes: o.minutes,
                hours: None,
                days: None,
            })
            .collect(),
    });

    event.attendees = api
        .attendees
        .into_iter()
        .filter_map(|a| {
            let mut attendee = Attendee::new(a.email?);
            attendee.display_name = a.display_name;
            attendee.response_status = a.response_status.as_deref().and_then(|s| s.parse().ok());
            Some(attendee)
        })
        .collect();

    if let Some(props) = api.extended_properties {
        event.extended_properties = ExtendedProperties {
            shared: props.shared,
            private: props.private,
        };
    }

    event.set_server_fields(ServerFields {
        html_link: api.html_link,
        etag: api.etag,
        edit_link: None,
        raw: Some(raw),
    });
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use gcalkit_core::{
        ErrorKind, EventStatus, Frequency, ResponseStatus, Transparency, Visibility,
    };
    use serde_json::json;

    fn encode(event: &Event) -> Value {
        serde_json::from_str(&JsonEventCodec.encode(event).unwrap()).unwrap()
    }

    fn timed(start: &str, end: &str) -> Event {
        Event::with_times(EventTime::parse(start).unwrap(), EventTime::parse(end).unwrap())
    }

    #[test]
    fn encode_timed_event() {
        let mut event = timed("2012-03-27T10:00:00-07:00", "2012-03-27T11:00:00-07:00");
        event.title = Some("Tennis".into());
        event.location = Some("Court 3".into());
        event.visibility = Some(Visibility::Private);
        event.transparency = Some(Transparency::Transparent);
        event.time_zone = Some("America/Los_Angeles".into());

        insta::assert_snapshot!(JsonEventCodec.encode(&event).unwrap(), @r#"{"summary":"Tennis","location":"Court 3","start":{"dateTime":"2012-03-27T10:00:00-07:00","timeZone":"America/Los_Angeles"},"end":{"dateTime":"2012-03-27T11:00:00-07:00","timeZone":"America/Los_Angeles"},"transparency":"transparent","visibility":"private"}"#);
    }

    #[test]
    fn encode_all_day_uses_date() {
        let mut event = Event::new();
        event.set_all_day(NaiveDate::from_ymd_opt(2012, 3, 31).unwrap());
        let value = encode(&event);
        assert_eq!(value["start"], json!({"date": "2012-03-31"}));
        assert_eq!(value["end"], json!({"date": "2012-04-01"}));
    }

    #[test]
    fn encode_midnight_aligned_timestamps_as_dates() {
        let event = timed("2012-03-31T00:00:00+02:00", "2012-04-02T00:00:00+02:00");
        let value = encode(&event);
        assert_eq!(value["start"], json!({"date": "2012-03-31"}));
        assert_eq!(value["end"], json!({"date": "2012-04-02"}));
    }

    #[test]
    fn encode_filters_attendees_and_reminders() {
        let mut event = Event::new();
        event.attendees = vec![
            Attendee::new("a@example.com")
                .with_display_name("A")
                .with_response_status(ResponseStatus::Accepted),
        ];
        event.reminders = Some(Reminders::overrides(vec![
            ReminderOverride::hours(2),
            ReminderOverride {
                method: Some(ReminderMethod::Email),
                minutes: Some(5),
                hours: Some(1),
                days: None,
            },
            ReminderOverride::default(),
        ]));

        let value = encode(&event);
        assert_eq!(
            value["attendees"],
            json!([{"email": "a@example.com", "displayName": "A", "responseStatus": "accepted"}])
        );
        assert_eq!(
            value["reminders"],
            json!({"useDefault": false, "overrides": [
                {"method": "popup", "minutes": 120},
                {"method": "email", "minutes": 5},
                {"method": "popup", "minutes": 10},
            ]})
        );
    }

    #[test]
    fn encode_recurrence_and_asserted_id() {
        let mut event = Event::with_asserted_id("abcdef12345").unwrap();
        event.recurrence = Some(RecurrenceRule::new(Frequency::Weekly).with_count(4));
        let value = encode(&event);
        assert_eq!(value["id"], "abcdef12345");
        assert_eq!(value["recurrence"], json!(["RRULE:FREQ=WEEKLY;COUNT=4"]));
    }

    #[test]
    fn encode_omits_server_id_on_update() {
        let mut event = Event::new();
        event.assign_server_id("serverid1");
        assert!(encode(&event).get("id").is_none());
    }

    #[test]
    fn encode_rejects_count_with_until() {
        let mut event = Event::new();
        event.recurrence = Some(
            RecurrenceRule::new(Frequency::Daily)
                .with_count(3)
                .with_until(Utc::now()),
        );
        let err = JsonEventCodec.encode(&event).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn decode_full_resource() {
        let body = json!({
            "kind": "calendar#event",
            "id": "fhru34kt6ikmr20knd2456l08n",
            "etag": "\"2890\"",
            "status": "confirmed",
            "htmlLink": "https://www.google.com/calendar/event?eid=x",
            "summary": "Lunch",
            "creator": {"email": "me@example.com", "displayName": "Me"},
            "start": {"dateTime": "2012-03-27T12:00:00-07:00", "timeZone": "America/Los_Angeles"},
            "end": {"dateTime": "2012-03-27T13:00:00-07:00"},
            "recurrence": ["EXDATE;VALUE=DATE:20120401", "RRULE:FREQ=WEEKLY;BYDAY=TU"],
            "reminders": {"useDefault": false, "overrides": [{"method": "email", "minutes": 30}]},
            "attendees": [
                {"email": "b@example.com", "responseStatus": "needsAction", "organizer": true},
                {"displayName": "Room without email"}
            ],
            "extendedProperties": {"shared": {"k": "v"}, "other": {"x": "y"}},
            "visibility": "public",
            "guestsCanInviteOthers": false
        });

        let event = JsonEventCodec.decode(&body.to_string()).unwrap();
        assert_eq!(event.id(), Some("fhru34kt6ikmr20knd2456l08n"));
        assert!(!event.is_new());
        assert_eq!(event.status, Some(EventStatus::Confirmed));
        assert_eq!(event.title.as_deref(), Some("Lunch"));
        assert_eq!(event.creator_name.as_deref(), Some("Me"));
        assert_eq!(event.time_zone.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(event.html_link(), Some("https://www.google.com/calendar/event?eid=x"));
        assert_eq!(event.server_fields().etag.as_deref(), Some("\"2890\""));
        assert_eq!(event.visibility, Some(Visibility::Public));
        assert_eq!(event.guests_can_invite_others, Some(false));
        assert!(!event.is_all_day());

        let rule = event.recurrence.as_ref().unwrap();
        assert_eq!(rule.frequency, Some(Frequency::Weekly));

        let reminders = event.reminders.as_ref().unwrap();
        assert_eq!(reminders.overrides[0].method, Some(ReminderMethod::Email));
        assert_eq!(reminders.overrides[0].minutes, Some(30));

        assert_eq!(event.attendees.len(), 1);
        assert_eq!(
            event.attendees[0].response_status,
            Some(ResponseStatus::NeedsAction)
        );
        assert_eq!(event.extended_properties.shared.get("k").map(String::as_str), Some("v"));
        assert!(event.extended_properties.private.is_empty());
        assert!(event.raw().unwrap().contains("calendar#event"));
    }

    #[test]
    fn decode_date_is_all_day() {
        let body = json!({
            "id": "abcde",
            "start": {"date": "2012-03-31"},
            "end": {"date": "2012-04-03"}
        });
        let event = JsonEventCodec.decode(&body.to_string()).unwrap();
        assert!(event.start.is_date());
        assert!(event.is_all_day());
    }

    // Missing times are indistinguishable from a freshly built event: the
    // decoder substitutes now and now + 1h rather than failing.
    #[test]
    fn decode_missing_times_falls_back_to_now() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let event = JsonEventCodec.decode(r#"{"id": "abcde", "status": "cancelled"}"#).unwrap();
        let start = event.start.instant(None);
        assert!(start >= before);
        assert_eq!(event.end.instant(None) - start, chrono::Duration::hours(1));
    }

    #[test]
    fn decode_rejects_bad_visibility_and_times() {
        let err = JsonEventCodec
            .decode(r#"{"id": "abcde", "visibility": "secret"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = JsonEventCodec
            .decode(r#"{"id": "abcde", "start": {"dateTime": "yesterday"}}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn decode_garbage_is_invalid_response() {
        let err = JsonEventCodec.decode("<html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn decode_page_keeps_cursors() {
        let body = json!({
            "items": [{"id": "aaaaa"}, {"id": "bbbbb"}],
            "nextPageToken": "page2",
            "nextSyncToken": "sync1"
        });
        let page = JsonEventCodec.decode_page(&body.to_string()).unwrap();
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[1].id(), Some("bbbbb"));
        assert_eq!(page.events[0].raw(), Some(r#"{"id":"aaaaa"}"#));
        assert_eq!(page.next_page_token.as_deref(), Some("page2"));
        assert_eq!(page.next_sync_token.as_deref(), Some("sync1"));
    }

    #[test]
    fn quick_add_has_no_body() {
        assert_eq!(JsonEventCodec.encode_quick_add("lunch").unwrap(), None);
    }
}
