//! Atom codec for the legacy calendar feeds.
//!
//! Entries are written with quick-xml writer events and read with a
//! streaming reader. Enumerated values use the `#event.*` URIs of the
//! `gd` namespace; recurring entries carry their times in a
//! `gd:recurrence` block instead of `gd:when`.

use std::io::Cursor;

use chrono::TimeZone;
use gcalkit_core::{
    Attendee, CalendarError, CalendarResult, DEFAULT_REMINDER_MINUTES, Event, EventStatus,
    EventTime, RecurrenceRule, ReminderMethod, ReminderOverride, Reminders, ResponseStatus,
    ServerFields, Transparency, Visibility, format_compact, parse_compact, parse_zone,
};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use tracing::debug;

use super::{EventCodec, EventPage};
use crate::gateway::ApiGeneration;

/// Atom namespace.
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
/// Google data namespace.
pub const GD_NS: &str = "http://schemas.google.com/g/2005";
/// Google calendar namespace.
pub const GCAL_NS: &str = "http://schemas.google.com/gCal/2005";

const EVENT_VALUE_PREFIX: &str = "http://schemas.google.com/g/2005#event.";
const KIND_SCHEME: &str = "http://schemas.google.com/g/2005#kind";
const EVENT_KIND: &str = "http://schemas.google.com/g/2005#event";

fn status_value(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Confirmed => "confirmed",
        EventStatus::Tentative => "tentative",
        EventStatus::Cancelled => "canceled",
    }
}

fn parse_status(value: &str) -> Option<EventStatus> {
    match value {
        "confirmed" => Some(EventStatus::Confirmed),
        "tentative" => Some(EventStatus::Tentative),
        "canceled" | "cancelled" => Some(EventStatus::Cancelled),
        _ => None,
    }
}

fn attendee_value(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::NeedsAction => "invited",
        other => other.as_str(),
    }
}

fn parse_attendee_status(value: &str) -> Option<ResponseStatus> {
    match value {
        "invited" => Some(ResponseStatus::NeedsAction),
        other => other.parse().ok(),
    }
}

/// Strips the `#event.` URI prefix from a `gd` value attribute.
fn event_value(uri: &str) -> &str {
    uri.strip_prefix(EVENT_VALUE_PREFIX).unwrap_or(uri)
}

fn event_uri(value: &str) -> String {
    format!("{}{}", EVENT_VALUE_PREFIX, value)
}

fn write_error(e: impl std::fmt::Display) -> CalendarError {
    CalendarError::invalid_argument(format!("failed to write Atom entry: {}", e))
}

/// Thin wrapper mapping writer failures onto calendar errors.
struct AtomWriter {
    inner: Writer<Cursor<Vec<u8>>>,
}

impl AtomWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new(Cursor::new(Vec::new())),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> CalendarResult<()> {
        let mut tag = BytesStart::new(name);
        for attr in attrs {
            tag.push_attribute(*attr);
        }
        self.inner
            .write_event(XmlEvent::Start(tag))
            .map_err(write_error)
    }

    fn end(&mut self, name: &str) -> CalendarResult<()> {
        self.inner
            .write_event(XmlEvent::End(BytesEnd::new(name)))
            .map_err(write_error)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> CalendarResult<()> {
        let mut tag = BytesStart::new(name);
        for attr in attrs {
            tag.push_attribute(*attr);
        }
        self.inner
            .write_event(XmlEvent::Empty(tag))
            .map_err(write_error)
    }

    fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> CalendarResult<()> {
        self.start(name, attrs)?;
        self.inner
            .write_event(XmlEvent::Text(BytesText::new(text)))
            .map_err(write_error)?;
        self.end(name)
    }

    fn value(&mut self, name: &str, value: &str) -> CalendarResult<()> {
        self.empty(name, &[("value", value)])
    }

    fn open_entry(&mut self) -> CalendarResult<()> {
        self.start(
            "entry",
            &[("xmlns", ATOM_NS), ("xmlns:gd", GD_NS), ("xmlns:gCal", GCAL_NS)],
        )?;
        self.empty("category", &[("scheme", KIND_SCHEME), ("term", EVENT_KIND)])
    }

    fn finish(self) -> CalendarResult<String> {
        String::from_utf8(self.inner.into_inner().into_inner()).map_err(write_error)
    }
}

/// Picks the one unit a `gd:reminder` carries.
fn reminder_unit(reminder: &ReminderOverride) -> (&'static str, u32) {
    match (reminder.minutes, reminder.hours, reminder.days) {
        (Some(m), _, _) => ("minutes", m),
        (None, Some(h), _) => ("hours", h),
        (None, None, Some(d)) => ("days", d),
        (None, None, None) => ("minutes", DEFAULT_REMINDER_MINUTES),
    }
}

fn write_reminders(w: &mut AtomWriter, reminders: &Reminders) -> CalendarResult<()> {
    for reminder in &reminders.overrides {
        let (unit, amount) = reminder_unit(reminder);
        let amount = amount.to_string();
        let method = reminder.method_or(ReminderMethod::Alert);
        w.empty("gd:reminder", &[(unit, amount.as_str()), ("method", method.as_str())])?;
    }
    Ok(())
}

/// Formats one recurrence boundary line, e.g. `DTSTART;VALUE=DATE:20120331`.
fn recurrence_time(key: &str, time: &EventTime, all_day: bool, event: &Event) -> String {
    let zone = parse_zone(event.time_zone.as_deref());
    if all_day {
        format!("{};VALUE=DATE:{}", key, time.date(zone).format("%Y%m%d"))
    } else {
        format!("{}:{}", key, format_compact(time.instant(zone)))
    }
}

fn encode_entry(event: &Event) -> CalendarResult<String> {
    let all_day = event.is_all_day();
    let zone = parse_zone(event.time_zone.as_deref());
    let mut w = AtomWriter::new();
    w.open_entry()?;

    if let Some(id) = event.id().filter(|_| !event.is_new()) {
        w.text_element("id", &[], id)?;
    }
    w.text_element("title", &[("type", "text")], event.title.as_deref().unwrap_or_default())?;
    if let Some(description) = &event.description {
        w.text_element("content", &[("type", "text")], description)?;
    }
    if let Some(status) = event.status {
        w.value("gd:eventStatus", &event_uri(status_value(status)))?;
    }
    if let Some(transparency) = event.transparency {
        w.value("gd:transparency", &event_uri(transparency.as_str()))?;
    }
    if let Some(visibility) = event.visibility {
        w.value("gd:visibility", &event_uri(visibility.as_str()))?;
    }
    if let Some(location) = &event.location {
        w.empty("gd:where", &[("valueString", location.as_str())])?;
    }

    let recurring = match &event.recurrence {
        Some(rule) if !rule.is_empty() => Some(rule.to_rule_string()?),
        _ => None,
    };
    match recurring {
        Some(rule) => {
            let block = [
                recurrence_time("DTSTART", &event.start, all_day, event),
                recurrence_time("DTEND", &event.end, all_day, event),
                rule,
            ]
            .join("\r\n");
            w.text_element("gd:recurrence", &[], &block)?;
            if let Some(reminders) = &event.reminders {
                write_reminders(&mut w, reminders)?;
            }
        }
        None => {
            let (start, end) = if all_day {
                (
                    EventTime::Date(event.start.date(zone)).to_wire(),
                    EventTime::Date(event.end.date(zone)).to_wire(),
                )
            } else {
                (
                    EventTime::from_datetime(event.start.instant(zone)).to_wire(),
                    EventTime::from_datetime(event.end.instant(zone)).to_wire(),
                )
            };
            let attrs = [("startTime", start.as_str()), ("endTime", end.as_str())];
            match event.reminders.as_ref().filter(|r| !r.overrides.is_empty()) {
                Some(reminders) => {
                    w.start("gd:when", &attrs)?;
                    write_reminders(&mut w, reminders)?;
                    w.end("gd:when")?;
                }
                None => w.empty("gd:when", &attrs)?,
            }
        }
    }

    for attendee in &event.attendees {
        let mut attrs = vec![
            ("email", attendee.email.as_str()),
            ("rel", "http://schemas.google.com/g/2005#event.attendee"),
        ];
        if let Some(name) = attendee.display_name.as_deref() {
            attrs.push(("valueString", name));
        }
        match attendee.response_status {
            Some(status) => {
                w.start("gd:who", &attrs)?;
                w.value("gd:attendeeStatus", &event_uri(attendee_value(status)))?;
                w.end("gd:who")?;
            }
            None => w.empty("gd:who", &attrs)?,
        }
    }

    let props = &event.extended_properties;
    for (realm, map) in [("shared", &props.shared), ("private", &props.private)] {
        for (name, value) in map {
            w.empty(
                "gd:extendedProperty",
                &[("name", name.as_str()), ("value", value.as_str()), ("realm", realm)],
            )?;
        }
    }

    if let Some(color) = &event.color_id {
        w.value("gCal:color", color)?;
    }
    if let Some(flag) = event.guests_can_invite_others {
        w.value("gCal:guestsCanInviteOthers", bool_str(flag))?;
    }
    if let Some(flag) = event.guests_can_see_other_guests {
        w.value("gCal:guestsCanSeeGuests", bool_str(flag))?;
    }
    if event.send_notifications {
        w.value("gCal:sendEventNotifications", "true")?;
    }

    w.end("entry")?;
    w.finish()
}

fn bool_str(flag: bool) -> &'static str {
    if flag { "true" } else { "false" }
}

/// Raw values collected from one `<entry>`.
#[derive(Debug, Default)]
struct EntryFields {
    id: Option<String>,
    etag: Option<String>,
    title: Option<String>,
    content: Option<String>,
    author: Option<String>,
    status: Option<String>,
    transparency: Option<String>,
    visibility: Option<String>,
    location: Option<String>,
    start: Option<String>,
    end: Option<String>,
    recurrence: Option<String>,
    reminders: Vec<ReminderOverride>,
    attendees: Vec<Attendee>,
    shared: Vec<(String, String)>,
    private: Vec<(String, String)>,
    color: Option<String>,
    guests_can_invite_others: Option<bool>,
    guests_can_see_other_guests: Option<bool>,
    html_link: Option<String>,
    edit_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Id,
    Title,
    Content,
    AuthorName,
    Recurrence,
}

/// Extracts the local name from a potentially prefixed name.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or_default().to_string()
}

/// Reads an attribute by local name.
fn attr(tag: &BytesStart<'_>, key: &str) -> Option<String> {
    tag.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_reminder(tag: &BytesStart<'_>) -> ReminderOverride {
    let number = |key| attr(tag, key).and_then(|v| v.parse::<u32>().ok());
    ReminderOverride {
        method: Some(
            attr(tag, "method")
                .and_then(|m| m.parse().ok())
                .unwrap_or(ReminderMethod::Alert),
        ),
        minutes: number("minutes"),
        hours: number("hours"),
        days: number("days"),
    }
}

/// Streaming parse state for a feed or a single entry.
#[derive(Debug, Default)]
struct FeedParser {
    entries: Vec<(EntryFields, String)>,
    next_link: Option<String>,
    current: Option<EntryFields>,
    entry_start: usize,
    text_target: Option<TextField>,
    in_author: bool,
}

impl FeedParser {
    fn open(&mut self, tag: &BytesStart<'_>, is_start: bool, position: usize) {
        let name = local_name(tag.name().as_ref());
        if name == "entry" {
            self.entry_start = position;
            self.current = Some(EntryFields {
                etag: attr(tag, "etag"),
                ..Default::default()
            });
            return;
        }

        let Some(entry) = self.current.as_mut() else {
            if name == "link" && attr(tag, "rel").as_deref() == Some("next") {
                self.next_link = attr(tag, "href");
            }
            return;
        };

        match name.as_str() {
            "id" if is_start => self.text_target = Some(TextField::Id),
            "title" if is_start => self.text_target = Some(TextField::Title),
            "content" if is_start => self.text_target = Some(TextField::Content),
            "recurrence" if is_start => self.text_target = Some(TextField::Recurrence),
            "author" if is_start => self.in_author = true,
            "name" if is_start && self.in_author => self.text_target = Some(TextField::AuthorName),
            "link" => match attr(tag, "rel").as_deref() {
                Some("alternate") => entry.html_link = attr(tag, "href"),
                Some("edit") => entry.edit_link = attr(tag, "href"),
                _ => {}
            },
            "eventStatus" => entry.status = attr(tag, "value"),
            "transparency" => entry.transparency = attr(tag, "value"),
            "visibility" => entry.visibility = attr(tag, "value"),
            "where" => entry.location = attr(tag, "valueString"),
            "when" => {
                entry.start = attr(tag, "startTime");
                entry.end = attr(tag, "endTime");
            }
            "reminder" => entry.reminders.push(parse_reminder(tag)),
            "who" => {
                if let Some(email) = attr(tag, "email") {
                    let mut attendee = Attendee::new(email);
                    attendee.display_name = attr(tag, "valueString");
                    entry.attendees.push(attendee);
                }
            }
            "attendeeStatus" => {
                if let Some(attendee) = entry.attendees.last_mut() {
                    attendee.response_status =
                        attr(tag, "value").and_then(|v| parse_attendee_status(event_value(&v)));
                }
            }
            "extendedProperty" => {
                if let (Some(key), Some(value)) = (attr(tag, "name"), attr(tag, "value")) {
                    match attr(tag, "realm").as_deref() {
                        Some("private") => entry.private.push((key, value)),
                        _ => entry.shared.push((key, value)),
                    }
                }
            }
            "color" => entry.color = attr(tag, "value"),
            "guestsCanInviteOthers" => {
                entry.guests_can_invite_others = attr(tag, "value").map(|v| v == "true")
            }
            "guestsCanSeeGuests" => {
                entry.guests_can_see_other_guests = attr(tag, "value").map(|v| v == "true")
            }
            _ => {}
        }
    }

    fn text(&mut self, value: String) {
        let (Some(entry), Some(target)) = (self.current.as_mut(), self.text_target) else {
            return;
        };
        match target {
            TextField::Id => entry.id = Some(value),
            TextField::Title => entry.title = Some(value),
            TextField::Content => entry.content = Some(value),
            TextField::AuthorName => entry.author = Some(value),
            TextField::Recurrence => entry.recurrence = Some(value),
        }
    }

    fn close(&mut self, name: &str, position: usize, xml: &str) {
        self.text_target = None;
        match name {
            "author" => self.in_author = false,
            "entry" => self.finish_entry(position, xml),
            _ => {}
        }
    }

    fn finish_entry(&mut self, position: usize, xml: &str) {
        if let Some(entry) = self.current.take() {
            let raw = xml.get(self.entry_start..position).unwrap_or_default().trim();
            self.entries.push((entry, raw.to_string()));
        }
    }
}

/// Parses every `<entry>` in `xml`, keeping each entry's source text.
fn parse_feed(xml: &str) -> CalendarResult<FeedParser> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = FeedParser::default();

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            CalendarError::invalid_response(format!("malformed Atom document: {}", e))
                .with_source(e)
        })?;

        match event {
            XmlEvent::Start(tag) => parser.open(&tag, true, position),
            XmlEvent::Empty(tag) => {
                parser.open(&tag, false, position);
                if local_name(tag.name().as_ref()) == "entry" {
                    parser.finish_entry(reader.buffer_position() as usize, xml);
                }
            }
            XmlEvent::Text(text) => {
                let value = text.unescape().map_err(|e| {
                    CalendarError::invalid_response(format!("malformed Atom text: {}", e))
                        .with_source(e)
                })?;
                parser.text(value.into_owned());
            }
            XmlEvent::CData(data) => parser.text(String::from_utf8_lossy(&data).into_owned()),
            XmlEvent::End(tag) => {
                let name = local_name(tag.name().as_ref());
                parser.close(&name, reader.buffer_position() as usize, xml);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    Ok(parser)
}

/// Parses a recurrence boundary after its property name, such as
/// `;VALUE=DATE:20120331`, `;TZID=Europe/Paris:20120327T100000` or
/// `:20120327T170000Z`.
fn parse_recurrence_time(spec: &str) -> CalendarResult<EventTime> {
    let (params, value) = spec.rsplit_once(':').unwrap_or(("", spec));
    let mut date_only = false;
    let mut zone = None;
    for param in params.split(';') {
        match param.split_once('=') {
            Some((key, v)) if key.eq_ignore_ascii_case("VALUE") => {
                date_only = v.eq_ignore_ascii_case("DATE")
            }
            Some((key, v)) if key.eq_ignore_ascii_case("TZID") => zone = parse_zone(Some(v)),
            _ => {}
        }
    }

    let parsed = parse_compact(value)?;
    if date_only {
        return Ok(EventTime::Date(parsed.date_naive()));
    }
    match zone {
        Some(tz) if !value.trim().to_ascii_uppercase().ends_with('Z') => tz
            .from_local_datetime(&parsed.naive_utc())
            .earliest()
            .map(EventTime::from_datetime)
            .ok_or_else(|| {
                CalendarError::invalid_argument(format!("nonexistent local time '{}'", value))
            }),
        _ => Ok(EventTime::from_datetime(parsed)),
    }
}

fn apply_recurrence(event: &mut Event, block: &str) -> CalendarResult<()> {
    for line in block.lines().map(str::trim) {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("DTSTART") {
            event.start = parse_recurrence_time(&line["DTSTART".len()..])?;
        } else if upper.starts_with("DTEND") {
            event.end = parse_recurrence_time(&line["DTEND".len()..])?;
        }
    }
    event.recurrence = Some(RecurrenceRule::parse(block)?);
    Ok(())
}

fn into_event(fields: EntryFields, raw: String) -> CalendarResult<Event> {
    let mut event = Event::new();

    if let Some(id) = fields.id.as_deref() {
        let id = id.trim_end_matches('/').rsplit('/').next().unwrap_or(id);
        if !id.is_empty() {
            event.assign_server_id(id);
        }
    }
    if let Some(start) = fields.start.as_deref() {
        event.start = EventTime::parse(start)?;
    }
    if let Some(end) = fields.end.as_deref() {
        event.end = EventTime::parse(end)?;
    }
    if let Some(block) = fields.recurrence.as_deref() {
        apply_recurrence(&mut event, block)?;
    }

    event.title = fields.title;
    event.description = fields.content;
    event.creator_name = fields.author;
    event.location = fields.location;
    event.status = fields.status.as_deref().and_then(|v| parse_status(event_value(v)));
    event.transparency = fields
        .transparency
        .as_deref()
        .and_then(|v| event_value(v).parse::<Transparency>().ok());
    if let Some(visibility) = fields.visibility.as_deref() {
        event.visibility = Some(event_value(visibility).parse::<Visibility>()?);
    }
    if !fields.reminders.is_empty() {
        event.reminders = Some(Reminders::overrides(fields.reminders));
    }
    event.attendees = fields.attendees;
    event.extended_properties.shared = fields.shared.into_iter().collect();
    event.extended_properties.private = fields.private.into_iter().collect();
    event.color_id = fields.color;
    event.guests_can_invite_others = fields.guests_can_invite_others;
    event.guests_can_see_other_guests = fields.guests_can_see_other_guests;

    event.set_server_fields(ServerFields {
        html_link: fields.html_link,
        etag: fields.etag,
        edit_link: fields.edit_link,
        raw: Some(raw),
    });
    Ok(event)
}

/// Encodes and decodes legacy Atom event entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomEventCodec;

impl EventCodec for AtomEventCodec {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::LegacyXml
    }

    fn encode(&self, event: &Event) -> CalendarResult<String> {
        encode_entry(event)
    }

    fn decode(&self, body: &str) -> CalendarResult<Event> {
        let mut entries = parse_feed(body)?.entries.into_iter();
        let Some((fields, _)) = entries.next() else {
            return Err(CalendarError::invalid_response("response contains no Atom entry"));
        };
        into_event(fields, body.to_string())
    }

    fn decode_page(&self, body: &str) -> CalendarResult<EventPage> {
        let parser = parse_feed(body)?;
        let events = parser
            .entries
            .into_iter()
            .map(|(fields, raw)| into_event(fields, raw))
            .collect::<CalendarResult<Vec<_>>>()?;
        debug!(count = events.len(), "decoded feed page");
        Ok(EventPage {
            events,
            next_page_token: parser.next_link,
            next_sync_token: None,
        })
    }

    fn encode_quick_add(&self, text: &str) -> CalendarResult<Option<String>> {
        let mut w = AtomWriter::new();
        w.open_entry()?;
        w.text_element("content", &[("type", "html")], text)?;
        w.value("gCal:quickadd", "true")?;
        w.end("entry")?;
        w.finish().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gcalkit_core::{ErrorKind, Frequency};

    const ENTRY: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<entry xmlns='http://www.w3.org/2005/Atom' xmlns:gd='http://schemas.google.com/g/2005' xmlns:gCal='http://schemas.google.com/gCal/2005' gd:etag='"EUkKQAJGfSp7JGA6WhJW"'>
  <id>http://www.google.com/calendar/feeds/default/private/full/fhru34kt6ikmr20knd2456l08n</id>
  <title type='text'>Tennis with Beth</title>
  <content type='text'>Meet for a quick lesson.</content>
  <link rel='alternate' type='text/html' href='https://www.google.com/calendar/event?eid=abc'/>
  <link rel='edit' type='application/atom+xml' href='https://www.google.com/calendar/feeds/default/private/full/fhru34kt6ikmr20knd2456l08n'/>
  <author><name>Jo March</name><email>jo@example.com</email></author>
  <gd:eventStatus value='http://schemas.google.com/g/2005#event.canceled'/>
  <gd:visibility value='http://schemas.google.com/g/2005#event.private'/>
  <gd:transparency value='http://schemas.google.com/g/2005#event.opaque'/>
  <gd:where valueString='Rolling Lawn Courts'/>
  <gd:when startTime='2012-03-27T10:00:00.000-07:00' endTime='2012-03-27T11:00:00.000-07:00'>
    <gd:reminder hours='2' method='email'/>
    <gd:reminder minutes='15'/>
  </gd:when>
  <gd:who email='beth@example.com' rel='http://schemas.google.com/g/2005#event.attendee' valueString='Beth'>
    <gd:attendeeStatus value='http://schemas.google.com/g/2005#event.invited'/>
  </gd:who>
  <gd:extendedProperty name='source' value='gcalkit'/>
  <gd:extendedProperty name='note' value='mine' realm='private'/>
  <gCal:guestsCanSeeGuests value='true'/>
</entry>"#;

    #[test]
    fn decode_entry() {
        let event = AtomEventCodec.decode(ENTRY).unwrap();
        assert_eq!(event.id(), Some("fhru34kt6ikmr20knd2456l08n"));
        assert_eq!(event.title.as_deref(), Some("Tennis with Beth"));
        assert_eq!(event.description.as_deref(), Some("Meet for a quick lesson."));
        assert_eq!(event.creator_name.as_deref(), Some("Jo March"));
        assert_eq!(event.status, Some(EventStatus::Cancelled));
        assert_eq!(event.visibility, Some(Visibility::Private));
        assert_eq!(event.transparency, Some(Transparency::Opaque));
        assert_eq!(event.location.as_deref(), Some("Rolling Lawn Courts"));
        assert_eq!(event.start.to_wire(), "2012-03-27T10:00:00-07:00");
        assert_eq!(event.duration(), chrono::Duration::hours(1));
        assert_eq!(event.guests_can_see_other_guests, Some(true));
        assert_eq!(
            event.server_fields().etag.as_deref(),
            Some("\"EUkKQAJGfSp7JGA6WhJW\"")
        );
        assert!(event.server_fields().edit_link.as_deref().unwrap().ends_with("/full/fhru34kt6ikmr20knd2456l08n"));
        assert_eq!(event.html_link(), Some("https://www.google.com/calendar/event?eid=abc"));

        let reminders = event.reminders.unwrap().overrides;
        assert_eq!(reminders[0].lead_minutes(), 120);
        assert_eq!(reminders[0].method, Some(ReminderMethod::Email));
        assert_eq!(reminders[1].method, Some(ReminderMethod::Alert));

        assert_eq!(event.attendees.len(), 1);
        assert_eq!(event.attendees[0].display_name.as_deref(), Some("Beth"));
        assert_eq!(event.attendees[0].response_status, Some(ResponseStatus::NeedsAction));

        assert_eq!(event.extended_properties.shared.get("source").map(String::as_str), Some("gcalkit"));
        assert_eq!(event.extended_properties.private.get("note").map(String::as_str), Some("mine"));
    }

    #[test]
    fn decode_rejects_bad_visibility() {
        let xml = ENTRY.replace("#event.private", "#event.secret");
        let err = AtomEventCodec.decode(&xml).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn decode_without_entry_is_invalid_response() {
        let err = AtomEventCodec.decode("<feed xmlns='http://www.w3.org/2005/Atom'/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn decode_recurring_entry() {
        let xml = r#"<entry xmlns='http://www.w3.org/2005/Atom' xmlns:gd='http://schemas.google.com/g/2005'>
  <id>http://www.google.com/calendar/feeds/default/private/full/abcde12345</id>
  <gd:recurrence>DTSTART;VALUE=DATE:20120331
DTEND;VALUE=DATE:20120401
RRULE:FREQ=WEEKLY;BYDAY=SA;UNTIL=20120630T000000Z
</gd:recurrence>
</entry>"#;
        let event = AtomEventCodec.decode(xml).unwrap();
        assert!(event.start.is_date());
        assert!(event.is_all_day());
        let rule = event.recurrence.unwrap();
        assert_eq!(rule.frequency, Some(Frequency::Weekly));
        assert_eq!(rule.until, Some(parse_compact("20120630T000000Z").unwrap()));
    }

    #[test]
    fn decode_page_reads_next_link_and_slices_entries() {
        let feed = format!(
            "<feed xmlns='http://www.w3.org/2005/Atom'>\n<link rel='next' href='https://www.google.com/calendar/feeds/default/private/full?start-index=26'/>\n{}\n{}\n</feed>",
            "<entry><id>aaaaa</id><title>One</title></entry>",
            "<entry><id>bbbbb</id><title>Two</title><link rel='alternate' href='https://x.example.com/b'/></entry>"
        );
        let page = AtomEventCodec.decode_page(&feed).unwrap();
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].raw(), Some("<entry><id>aaaaa</id><title>One</title></entry>"));
        assert_eq!(page.events[1].html_link(), Some("https://x.example.com/b"));
        assert_eq!(
            page.next_page_token.as_deref(),
            Some("https://www.google.com/calendar/feeds/default/private/full?start-index=26")
        );
    }

    #[test]
    fn encode_timed_entry() {
        let mut event = Event::with_times(
            EventTime::parse("2012-03-27T10:00:00-07:00").unwrap(),
            EventTime::parse("2012-03-27T11:00:00-07:00").unwrap(),
        );
        event.title = Some("Tennis & <lunch>".into());
        event.status = Some(EventStatus::Cancelled);
        event.reminders = Some(Reminders::overrides(vec![
            ReminderOverride::days(1),
            ReminderOverride::default(),
        ]));

        insta::assert_snapshot!(AtomEventCodec.encode(&event).unwrap(), @r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005" xmlns:gCal="http://schemas.google.com/gCal/2005"><category scheme="http://schemas.google.com/g/2005#kind" term="http://schemas.google.com/g/2005#event"/><title type="text">Tennis &amp; &lt;lunch&gt;</title><gd:eventStatus value="http://schemas.google.com/g/2005#event.canceled"/><gd:when startTime="2012-03-27T17:00:00Z" endTime="2012-03-27T18:00:00Z"><gd:reminder days="1" method="alert"/><gd:reminder minutes="10" method="alert"/></gd:when></entry>"#);
    }

    #[test]
    fn encode_all_day_recurring_entry() {
        let mut event = Event::new();
        event.set_all_day(NaiveDate::from_ymd_opt(2012, 3, 31).unwrap());
        event.recurrence = Some(RecurrenceRule::new(Frequency::Yearly));
        let xml = AtomEventCodec.encode(&event).unwrap();
        assert!(xml.contains("<gd:recurrence>DTSTART;VALUE=DATE:20120331\r\nDTEND;VALUE=DATE:20120401\r\nRRULE:FREQ=YEARLY</gd:recurrence>"));
        assert!(!xml.contains("gd:when"));

        let decoded = AtomEventCodec.decode(&xml).unwrap();
        assert!(decoded.is_all_day());
        assert_eq!(decoded.recurrence.unwrap().frequency, Some(Frequency::Yearly));
    }

    #[test]
    fn encode_attendees_and_properties() {
        let mut event = Event::new();
        event.attendees = vec![
            Attendee::new("a@example.com").with_response_status(ResponseStatus::NeedsAction),
            Attendee::new("b@example.com").with_display_name("B"),
        ];
        event.extended_properties.private.insert("k".into(), "v".into());
        event.send_notifications = true;

        let xml = AtomEventCodec.encode(&event).unwrap();
        assert!(xml.contains(r#"<gd:attendeeStatus value="http://schemas.google.com/g/2005#event.invited"/>"#));
        assert!(xml.contains(r#"valueString="B""#));
        assert!(xml.contains(r#"<gd:extendedProperty name="k" value="v" realm="private"/>"#));
        assert!(xml.contains(r#"<gCal:sendEventNotifications value="true"/>"#));
    }

    #[test]
    fn quick_add_entry_carries_only_text() {
        let body = AtomEventCodec
            .encode_quick_add("movie tomorrow 23:00")
            .unwrap()
            .unwrap();
        insta::assert_snapshot!(body, @r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005" xmlns:gCal="http://schemas.google.com/gCal/2005"><category scheme="http://schemas.google.com/g/2005#kind" term="http://schemas.google.com/g/2005#event"/><content type="html">movie tomorrow 23:00</content><gCal:quickadd value="true"/></entry>"#);
    }
}
