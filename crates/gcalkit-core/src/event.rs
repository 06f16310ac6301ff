//! The calendar event model.
//!
//! [`Event`] is the typed, wire-independent representation of one event. It
//! knows how to validate caller-supplied values and how to derive its
//! all-day status, but it never talks to the network: persisting it is the
//! job of a calendar resource in the client crate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};
use crate::recurrence::RecurrenceRule;
use crate::time::{EventTime, parse_zone, spans_whole_days};

static EVENT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-v0-9]{5,1024}$").expect("Invalid event id regex"));

/// Lead time used when a reminder override names no unit.
pub const DEFAULT_REMINDER_MINUTES: u32 = 10;

/// Checks a caller-supplied event identifier against the accepted alphabet.
pub fn validate_event_id(id: &str) -> CalendarResult<()> {
    if EVENT_ID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(CalendarError::invalid_argument(format!(
            "event id '{}' must be 5-1024 characters of a-v and 0-9",
            id
        )))
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant),+
        }

        impl $name {
            /// Returns the value used on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = CalendarError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(CalendarError::invalid_argument(format!(
                        "invalid {} '{}'",
                        stringify!($name).to_ascii_lowercase(),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// The status of an event.
    EventStatus {
        Confirmed => "confirmed",
        Tentative => "tentative",
        Cancelled => "cancelled",
    }
}

wire_enum! {
    /// Whether an event blocks time on the calendar.
    Transparency {
        /// The event blocks time.
        Opaque => "opaque",
        /// The event does not block time.
        Transparent => "transparent",
    }
}

wire_enum! {
    /// Who can see the event details.
    Visibility {
        Default => "default",
        Public => "public",
        Private => "private",
        Confidential => "confidential",
    }
}

wire_enum! {
    /// An attendee's answer to the invitation.
    ResponseStatus {
        NeedsAction => "needsAction",
        Declined => "declined",
        Tentative => "tentative",
        Accepted => "accepted",
    }
}

wire_enum! {
    /// How a reminder is delivered.
    ReminderMethod {
        /// Pop-up notification (current API default).
        Popup => "popup",
        Email => "email",
        Sms => "sms",
        /// Alert notification (legacy feed default).
        Alert => "alert",
    }
}

/// An attendee of an event.
///
/// Only the fields that survive an encode are modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
    pub response_status: Option<ResponseStatus>,
}

impl Attendee {
    /// Creates an attendee with the given email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
            response_status: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_response_status(mut self, status: ResponseStatus) -> Self {
        self.response_status = Some(status);
        self
    }
}

/// A single reminder override.
///
/// Callers may express the lead time in minutes, hours or days. When more
/// than one unit is set, minutes win over hours and hours over days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: Option<ReminderMethod>,
    pub minutes: Option<u32>,
    pub hours: Option<u32>,
    pub days: Option<u32>,
}

impl ReminderOverride {
    pub fn minutes(minutes: u32) -> Self {
        Self {
            minutes: Some(minutes),
            ..Self::default()
        }
    }

    pub fn hours(hours: u32) -> Self {
        Self {
            hours: Some(hours),
            ..Self::default()
        }
    }

    pub fn days(days: u32) -> Self {
        Self {
            days: Some(days),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: ReminderMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Returns the lead time in minutes.
    pub fn lead_minutes(&self) -> u32 {
        match (self.minutes, self.hours, self.days) {
            (Some(m), _, _) => m,
            (None, Some(h), _) => h.saturating_mul(60),
            (None, None, Some(d)) => d.saturating_mul(24 * 60),
            (None, None, None) => DEFAULT_REMINDER_MINUTES,
        }
    }

    /// Returns the method, falling back to `default`.
    pub fn method_or(&self, default: ReminderMethod) -> ReminderMethod {
        self.method.unwrap_or(default)
    }
}

/// The reminder settings of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminders {
    /// Whether the calendar's default reminders apply.
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

impl Reminders {
    /// Uses the calendar's default reminders.
    pub fn default_reminders() -> Self {
        Self {
            use_default: true,
            overrides: Vec::new(),
        }
    }

    /// Replaces the defaults with explicit overrides.
    pub fn overrides(overrides: Vec<ReminderOverride>) -> Self {
        Self {
            use_default: false,
            overrides,
        }
    }
}

impl Default for Reminders {
    fn default() -> Self {
        Self::default_reminders()
    }
}

/// Arbitrary key/value metadata, split by audience.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedProperties {
    /// Visible to every attendee's copy of the event.
    pub shared: BTreeMap<String, String>,
    /// Visible only on the owner's copy.
    pub private: BTreeMap<String, String>,
}

impl ExtendedProperties {
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.private.is_empty()
    }
}

/// Where an event stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceState {
    /// Never saved, or carrying an identifier it wants to create with.
    Unsaved,
    /// Has a server-confirmed identifier.
    Saved,
    /// Removed from the server; the identifier has been cleared.
    Deleted,
}

/// Fields the server computes and returns after a save or lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFields {
    pub html_link: Option<String>,
    pub etag: Option<String>,
    /// Legacy feed URL used for updates and deletes.
    pub edit_link: Option<String>,
    /// The undecoded response body.
    pub raw: Option<String>,
}

/// A calendar event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Option<String>,
    asserted_id: bool,
    deleted: bool,
    quick_add: bool,
    calendar_id: Option<String>,
    server: ServerFields,

    pub status: Option<EventStatus>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// IANA zone the start/end are expressed in, e.g. `America/Los_Angeles`.
    pub time_zone: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
    pub reminders: Option<Reminders>,
    pub attendees: Vec<Attendee>,
    pub transparency: Option<Transparency>,
    pub visibility: Option<Visibility>,
    pub extended_properties: ExtendedProperties,
    pub color_id: Option<String>,
    pub creator_name: Option<String>,
    pub guests_can_invite_others: Option<bool>,
    pub guests_can_see_other_guests: Option<bool>,
    /// Whether the server should email attendees about this save.
    ///
    /// Write-only: it is sent as a query flag and never read back.
    pub send_notifications: bool,
}

impl Event {
    /// Creates an unsaved event starting now and lasting one hour.
    pub fn new() -> Self {
        let now = Utc::now().trunc_subsecs(0);
        Self::with_times(
            EventTime::from_datetime(now),
            EventTime::from_datetime(now + Duration::hours(1)),
        )
    }

    /// Creates an unsaved event with explicit start and end.
    pub fn with_times(start: EventTime, end: EventTime) -> Self {
        Self {
            id: None,
            asserted_id: false,
            deleted: false,
            quick_add: false,
            calendar_id: None,
            server: ServerFields::default(),
            status: None,
            title: None,
            description: None,
            location: None,
            start,
            end,
            time_zone: None,
            recurrence: None,
            reminders: None,
            attendees: Vec::new(),
            transparency: None,
            visibility: None,
            extended_properties: ExtendedProperties::default(),
            color_id: None,
            creator_name: None,
            guests_can_invite_others: None,
            guests_can_see_other_guests: None,
            send_notifications: false,
        }
    }

    /// Creates a new event that will be created under the given identifier.
    pub fn with_asserted_id(id: impl Into<String>) -> CalendarResult<Self> {
        let mut event = Self::new();
        event.set_id(id)?;
        event.asserted_id = true;
        Ok(event)
    }

    /// Creates an event that is saved through the quick-add endpoint.
    ///
    /// Only `text` is sent; the server parses it into the event fields.
    pub fn quick_add(text: impl Into<String>) -> Self {
        let mut event = Self::new();
        event.title = Some(text.into());
        event.quick_add = true;
        event
    }

    /// Returns the identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigns a caller-chosen identifier after validating it.
    pub fn set_id(&mut self, id: impl Into<String>) -> CalendarResult<()> {
        let id = id.into();
        validate_event_id(&id)?;
        self.id = Some(id);
        Ok(())
    }

    /// Records an identifier that came from the server.
    ///
    /// Server identifiers are not validated: recurring instances carry
    /// suffixes outside the caller alphabet.
    pub fn assign_server_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.asserted_id = false;
        self.deleted = false;
    }

    /// Returns true if the next save creates the event.
    pub fn is_new(&self) -> bool {
        self.id.is_none() || self.asserted_id
    }

    /// Returns true if the event was built with an asserted identifier.
    pub fn has_asserted_id(&self) -> bool {
        self.asserted_id
    }

    /// Returns the event's persistence state.
    pub fn persistence_state(&self) -> PersistenceState {
        match (&self.id, self.deleted) {
            (None, true) => PersistenceState::Deleted,
            (None, false) => PersistenceState::Unsaved,
            (Some(_), _) if self.asserted_id => PersistenceState::Unsaved,
            (Some(_), _) => PersistenceState::Saved,
        }
    }

    /// Clears the identifier after a successful delete.
    pub fn mark_deleted(&mut self) {
        self.id = None;
        self.asserted_id = false;
        self.deleted = true;
        self.server = ServerFields::default();
    }

    /// Returns true if this event is saved through quick-add.
    pub fn is_quick_add(&self) -> bool {
        self.quick_add
    }

    /// Returns the calendar this event is bound to, if any.
    pub fn calendar_id(&self) -> Option<&str> {
        self.calendar_id.as_deref()
    }

    /// Binds the event to a calendar.
    pub fn bind_calendar(&mut self, calendar_id: impl Into<String>) {
        self.calendar_id = Some(calendar_id.into());
    }

    /// Returns the server-computed fields.
    pub fn server_fields(&self) -> &ServerFields {
        &self.server
    }

    /// Replaces the server-computed fields.
    pub fn set_server_fields(&mut self, fields: ServerFields) {
        self.server = fields;
    }

    /// Returns the link to the event in the calendar web UI.
    pub fn html_link(&self) -> Option<&str> {
        self.server.html_link.as_deref()
    }

    /// Returns the undecoded payload of the last server response.
    pub fn raw(&self) -> Option<&str> {
        self.server.raw.as_deref()
    }

    /// Merges the server's copy of this event after a save.
    ///
    /// The identifier and server-computed fields always come from the
    /// server. For a quick-add save the server's copy replaces every field,
    /// since the caller only sent free text.
    pub fn absorb_saved(&mut self, saved: Event) {
        let calendar_id = self.calendar_id.take().or(saved.calendar_id.clone());
        if self.quick_add {
            *self = saved;
        } else {
            self.id = saved.id;
            self.server = saved.server;
            if saved.status.is_some() {
                self.status = saved.status;
            }
            if saved.creator_name.is_some() {
                self.creator_name = saved.creator_name;
            }
        }
        self.calendar_id = calendar_id;
        self.asserted_id = false;
        self.deleted = false;
        self.quick_add = false;
    }

    /// Parses and sets the start time.
    pub fn set_start_str(&mut self, value: &str) -> CalendarResult<()> {
        self.start = EventTime::parse(value)?;
        Ok(())
    }

    /// Parses and sets the end time.
    pub fn set_end_str(&mut self, value: &str) -> CalendarResult<()> {
        self.end = EventTime::parse(value)?;
        Ok(())
    }

    /// Parses and sets the visibility.
    pub fn set_visibility_str(&mut self, value: &str) -> CalendarResult<()> {
        self.visibility = Some(value.parse()?);
        Ok(())
    }

    /// Returns true if the event spans whole days.
    ///
    /// Derived from the current start/end every time it is asked.
    pub fn is_all_day(&self) -> bool {
        spans_whole_days(&self.start, &self.end, self.time_zone.as_deref())
    }

    /// Turns the event into a single all-day event on `date`.
    pub fn set_all_day(&mut self, date: NaiveDate) {
        self.start = EventTime::Date(date);
        self.end = EventTime::Date(date.succ_opt().unwrap_or(NaiveDate::MAX));
    }

    /// Returns the event's length.
    pub fn duration(&self) -> Duration {
        let zone = parse_zone(self.time_zone.as_deref());
        self.end.instant(zone) - self.start.instant(zone)
    }

    /// Returns true if the event blocks time.
    pub fn is_opaque(&self) -> bool {
        self.transparency != Some(Transparency::Transparent)
    }

    /// Returns true if a recurrence with a frequency is set.
    pub fn is_recurring(&self) -> bool {
        self.recurrence.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Returns the title, or `(No title)`.
    pub fn effective_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("(No title)")
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} - {})",
            self.effective_title(),
            self.start,
            self.end
        )?;
        if let Some(id) = &self.id {
            write!(f, " [{}]", id)?;
        }
        Ok(())
    }
}
