//! Core types: errors, events, recurrence rules, time, tracing

pub mod error;
pub mod event;
pub mod recurrence;
pub mod time;
pub mod tracing;

pub use error::{CalendarError, CalendarResult, ErrorKind};
pub use event::{
    Attendee, DEFAULT_REMINDER_MINUTES, Event, EventStatus, ExtendedProperties, PersistenceState,
    ReminderMethod, ReminderOverride, Reminders, ResponseStatus, ServerFields, Transparency,
    Visibility, validate_event_id,
};
pub use recurrence::{DayToken, Frequency, RecurrenceRule};
pub use time::{EventTime, TimeWindow, format_compact, parse_compact, parse_zone, spans_whole_days};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
