//! Event wire codecs.
//!
//! [`EventCodec`] converts between [`Event`] and one API generation's wire
//! format. Both implementations build typed trees (serde structs for JSON,
//! quick-xml writer events for Atom) and never splice strings.

mod atom;
mod json;

use std::fmt;

use gcalkit_core::{CalendarResult, Event};

use crate::gateway::ApiGeneration;

pub use atom::{ATOM_NS, AtomEventCodec, GCAL_NS, GD_NS};
pub use json::JsonEventCodec;

/// One page of a list or sync response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<Event>,
    /// Cursor for the next page, when the listing continues.
    ///
    /// For the legacy feeds this is the absolute URL of the next feed page.
    pub next_page_token: Option<String>,
    /// Cursor for the next incremental sync, present on the last page.
    pub next_sync_token: Option<String>,
}

/// Converts events to and from one API generation's wire format.
pub trait EventCodec: Send + Sync + fmt::Debug {
    fn generation(&self) -> ApiGeneration;

    fn content_type(&self) -> &'static str {
        self.generation().content_type()
    }

    /// Encodes an event for a create or update request.
    fn encode(&self, event: &Event) -> CalendarResult<String>;

    /// Decodes a single event body.
    fn decode(&self, body: &str) -> CalendarResult<Event>;

    /// Decodes a list body into its events and continuation cursors.
    fn decode_page(&self, body: &str) -> CalendarResult<EventPage>;

    /// Returns the request body for a quick-add save.
    ///
    /// `None` means the text travels in the query string and the request has
    /// no body.
    fn encode_quick_add(&self, text: &str) -> CalendarResult<Option<String>>;
}

/// Returns the codec for `generation`.
pub fn codec_for(generation: ApiGeneration) -> Box<dyn EventCodec> {
    match generation {
        ApiGeneration::Json => Box::new(JsonEventCodec),
        ApiGeneration::LegacyXml => Box::new(AtomEventCodec),
    }
}
